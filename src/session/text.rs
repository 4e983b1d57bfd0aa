//! Text helpers for outgoing responses.

/// Prefix of a legacy formatting code (`§a`, `§l`, ...)
pub const COLOR_CHAR: char = '\u{00A7}';

/// Largest body a single response packet carries, in bytes.
pub const MAX_CHUNK_SIZE: usize = 2048;

/// Returns true for the characters that may follow [`COLOR_CHAR`].
#[inline]
fn is_format_code(c: char) -> bool {
    matches!(c.to_ascii_lowercase(), '0'..='9' | 'a'..='f' | 'k'..='o' | 'r')
}

/// Removes every `§` + format-code pair from `input`.
///
/// A `§` that is not followed by a valid code is left in place.
pub fn strip_colors(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == COLOR_CHAR {
            if let Some(&next) = chars.peek() {
                if is_format_code(next) {
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }

    out
}

/// Splits `message` into slices of at most `limit` bytes, in order.
///
/// Slices end on character boundaries, so one may come out shorter than
/// `limit` when a multi-byte character straddles the limit. An empty
/// message yields a single empty slice.
pub fn chunk_message(message: &str, limit: usize) -> Vec<&str> {
    debug_assert!(limit >= 4, "limit must fit any UTF-8 character");

    if message.is_empty() {
        return vec![""];
    }

    let mut chunks = Vec::with_capacity(message.len().div_ceil(limit));
    let mut rest = message;

    while !rest.is_empty() {
        let mut end = rest.len().min(limit);
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let (chunk, tail) = rest.split_at(end);
        chunks.push(chunk);
        rest = tail;
    }

    chunks
}
