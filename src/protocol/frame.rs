//! Length-Prefixed Frame Codec
//!
//! Every RCON message travels inside a frame: a 4-byte little-endian signed
//! length followed by exactly that many payload bytes. This module knows
//! nothing about packet semantics; it only splits a byte stream into frames
//! and glues frames back onto it.
//!
//! ## Wire Layout
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────┐
//! │ length: i32 (LE) │ payload: `length` bytes      │
//! └──────────────────┴──────────────────────────────┘
//! ```
//!
//! ## How the Parser Works
//!
//! Like an incremental parser, [`FrameParser::parse`] returns either:
//! - `Ok(Some((frame, consumed)))` - a complete frame, `consumed` bytes used
//! - `Ok(None)` - the frame is incomplete, nothing may be consumed yet
//! - `Err(FrameError)` - the declared length is out of bounds
//!
//! An out-of-bounds length is never recoverable. A peer that declares a
//! negative or giant length gets its connection closed before we allocate
//! anything for it.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Maximum payload size of a single frame, in bytes.
pub const MAX_PACKET_SIZE: usize = 4096;

/// Size of the length prefix.
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Errors that can occur while splitting frames.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Declared length is negative or larger than [`MAX_PACKET_SIZE`]
    #[error("invalid packet size: {0} (max: {max})", max = MAX_PACKET_SIZE)]
    InvalidLength(i32),
}

/// Result type for frame operations.
pub type FrameResult<T> = Result<T, FrameError>;

/// Stateless splitter for length-prefixed frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameParser;

impl FrameParser {
    /// Creates a new frame parser.
    pub fn new() -> Self {
        Self
    }

    /// Attempts to split one frame off the front of `buf`.
    ///
    /// The buffer itself is never modified; the caller advances it by the
    /// returned `consumed` count.
    pub fn parse(&self, buf: &[u8]) -> FrameResult<Option<(Bytes, usize)>> {
        let length = match peek_length(buf) {
            Some(length) => length,
            None => return Ok(None),
        };

        if length < 0 || length as usize > MAX_PACKET_SIZE {
            return Err(FrameError::InvalidLength(length));
        }

        let length = length as usize;
        let total = LENGTH_FIELD_SIZE + length;
        if buf.len() < total {
            return Ok(None);
        }

        let frame = Bytes::copy_from_slice(&buf[LENGTH_FIELD_SIZE..total]);
        Ok(Some((frame, total)))
    }
}

/// Reads the length prefix without consuming it.
#[inline]
fn peek_length(buf: &[u8]) -> Option<i32> {
    let prefix: [u8; LENGTH_FIELD_SIZE] = buf.get(..LENGTH_FIELD_SIZE)?.try_into().ok()?;
    Some(i32::from_le_bytes(prefix))
}

/// Appends `payload` to `dst` as one frame.
///
/// No padding is added here; packet-level padding belongs to
/// [`crate::protocol::Packet`].
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(LENGTH_FIELD_SIZE + payload.len());
    dst.put_i32_le(payload.len() as i32);
    dst.put_slice(payload);
}

/// Helper function to split a single frame from bytes.
pub fn parse_frame(buf: &[u8]) -> FrameResult<Option<(Bytes, usize)>> {
    FrameParser::new().parse(buf)
}
