//! Response Sink
//!
//! The output target handed to the [`CommandExecutor`] for exactly one
//! command. The executor calls [`ResponseSink::send`] any number of times;
//! the session calls [`ResponseSink::flush`] once the command has finished
//! and turns the collected text into response packets.
//!
//! Every line is flattened to plain text on the way in: translatable lines
//! are resolved through the host [`Translator`] (falling back to English,
//! then to the raw key) and formatting codes are stripped.
//!
//! [`CommandExecutor`]: crate::host::CommandExecutor

use crate::host::{NoTranslations, Translator};
use crate::session::text::strip_colors;
use std::sync::Arc;

/// Locale used when the primary locale has no translation.
pub const FALLBACK_LOCALE: &str = "en";

/// One line of command output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    /// Already flat text
    Text(String),
    /// A translation key with positional arguments (`{0}`, `{1}`, ...)
    Translatable { key: String, args: Vec<String> },
}

impl OutputLine {
    pub fn translatable(key: impl Into<String>, args: Vec<String>) -> Self {
        OutputLine::Translatable {
            key: key.into(),
            args,
        }
    }
}

impl From<&str> for OutputLine {
    fn from(text: &str) -> Self {
        OutputLine::Text(text.to_string())
    }
}

impl From<String> for OutputLine {
    fn from(text: String) -> Self {
        OutputLine::Text(text)
    }
}

/// Append-only text buffer capturing one command's output.
pub struct ResponseSink {
    buffer: String,
    translator: Arc<dyn Translator>,
    locale: String,
}

impl ResponseSink {
    /// Creates a sink that renders translatable lines for `locale`.
    pub fn new(translator: Arc<dyn Translator>, locale: impl Into<String>) -> Self {
        Self {
            buffer: String::new(),
            translator,
            locale: locale.into(),
        }
    }

    /// Creates a sink without translations.
    pub fn plain() -> Self {
        Self::new(Arc::new(NoTranslations), FALLBACK_LOCALE)
    }

    /// Appends one line of output.
    pub fn send(&mut self, line: impl Into<OutputLine>) {
        let text = strip_colors(&self.render(line.into()));
        if !self.buffer.is_empty() {
            self.buffer.push('\n');
        }
        self.buffer.push_str(&text);
    }

    /// Returns everything sent so far and empties the buffer.
    pub fn flush(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    fn render(&self, line: OutputLine) -> String {
        match line {
            OutputLine::Text(text) => text,
            OutputLine::Translatable { key, args } => {
                let template = self
                    .translator
                    .translate(&key, &self.locale)
                    .or_else(|| self.translator.translate(&key, FALLBACK_LOCALE))
                    .unwrap_or(key);
                substitute_args(&template, &args)
            }
        }
    }
}

impl std::fmt::Debug for ResponseSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseSink")
            .field("buffered", &self.buffer.len())
            .field("locale", &self.locale)
            .finish()
    }
}

/// Replaces `{i}` placeholders in one left-to-right pass; argument text is
/// never rescanned. Unknown or malformed placeholders are kept verbatim.
fn substitute_args(template: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let arg = after.find('}').and_then(|close| {
            let index: usize = after[..close].parse().ok()?;
            args.get(index).map(|arg| (arg, close))
        });

        match arg {
            Some((arg, close)) => {
                out.push_str(arg);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapTranslator(HashMap<(&'static str, &'static str), &'static str>);

    impl Translator for MapTranslator {
        fn translate(&self, key: &str, locale: &str) -> Option<String> {
            self.0
                .iter()
                .find(|((k, l), _)| *k == key && *l == locale)
                .map(|(_, v)| v.to_string())
        }
    }

    fn translator() -> Arc<dyn Translator> {
        let mut map = HashMap::new();
        map.insert(("greeting", "uk"), "Привіт, {0}!");
        map.insert(("greeting", "en"), "Hello, {0}!");
        map.insert(("farewell", "en"), "Bye {0} and {1}");
        Arc::new(MapTranslator(map))
    }

    #[test]
    fn test_lines_joined_with_newlines() {
        let mut sink = ResponseSink::plain();
        sink.send("first");
        sink.send(String::from("second"));
        assert_eq!(sink.flush(), "first\nsecond");
    }

    #[test]
    fn test_flush_resets() {
        let mut sink = ResponseSink::plain();
        sink.send("once");
        assert_eq!(sink.flush(), "once");
        assert!(sink.is_empty());
        assert_eq!(sink.flush(), "");
    }

    #[test]
    fn test_empty_lines_are_kept() {
        let mut sink = ResponseSink::plain();
        sink.send("a");
        sink.send("");
        sink.send("b");
        assert_eq!(sink.flush(), "a\n\nb");
    }

    #[test]
    fn test_colors_stripped_from_output() {
        let mut sink = ResponseSink::plain();
        sink.send("§aOnline: §f3");
        assert_eq!(sink.flush(), "Online: 3");
    }

    #[test]
    fn test_translation_primary_locale() {
        let mut sink = ResponseSink::new(translator(), "uk");
        sink.send(OutputLine::translatable("greeting", vec!["Admin".to_string()]));
        assert_eq!(sink.flush(), "Привіт, Admin!");
    }

    #[test]
    fn test_translation_falls_back_to_english() {
        let mut sink = ResponseSink::new(translator(), "uk");
        sink.send(OutputLine::translatable(
            "farewell",
            vec!["A".to_string(), "B".to_string()],
        ));
        assert_eq!(sink.flush(), "Bye A and B");
    }

    #[test]
    fn test_arguments_are_not_substituted_twice() {
        let rendered = substitute_args(
            "{0} kicked {1}",
            &["{1}".to_string(), "Bob".to_string()],
        );
        assert_eq!(rendered, "{1} kicked Bob");
    }

    #[test]
    fn test_unmatched_placeholders_kept() {
        let args = ["x".to_string()];
        assert_eq!(substitute_args("{0} {1} {a} {", &args), "x {1} {a} {");
        assert_eq!(substitute_args("{{0}}", &args), "{x}");
    }

    #[test]
    fn test_missing_translation_uses_key() {
        let mut sink = ResponseSink::new(translator(), "de");
        sink.send(OutputLine::translatable("commands.unknown", vec![]));
        assert_eq!(sink.flush(), "commands.unknown");
    }
}
