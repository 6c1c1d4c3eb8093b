//! Line parser for command files.
//!
//! Turns one preprocessed statement into a command with arguments, a notice, or
//! nothing at all. Parsing never fails loudly: malformed input comes back as
//! [`ParsedLine::Invalid`] so the engine can count it and move on.
//!
//! Accepted forms, checked in this order:
//! - blank lines and `#` comments are skipped
//! - `NOTICE:text` or `NOTICE:"text"` becomes a notice
//! - a JSON object with a `command` key becomes a command
//! - fence markers are skipped (the preprocessor owns them)
//! - prose mentioning "json" without any `key=value` becomes a notice
//! - anything else is split shell-style into `name key=value ...`

use serde_json::Value;
use std::collections::BTreeMap;

/// Name under which notices are reported.
pub const NOTICE_COMMAND: &str = "NOTICE";

const NOTICE_PREFIX: &str = "NOTICE:";
const COMMAND_SUFFIX: &str = "_command";

/// Argument map with case-insensitive keys.
///
/// Keys are lower-cased on insert and on lookup. Values are always strings;
/// handlers convert them as needed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arguments(BTreeMap<String, String>);

impl Arguments {
    /// Creates an empty argument map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, lower-casing the key. Later values replace earlier ones.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_lowercase(), value.into());
    }

    /// Looks up a value by key, ignoring case.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&key.to_lowercase()).map(String::as_str)
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut args = Self::new();
        for (k, v) in iter {
            args.insert(k.as_ref(), v);
        }
        args
    }
}

/// Result of parsing one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// Nothing to do: blank, comment or fence marker
    Skip,
    /// Log-only notice text
    Notice(String),
    /// A command invocation
    Command {
        /// Command name as written, not yet normalized
        name: String,
        /// Parsed `key=value` arguments
        args: Arguments,
    },
    /// The line could not be parsed; the text explains why
    Invalid(String),
}

/// One resolved unit of work inside an execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Command name as written
    pub command_name: String,
    /// Arguments with lower-cased keys
    pub arguments: Arguments,
    /// 1-based line in the source file
    pub source_line_index: usize,
}

/// Parses a single line (or fenced block) of a command file.
#[must_use]
pub fn parse_line(line: &str) -> ParsedLine {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return ParsedLine::Skip;
    }

    if let Some(rest) = strip_prefix_ignore_case(trimmed, NOTICE_PREFIX) {
        return parse_notice(rest);
    }

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        if let Some(parsed) = parse_json_command(trimmed) {
            return parsed;
        }
    }

    if trimmed.starts_with("```") {
        return ParsedLine::Skip;
    }

    if looks_like_json_prose(trimmed) {
        tracing::info!("Treating line mentioning json as a notice: '{trimmed}'");
        return ParsedLine::Notice(format!("Note: {trimmed}"));
    }

    parse_shell_command(trimmed)
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

fn parse_notice(rest: &str) -> ParsedLine {
    let content = rest.trim();
    let content = ['"', '\'']
        .into_iter()
        .find_map(|quote| {
            (content.len() >= 2 && content.starts_with(quote) && content.ends_with(quote))
                .then(|| &content[1..content.len() - 1])
        })
        .unwrap_or(content);

    if content.trim().is_empty() {
        return ParsedLine::Invalid("Empty NOTICE content".to_string());
    }
    ParsedLine::Notice(content.to_string())
}

/// Returns `None` when the text is not a JSON object with a `command` key, so
/// the caller can fall through to the other forms.
fn parse_json_command(text: &str) -> Option<ParsedLine> {
    let Ok(Value::Object(mut object)) = serde_json::from_str::<Value>(text) else {
        return None;
    };
    let command = object.remove("command")?;

    let Value::String(name) = command else {
        return Some(ParsedLine::Invalid(
            "Parsing error: `command` must be a string".to_string(),
        ));
    };
    let name = name
        .strip_suffix(COMMAND_SUFFIX)
        .map_or_else(|| name.clone(), str::to_string);

    let args: Arguments = object
        .iter()
        .map(|(key, value)| (key, stringify_json(value)))
        .collect();

    tracing::debug!("Converted JSON to command: {name} with {} args", args.len());
    Some(ParsedLine::Command { name, args })
}

fn stringify_json(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Prose such as "Here is the json for your server:" should not fail as a
/// command. Approximate: a real command whose value mentions json but has no
/// `=` anywhere is also caught.
fn looks_like_json_prose(text: &str) -> bool {
    text.to_lowercase().contains("json")
        && !text.split_whitespace().any(|part| part.contains('='))
        && !text.starts_with('{')
        && !text.ends_with('}')
}

fn parse_shell_command(text: &str) -> ParsedLine {
    let parts = match shell_words::split(text) {
        Ok(parts) => parts,
        Err(e) => {
            tracing::warn!("Error parsing command line '{text}': {e}");
            return ParsedLine::Invalid(format!("Parsing error: {e}"));
        }
    };

    let mut parts = parts.into_iter();
    let Some(name) = parts.next() else {
        return ParsedLine::Skip;
    };

    let mut args = Arguments::new();
    for part in parts {
        if let Some((key, value)) = part.split_once('=') {
            args.insert(key, value);
        } else {
            tracing::warn!("Ignoring arg without '=' in line '{text}': {part}");
        }
    }

    ParsedLine::Command { name, args }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(name: &str, pairs: &[(&str, &str)]) -> ParsedLine {
        ParsedLine::Command {
            name: name.to_string(),
            args: pairs.iter().copied().collect(),
        }
    }

    #[test]
    fn test_blank_and_comment_lines_skip() {
        assert_eq!(parse_line(""), ParsedLine::Skip);
        assert_eq!(parse_line("   "), ParsedLine::Skip);
        assert_eq!(parse_line("# a comment"), ParsedLine::Skip);
        assert_eq!(parse_line("   # indented comment"), ParsedLine::Skip);
    }

    #[test]
    fn test_notice_quoted_and_unquoted() {
        assert_eq!(parse_line("NOTICE:\"hello\""), ParsedLine::Notice("hello".into()));
        assert_eq!(parse_line("NOTICE:hello"), ParsedLine::Notice("hello".into()));
        assert_eq!(parse_line("notice: 'hello'"), ParsedLine::Notice("hello".into()));
    }

    #[test]
    fn test_notice_strips_only_one_layer_of_quotes() {
        assert_eq!(
            parse_line("NOTICE:\"\"inner\"\""),
            ParsedLine::Notice("\"inner\"".into())
        );
        assert_eq!(
            parse_line("NOTICE:\"mismatched'"),
            ParsedLine::Notice("\"mismatched'".into())
        );
    }

    #[test]
    fn test_empty_notice_is_error() {
        assert_eq!(
            parse_line("NOTICE:"),
            ParsedLine::Invalid("Empty NOTICE content".into())
        );
        assert_eq!(
            parse_line("NOTICE:\"  \""),
            ParsedLine::Invalid("Empty NOTICE content".into())
        );
    }

    #[test]
    fn test_key_value_command() {
        assert_eq!(
            parse_line("foo a=1 b=two"),
            command("foo", &[("a", "1"), ("b", "two")])
        );
    }

    #[test]
    fn test_keys_lowercased_values_kept() {
        assert_eq!(
            parse_line("role_create Name=Mods Color=#FF0000"),
            command("role_create", &[("name", "Mods"), ("color", "#FF0000")])
        );
    }

    #[test]
    fn test_quoted_values_and_split_on_first_equals() {
        assert_eq!(
            parse_line(r#"message_send channel=general content="a = b, c""#),
            command("message_send", &[("channel", "general"), ("content", "a = b, c")])
        );
    }

    #[test]
    fn test_positional_tokens_are_dropped() {
        assert_eq!(
            parse_line("channel_delete general reason=cleanup"),
            command("channel_delete", &[("reason", "cleanup")])
        );
    }

    #[test]
    fn test_unclosed_quote_is_error() {
        let ParsedLine::Invalid(msg) = parse_line(r#"foo a="unterminated"#) else {
            panic!("expected parse error");
        };
        assert!(msg.starts_with("Parsing error"));
    }

    #[test]
    fn test_json_object_command() {
        assert_eq!(
            parse_line(r#"{"command":"x","y":"z"}"#),
            command("x", &[("y", "z")])
        );
    }

    #[test]
    fn test_json_strips_command_suffix_and_stringifies() {
        assert_eq!(
            parse_line(r#"{"command":"role_create_command","Name":"Mods","hoist":true,"position":3}"#),
            command(
                "role_create",
                &[("name", "Mods"), ("hoist", "true"), ("position", "3")]
            )
        );
    }

    #[test]
    fn test_json_non_string_command_is_error() {
        assert!(matches!(
            parse_line(r#"{"command": 5}"#),
            ParsedLine::Invalid(_)
        ));
    }

    #[test]
    fn test_json_without_command_falls_through() {
        // Not a command object, and no key=value pair: shell parsing keeps the
        // whole token as the name.
        let parsed = parse_line(r#"{"name":"x"}"#);
        assert!(matches!(parsed, ParsedLine::Command { .. }));
    }

    #[test]
    fn test_multiline_json_block() {
        let block = "{\n\"command\": \"channel_slowmode\",\n\"channel\": \"general\",\n\"slowmode\": 10\n}";
        assert_eq!(
            parse_line(block),
            command("channel_slowmode", &[("channel", "general"), ("slowmode", "10")])
        );
    }

    #[test]
    fn test_fence_markers_skip() {
        assert_eq!(parse_line("```"), ParsedLine::Skip);
        assert_eq!(parse_line("```json"), ParsedLine::Skip);
    }

    #[test]
    fn test_json_prose_heuristic_becomes_notice() {
        assert_eq!(
            parse_line("Here is the JSON for your server"),
            ParsedLine::Notice("Note: Here is the JSON for your server".into())
        );
    }

    #[test]
    fn test_json_prose_heuristic_catches_bare_commands() {
        // Known approximation: a command with no key=value pairs that mentions
        // json is reported as a notice instead of being run.
        assert!(matches!(parse_line("json_dump"), ParsedLine::Notice(_)));
        // With a key=value pair it is a command.
        assert_eq!(
            parse_line("message_send content=json"),
            command("message_send", &[("content", "json")])
        );
    }

    #[test]
    fn test_arguments_lookup_is_case_insensitive() {
        let args: Arguments = [("Channel", "general")].into_iter().collect();
        assert_eq!(args.get("CHANNEL"), Some("general"));
        assert_eq!(args.get("channel"), Some("general"));
        assert_eq!(args.get("missing"), None);
    }
}
