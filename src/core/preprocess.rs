//! File preprocessor.
//!
//! Splits a whole command file into statements, in execution order. Fenced
//! blocks become one statement each so a command can carry a multi-line JSON
//! payload; ordinary lines are split on `;`.

/// One statement as it appeared in the file, before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatement {
    /// Statement text, trimmed
    pub text: String,
    /// 1-based line the statement starts on
    pub line: usize,
}

const FENCE: &str = "```";
const COMMENT: char = '#';

/// Converts file content into an ordered list of statements.
///
/// Lines are trimmed, and blank lines and `#` comments are dropped, including
/// inside fences. A `;` segment starting with `#` is a comment as well. A line
/// starting with a triple backtick toggles fence mode; any language tag after
/// it is ignored. An unterminated fence still flushes its content.
#[must_use]
pub fn preprocess(raw: &str) -> Vec<RawStatement> {
    let mut statements = Vec::new();
    let mut fence: Option<(usize, Vec<&str>)> = None;

    for (index, line) in raw.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with(COMMENT) {
            continue;
        }

        if line.starts_with(FENCE) {
            match fence.take() {
                Some((start, buffered)) => flush_block(&mut statements, start, &buffered),
                None => fence = Some((line_no, Vec::new())),
            }
            continue;
        }

        if let Some((start, buffered)) = fence.as_mut() {
            if buffered.is_empty() {
                *start = line_no;
            }
            buffered.push(line);
            continue;
        }

        statements.extend(
            line.split(';')
                .map(str::trim)
                .filter(|part| !part.is_empty() && !part.starts_with(COMMENT))
                .map(|part| RawStatement {
                    text: part.to_string(),
                    line: line_no,
                }),
        );
    }

    if let Some((start, buffered)) = fence {
        tracing::debug!("Flushing unclosed code block starting at line {start}");
        flush_block(&mut statements, start, &buffered);
    }

    statements
}

fn flush_block(statements: &mut Vec<RawStatement>, line: usize, buffered: &[&str]) {
    let text = buffered.join("\n");
    let text = text.trim();
    if !text.is_empty() {
        statements.push(RawStatement {
            text: text.to_string(),
            line,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::{ParsedLine, parse_line};

    fn texts(statements: &[RawStatement]) -> Vec<&str> {
        statements.iter().map(|s| s.text.as_str()).collect()
    }

    #[test]
    fn test_semicolons_split_in_order() {
        let statements = preprocess("a=1;b=2");
        assert_eq!(texts(&statements), vec!["a=1", "b=2"]);
        assert!(statements.iter().all(|s| s.line == 1));
    }

    #[test]
    fn test_blank_lines_and_empty_segments_dropped() {
        let statements = preprocess("\n  foo x=1 ;; ;\n\n   bar y=2  \n");
        assert_eq!(texts(&statements), vec!["foo x=1", "bar y=2"]);
        assert_eq!(statements[0].line, 2);
        assert_eq!(statements[1].line, 4);
    }

    #[test]
    fn test_fenced_block_is_one_statement() {
        let raw = "```\n{\"command\":\"x\",\"y\":\"z\"}\n```";
        let statements = preprocess(raw);
        assert_eq!(texts(&statements), vec![r#"{"command":"x","y":"z"}"#]);
        assert_eq!(statements[0].line, 2);

        let mut args = crate::core::parser::Arguments::new();
        args.insert("y", "z");
        assert_eq!(
            parse_line(&statements[0].text),
            ParsedLine::Command {
                name: "x".into(),
                args
            }
        );
    }

    #[test]
    fn test_fence_language_tag_ignored_and_lines_joined() {
        let raw = "before\n```json\n{\n  \"command\": \"a\";\n}\n```\nafter";
        let statements = preprocess(raw);
        assert_eq!(
            texts(&statements),
            vec!["before", "{\n\"command\": \"a\";\n}", "after"]
        );
    }

    #[test]
    fn test_semicolons_inside_fence_not_split() {
        let statements = preprocess("```\nfoo a=1; bar b=2\n```");
        assert_eq!(texts(&statements), vec!["foo a=1; bar b=2"]);
    }

    #[test]
    fn test_unclosed_fence_flushes() {
        let statements = preprocess("one\n```\ntwo\nthree");
        assert_eq!(texts(&statements), vec!["one", "two\nthree"]);
        assert_eq!(statements[1].line, 3);
    }

    #[test]
    fn test_empty_fence_emits_nothing() {
        assert!(preprocess("```\n\n```").is_empty());
        assert!(preprocess("```").is_empty());
    }

    #[test]
    fn test_comments_are_not_statements() {
        let statements = preprocess("# heading\nfoo a=1; # trailing\n  #indented");
        assert_eq!(texts(&statements), vec!["foo a=1"]);
        assert_eq!(statements[0].line, 2);
    }

    #[test]
    fn test_comments_inside_fence_dropped() {
        let statements = preprocess("```\n# note\nfoo a=1\n```");
        assert_eq!(texts(&statements), vec!["foo a=1"]);
        assert_eq!(statements[0].line, 3);
    }

    #[test]
    fn test_lines_are_non_decreasing() {
        let raw = "a;b\n```\nc\nd\n```\ne;f\n```\ng";
        let statements = preprocess(raw);
        assert!(statements.windows(2).all(|w| w[0].line <= w[1].line));
    }
}
