//! The comment-stripping pass.
//!
//! Produces a copy of a script with the same number of lines in which the
//! lines of disabled rules (`#<!-->` at line start) lose their marker and
//! every other line is blanked. Parsing that copy recovers the disabled
//! rules.

use crate::DISABLED_MARKER;

/// Lexical context carried from one line to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    Quoted,
    BracketComment,
    /// Inside a `text:` string; ends with a lone `.` line.
    TextBody,
}

/// Returns the stripped copy of `script`.
///
/// A marker only counts at the start of a line that begins outside any
/// quoted string, bracket comment or multi-line string body of the active
/// script.
#[must_use]
pub fn strip_comments(script: &str) -> String {
    let mut out = String::with_capacity(script.len());
    let mut state = State::Normal;

    for line in script.split_inclusive('\n') {
        let (content, ending) = split_ending(line);

        if state == State::Normal
            && let Some(rest) = content.strip_prefix(DISABLED_MARKER)
        {
            out.push_str(rest);
        } else {
            state = scan_line(content, state);
        }
        out.push_str(ending);
    }
    out
}

fn split_ending(line: &str) -> (&str, &str) {
    if let Some(content) = line.strip_suffix("\r\n") {
        (content, "\r\n")
    } else if let Some(content) = line.strip_suffix('\n') {
        (content, "\n")
    } else {
        (line, "")
    }
}

fn scan_line(content: &str, state: State) -> State {
    if state == State::TextBody {
        return if content == "." {
            State::Normal
        } else {
            State::TextBody
        };
    }

    let bytes = content.as_bytes();
    let mut state = state;
    let mut idx = 0;
    while idx < bytes.len() {
        let byte = bytes[idx];
        match state {
            State::Normal => match byte {
                b'#' => return State::Normal,
                b'"' => state = State::Quoted,
                b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                    state = State::BracketComment;
                    idx += 1;
                }
                // The body starts on the next line.
                b't' | b'T' if starts_text(bytes, idx) => return State::TextBody,
                _ => {}
            },
            State::Quoted => match byte {
                b'\\' => idx += 1,
                b'"' => state = State::Normal,
                _ => {}
            },
            State::BracketComment => {
                if byte == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    state = State::Normal;
                    idx += 1;
                }
            }
            State::TextBody => break,
        }
        idx += 1;
    }
    state
}

fn starts_text(bytes: &[u8], idx: usize) -> bool {
    let preceded_by_word =
        idx > 0 && (bytes[idx - 1].is_ascii_alphanumeric() || bytes[idx - 1] == b'_');
    !preceded_by_word
        && bytes
            .get(idx..idx + 5)
            .is_some_and(|word| word.eq_ignore_ascii_case(b"text:"))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_keeps_only_disabled_lines() {
        let script = "# Sieve filter\r\nrequire \"fileinto\";\r\n\r\n#<!-->if true {\r\n#<!-->    stop;\r\n#<!-->}\r\nkeep;\r\n";
        assert_eq!(
            strip_comments(script),
            "\r\n\r\n\r\nif true {\r\n    stop;\r\n}\r\n\r\n"
        );
    }

    #[test]
    fn test_marker_inside_quoted_string_is_content() {
        let script = "fileinto \"a\r\n#<!-->b\";\r\n#<!-->keep;";
        assert_eq!(strip_comments(script), "\r\n\r\nkeep;");
    }

    #[test]
    fn test_marker_inside_multiline_body_is_content() {
        let script = "vacation text:\r\n#<!-->not a rule\r\n.\r\n;\r\n#<!-->stop;\r\n";
        assert_eq!(strip_comments(script), "\r\n\r\n\r\n\r\nstop;\r\n");
    }

    #[test]
    fn test_dot_line_of_disabled_multiline() {
        let script = "#<!-->vacation text:\n#<!-->Away\n#<!-->.\n#<!-->;\n";
        assert_eq!(strip_comments(script), "vacation text:\nAway\n.\n;\n");
    }

    #[test]
    fn test_marker_inside_bracket_comment_is_content() {
        let script = "/* start\r\n#<!-->inside\r\n*/ keep;\r\n#<!-->stop;";
        assert_eq!(strip_comments(script), "\r\n\r\n\r\nstop;");
    }

    #[test]
    fn test_hash_comment_ends_at_line_end() {
        let script = "keep; # \"unbalanced\r\n#<!-->stop;";
        assert_eq!(strip_comments(script), "\r\nstop;");
    }

    #[test]
    fn test_text_colon_needs_word_boundary() {
        let script = "header :is \"x\" \"y\"; # context:\r\nmytext: \r\n#<!-->stop;";
        assert_eq!(strip_comments(script), "\r\n\r\nstop;");
    }

    proptest! {
        #[test]
        fn preserves_line_count(lines in proptest::collection::vec(
            prop_oneof![
                Just("#<!-->keep;".to_string()),
                Just("text:".to_string()),
                Just(".".to_string()),
                Just("\"".to_string()),
                Just("/*".to_string()),
                Just("*/".to_string()),
                "[ -~]{0,20}",
            ],
            0..30,
        )) {
            let script = lines.join("\r\n");
            let stripped = strip_comments(&script);
            prop_assert_eq!(stripped.matches('\n').count(), script.matches('\n').count());
        }
    }
}
