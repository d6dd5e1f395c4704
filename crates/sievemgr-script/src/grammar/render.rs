//! Canonical Sieve renderer.
//!
//! One command per line, blocks indented by four spaces, single-element
//! string lists written without brackets. Strings that end in CRLF and
//! contain no bare LF are written as `text:` multi-line strings.

use super::{Fragment, Node};
use crate::model::Argument;

const INDENT: &str = "    ";

/// Renders each top-level node into a fragment positioned at its line.
#[must_use]
pub fn render(nodes: &[Node]) -> Vec<Fragment> {
    nodes
        .iter()
        .map(|node| {
            let mut out = Output::default();
            out.command(node, 0);
            Fragment {
                line: node.line,
                text: out.finish(),
            }
        })
        .collect()
}

/// Quotes a string, escaping `"` and `\`.
#[must_use]
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn is_multiline(value: &str) -> bool {
    value.ends_with("\r\n")
        && value
            .match_indices('\n')
            .all(|(idx, _)| idx > 0 && value.as_bytes()[idx - 1] == b'\r')
}

#[derive(Default)]
struct Output {
    lines: Vec<String>,
    current: String,
    /// Nothing but indentation written on the current line yet.
    fresh: bool,
}

impl Output {
    fn start_line(&mut self, depth: usize) {
        if !self.current.is_empty() {
            self.lines.push(std::mem::take(&mut self.current));
        }
        self.current = INDENT.repeat(depth);
        self.fresh = true;
    }

    fn word(&mut self, text: &str) {
        if !self.fresh {
            self.current.push(' ');
        }
        self.current.push_str(text);
        self.fresh = false;
    }

    fn raw(&mut self, text: &str) {
        self.current.push_str(text);
        self.fresh = false;
    }

    fn command(&mut self, node: &Node, depth: usize) {
        self.start_line(depth);
        self.word(&node.name);
        self.arguments(&node.arguments, depth);
        self.tests(&node.tests, depth, false);

        match &node.block {
            None => self.raw(";"),
            Some(block) => {
                self.word("{");
                for child in block {
                    self.command(child, depth + 1);
                }
                self.start_line(depth);
                self.raw("}");
            }
        }
    }

    fn arguments(&mut self, arguments: &[Argument], depth: usize) {
        for argument in arguments {
            match argument {
                Argument::Tag(tag) => self.word(tag),
                Argument::Number(number) => self.word(&number.to_string()),
                Argument::StringList(values) => match values.as_slice() {
                    [value] if is_multiline(value) => self.multiline(value, depth),
                    [value] => self.word(&quote(value)),
                    _ => {
                        let items: Vec<String> = values.iter().map(|v| quote(v)).collect();
                        self.word(&format!("[{}]", items.join(", ")));
                    }
                },
            }
        }
    }

    fn tests(&mut self, tests: &[Node], depth: usize, combinator: bool) {
        match tests {
            [] if !combinator => {}
            [test] if !combinator => self.test(test, depth),
            _ => {
                self.word("(");
                self.fresh = true;
                for (idx, test) in tests.iter().enumerate() {
                    if idx > 0 {
                        self.raw(",");
                    }
                    self.test(test, depth);
                }
                self.raw(")");
            }
        }
    }

    fn test(&mut self, test: &Node, depth: usize) {
        self.word(&test.name);
        self.arguments(&test.arguments, depth);
        let combinator =
            test.name.eq_ignore_ascii_case("allof") || test.name.eq_ignore_ascii_case("anyof");
        self.tests(&test.tests, depth, combinator);
    }

    fn multiline(&mut self, value: &str, depth: usize) {
        self.word("text:");
        for line in value.split_terminator("\r\n") {
            self.lines.push(std::mem::take(&mut self.current));
            if line.starts_with('.') {
                self.current = format!(".{line}");
            } else {
                self.current = line.to_string();
            }
        }
        self.lines.push(std::mem::take(&mut self.current));
        self.current = ".".to_string();
        self.start_line(depth);
    }

    fn finish(mut self) -> String {
        if !self.current.is_empty() {
            self.lines.push(self.current);
        }
        self.lines.join("\r\n")
    }
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
    use crate::grammar::parser::parse;

    fn roundtrip(script: &str) -> String {
        let nodes: Vec<Node> = parse(script).into_iter().map(Result::unwrap).collect();
        render(&nodes)
            .into_iter()
            .map(|f| f.text)
            .collect::<Vec<_>>()
            .join("\r\n")
    }

    #[test]
    fn test_canonical_layout() {
        let script = "if allof(header :contains \"From\" \"boss\", size :over 1M){fileinto \"Work\"; stop;}";
        assert_eq!(
            roundtrip(script),
            "if allof (header :contains \"From\" \"boss\", size :over 1M) {\r\n    fileinto \"Work\";\r\n    stop;\r\n}"
        );
    }

    #[test]
    fn test_lists_and_not() {
        assert_eq!(
            roundtrip("if not header :is [\"To\",\"Cc\"] [\"a@b\"] { keep; }"),
            "if not header :is [\"To\", \"Cc\"] \"a@b\" {\r\n    keep;\r\n}"
        );
    }

    #[test]
    fn test_single_test_combinator_keeps_parens() {
        assert_eq!(
            roundtrip("if anyof (true) { stop; }"),
            "if anyof (true) {\r\n    stop;\r\n}"
        );
    }

    #[test]
    fn test_escaped_strings() {
        assert_eq!(
            roundtrip(r#"fileinto "a\"b\\c";"#),
            r#"fileinto "a\"b\\c";"#
        );
    }

    #[test]
    fn test_multiline_string() {
        let script = "vacation :days 7 text:\r\nAway.\r\n..\r\n.\r\n;";
        let rendered = roundtrip(script);
        assert_eq!(rendered, "vacation :days 7 text:\r\nAway.\r\n..\r\n.\r\n;");
        assert_eq!(roundtrip(&rendered), rendered);
    }

    #[test]
    fn test_multiline_inside_block() {
        let script = "if true {\r\n    vacation text:\r\nHi\r\n.\r\n    ;\r\n}";
        assert_eq!(roundtrip(script), script);
    }

    #[test]
    fn test_fragments_are_positioned() {
        let nodes: Vec<Node> = parse("keep;\r\n\r\nstop;")
            .into_iter()
            .map(Result::unwrap)
            .collect();
        let fragments = render(&nodes);
        assert_eq!(fragments[0].line, 1);
        assert_eq!(fragments[1].line, 3);
        assert_eq!(fragments[1].text, "stop;");
    }
}
