//! Rules to script.
//!
//! Layout of a written script:
//!
//! ```text
//! # Sieve filter
//! require [...];
//!
//! ## Flag: …|UniqueId:…|Rulename: …
//! if … {
//!     …
//! }
//!
//! keep;
//! ```
//!
//! A blank line follows the require line and every rule that spans more
//! than one line. Disabled rules have every line prefixed with `#<!-->`.

use std::collections::BTreeSet;

use crate::convert::nodes_from_rule;
use crate::grammar::{ScriptGrammar, SieveGrammar};
use crate::metadata::format_comment;
use crate::model::{Command, Rule};
use crate::require::{reconcile, require_rule};
use crate::{DISABLED_MARKER, SCRIPT_HEADER};

/// Turns rules into script text.
#[derive(Debug, Clone, Default)]
pub struct ScriptWriter<G = SieveGrammar> {
    grammar: G,
}

impl ScriptWriter {
    /// Creates a writer using the built-in Sieve grammar.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            grammar: SieveGrammar,
        }
    }
}

/// Lines written for one rule.
struct Chunk {
    metadata: Option<String>,
    body: Vec<String>,
}

impl Chunk {
    fn into_lines(self) -> Vec<String> {
        self.metadata.into_iter().chain(self.body).collect()
    }
}

impl<G: ScriptGrammar> ScriptWriter<G> {
    /// Creates a writer using another grammar.
    #[must_use]
    pub const fn with_grammar(grammar: G) -> Self {
        Self { grammar }
    }

    /// Writes `rules` as a script.
    ///
    /// Require commands in `rules` are ignored; the require line is rebuilt
    /// from the enabled rules, limited to `server_extensions`, plus
    /// `retain`. Lines are joined with CRLF.
    #[must_use]
    pub fn write(
        &self,
        rules: &[Rule],
        server_extensions: &BTreeSet<String>,
        retain: &BTreeSet<String>,
    ) -> String {
        let mut rules = without_require(rules);
        let extensions = reconcile(&rules, server_extensions, retain);
        if let Some(require) = require_rule(&extensions) {
            rules.insert(0, require);
        }

        let chunks: Vec<Chunk> = rules.iter().map(|rule| self.chunk(rule)).collect();
        relayout(&mut rules, &chunks);

        let mut buffer = LineBuffer::default();
        buffer.place(1, vec![SCRIPT_HEADER.to_string()], false);

        let mut gap = false;
        for (rule, chunk) in rules.iter().zip(chunks) {
            let start = match (&chunk.metadata, &rule.comment) {
                (Some(_), Some(comment)) => comment.line,
                _ => rule.line,
            };
            let spans_lines = chunk.body.len() > 1;
            buffer.place(start, chunk.into_lines(), gap);
            gap = rule.is_require() || spans_lines;
        }

        tracing::debug!(
            rules = rules.len(),
            extensions = extensions.len(),
            "wrote script"
        );
        buffer.finish()
    }

    /// Renumbers rules the way [`write`](Self::write) lays them out.
    ///
    /// Sets `line`, `end_line`, `position` and the comment line of every
    /// rule, counting from line 2 (right after the script header).
    pub fn layout(&self, rules: &mut [Rule]) {
        let chunks: Vec<Chunk> = rules.iter().map(|rule| self.chunk(rule)).collect();
        relayout(rules, &chunks);
    }

    fn chunk(&self, rule: &Rule) -> Chunk {
        let metadata = rule
            .comment
            .as_ref()
            .filter(|c| c.is_written() && !rule.is_require())
            .map(|c| format_comment(c, rule.commented));

        let body = if rule.is_raw() {
            rule.text
                .as_deref()
                .unwrap_or_default()
                .split('\n')
                .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
                .collect()
        } else {
            let fragments = self.grammar.render(&nodes_from_rule(rule));
            fragments
                .iter()
                .flat_map(|fragment| fragment.lines())
                .map(|line| {
                    if rule.commented {
                        format!("{DISABLED_MARKER}{line}")
                    } else {
                        line.to_string()
                    }
                })
                .collect()
        };

        Chunk { metadata, body }
    }
}

/// Drops require commands, and rules that held nothing else.
fn without_require(rules: &[Rule]) -> Vec<Rule> {
    rules
        .iter()
        .filter_map(|rule| {
            if rule.is_raw() {
                return Some(rule.clone());
            }
            let mut rule = rule.clone();
            rule.commands.retain(|c| !matches!(c, Command::Require(_)));
            (!rule.commands.is_empty()).then_some(rule)
        })
        .collect()
}

fn relayout(rules: &mut [Rule], chunks: &[Chunk]) {
    let mut next = 2;
    for (position, (rule, chunk)) in rules.iter_mut().zip(chunks).enumerate() {
        rule.position = position;
        if chunk.metadata.is_some()
            && let Some(comment) = rule.comment.as_mut()
        {
            comment.line = next;
            next += 1;
        }

        let body_lines = chunk.body.len().max(1);
        rule.line = next;
        rule.end_line = next + body_lines - 1;
        next = rule.end_line + 1;
        if rule.is_require() || body_lines > 1 {
            next += 1;
        }
    }
}

/// Line-indexed output buffer.
#[derive(Default)]
struct LineBuffer {
    lines: Vec<String>,
}

impl LineBuffer {
    /// Writes `chunk` starting at `line` (1-based).
    ///
    /// Blank filler is added up to `line`. If earlier content already runs
    /// past it, the chunk goes right after that content instead, preceded
    /// by one blank line when `gap` is set.
    fn place(&mut self, line: usize, chunk: Vec<String>, gap: bool) {
        let start = line.saturating_sub(1);
        if self.lines.len() <= start {
            self.lines.resize(start, String::new());
        } else {
            tracing::debug!(line, actual = self.lines.len() + 1, "moving chunk down");
            while self.lines.last().is_some_and(String::is_empty) {
                self.lines.pop();
            }
            if gap {
                self.lines.push(String::new());
            }
        }
        self.lines.extend(chunk);
    }

    fn finish(self) -> String {
        let mut out = self.lines.join("\r\n");
        out.push_str("\r\n");
        out
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
    use crate::model::{Argument, RuleComment, Test};

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn work_rule() -> Rule {
        let mut rule = Rule::new(
            vec![Command::If {
                test: Test::new(
                    "header",
                    vec![
                        Argument::tag(":contains"),
                        Argument::string("List-Id"),
                        Argument::string("work"),
                    ],
                ),
                actions: vec![Command::action("fileinto", vec![Argument::string("Work")])],
            }],
            0,
            0,
        );
        rule.comment = Some(RuleComment {
            unique_id: 3,
            flags: vec!["work".to_string()],
            name: Some("Work mail".to_string()),
            line: 0,
            error: None,
            implicit: false,
        });
        rule
    }

    #[test]
    fn test_write_layout() {
        let keep = Rule::new(vec![Command::action("keep", vec![])], 0, 0);
        let text = ScriptWriter::new().write(
            &[work_rule(), keep],
            &set(&["fileinto", "vacation"]),
            &BTreeSet::new(),
        );

        assert_eq!(
            text,
            "# Sieve filter\r\n\
             require \"fileinto\";\r\n\
             \r\n\
             ## Flag: work|UniqueId:3|Rulename: Work mail\r\n\
             if header :contains \"List-Id\" \"work\" {\r\n\
             \x20   fileinto \"Work\";\r\n\
             }\r\n\
             \r\n\
             keep;\r\n"
        );
    }

    #[test]
    fn test_disabled_rule_gets_marker() {
        let mut rule = work_rule();
        rule.commented = true;
        let text = ScriptWriter::new().write(&[rule], &set(&["fileinto"]), &BTreeSet::new());

        assert_eq!(
            text,
            "# Sieve filter\r\n\
             #<!-->## Flag: work|UniqueId:3|Rulename: Work mail\r\n\
             #<!-->if header :contains \"List-Id\" \"work\" {\r\n\
             #<!-->    fileinto \"Work\";\r\n\
             #<!-->}\r\n"
        );
    }

    #[test]
    fn test_raw_rules_are_verbatim() {
        let note = Rule::raw("# note one\r\n# note two", 2, 3);
        let mut broken = Rule::raw("if junk {", 5, 5);
        broken.error = Some("line 5: syntax error".to_string());
        broken.comment = Some(RuleComment {
            unique_id: 4,
            ..RuleComment::new(4)
        });

        let text = ScriptWriter::new().write(&[note, broken], &BTreeSet::new(), &BTreeSet::new());
        assert_eq!(
            text,
            "# Sieve filter\r\n\
             # note one\r\n\
             # note two\r\n\
             \r\n\
             ## Flag: |UniqueId:4|Rulename: \r\n\
             if junk {\r\n"
        );
    }

    #[test]
    fn test_implicit_id_is_not_written() {
        let mut rule = Rule::new(vec![Command::action("keep", vec![])], 0, 0);
        rule.comment = Some(RuleComment {
            unique_id: 2,
            implicit: true,
            ..RuleComment::new(0)
        });
        let text = ScriptWriter::new().write(&[rule.clone()], &BTreeSet::new(), &BTreeSet::new());
        assert_eq!(text, "# Sieve filter\r\nkeep;\r\n");

        rule.comment.as_mut().unwrap().flags.push("seen".to_string());
        let text = ScriptWriter::new().write(&[rule], &BTreeSet::new(), &BTreeSet::new());
        assert_eq!(text, "# Sieve filter\r\n## Flag: seen|UniqueId:2|Rulename: \r\nkeep;\r\n");
    }

    #[test]
    fn test_stale_require_is_replaced() {
        let require = Rule::new(vec![Command::Require(vec![vec!["regex".into()]])], 2, 2);
        let keep = Rule::new(vec![Command::action("keep", vec![])], 4, 4);

        let text = ScriptWriter::new().write(&[require, keep], &set(&["regex"]), &BTreeSet::new());
        assert_eq!(text, "# Sieve filter\r\nkeep;\r\n");

        let text = ScriptWriter::new().write(
            &[Rule::new(vec![Command::action("keep", vec![])], 4, 4)],
            &BTreeSet::new(),
            &set(&["imapflags", "imap4flags"]),
        );
        assert_eq!(text, "# Sieve filter\r\nrequire \"imap4flags\";\r\n\r\nkeep;\r\n");
    }

    #[test]
    fn test_layout_numbers_rules() {
        let mut rules = vec![work_rule(), Rule::new(vec![Command::action("stop", vec![])], 0, 0)];
        ScriptWriter::new().layout(&mut rules);

        assert_eq!(rules[0].comment.as_ref().unwrap().line, 2);
        assert_eq!((rules[0].line, rules[0].end_line), (3, 5));
        assert_eq!((rules[1].line, rules[1].end_line, rules[1].position), (7, 7, 1));
    }

    #[test]
    fn test_line_buffer_resolves_conflicts() {
        let mut buffer = LineBuffer::default();
        buffer.place(1, vec!["a".into()], false);
        buffer.place(4, vec!["b".into(), "c".into()], false);
        buffer.place(4, vec!["d".into()], true);
        buffer.place(6, vec!["e".into()], false);
        assert_eq!(buffer.finish(), "a\r\n\r\n\r\nb\r\nc\r\n\r\nd\r\ne\r\n");
    }
}
