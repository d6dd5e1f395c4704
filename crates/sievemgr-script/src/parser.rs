//! Script to rules.
//!
//! The script is parsed twice: once as is, which yields the active rules,
//! and once after [`strip_comments`], which yields the rules disabled with
//! the `#<!-->` marker. Both lists are merged by line, then metadata
//! comments and free comment blocks are recovered from the lines no rule
//! covers.

use std::collections::HashSet;

use crate::convert::{rules_from_nodes, span_text};
use crate::grammar::{ScriptGrammar, SieveGrammar};
use crate::metadata::parse_comment;
use crate::model::{ClientRulesAndRequire, ParseResult, Rule, RuleComment};
use crate::SCRIPT_HEADER;
use crate::strip::strip_comments;

/// Turns script text into rules.
#[derive(Debug, Clone, Default)]
pub struct ScriptParser<G = SieveGrammar> {
    grammar: G,
}

impl ScriptParser {
    /// Creates a parser using the built-in Sieve grammar.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            grammar: SieveGrammar,
        }
    }
}

impl<G: ScriptGrammar> ScriptParser<G> {
    /// Creates a parser using another grammar.
    #[must_use]
    pub const fn with_grammar(grammar: G) -> Self {
        Self { grammar }
    }

    /// Parses a script into rules.
    ///
    /// Never fails: rules and metadata comments that cannot be read are kept
    /// as verbatim text and `had_errors` is set.
    #[must_use]
    pub fn parse(&self, script: &str) -> ParseResult {
        let lines: Vec<&str> = script.lines().collect();
        let stripped = strip_comments(script);

        let mut rules = rules_from_nodes(self.grammar.parse(script), &lines, false);
        rules.extend(rules_from_nodes(self.grammar.parse(&stripped), &lines, true));
        rules.sort_by_key(|r| r.line);

        let (comments, mut loose) = scan_uncovered(&lines, &rules);
        loose.extend(attach_comments(&mut rules, comments, &lines));

        let had_errors = fold_errors(&mut rules, &lines);

        rules.extend(loose);
        rules.sort_by_key(|r| r.line);
        let next_unique_id = assign_unique_ids(&mut rules);
        for (position, rule) in rules.iter_mut().enumerate() {
            rule.position = position;
        }

        tracing::debug!(
            rules = rules.len(),
            next_unique_id,
            had_errors,
            "parsed script"
        );
        ParseResult {
            rules,
            next_unique_id,
            had_errors,
        }
    }

    /// Parses a script and splits off the require rule.
    #[must_use]
    pub fn parse_client_rules(&self, script: &str) -> ClientRulesAndRequire {
        self.parse(script).into()
    }
}

/// Collects metadata comments and free comment blocks from the lines no
/// rule spans.
fn scan_uncovered(lines: &[&str], rules: &[Rule]) -> (Vec<RuleComment>, Vec<Rule>) {
    let mut covered = vec![false; lines.len() + 1];
    for rule in rules {
        for line in rule.line..=rule.end_line.min(lines.len()) {
            covered[line] = true;
        }
    }

    let mut comments = Vec::new();
    let mut blocks = Vec::new();
    let mut block: Option<(usize, usize)> = None;

    for (idx, text) in lines.iter().enumerate() {
        let line = idx + 1;
        let is_header = line == 1 && text.trim_end() == SCRIPT_HEADER;
        let metadata = if covered[line] || is_header {
            None
        } else {
            parse_comment(text, line)
        };

        if covered[line] || is_header || text.trim().is_empty() || metadata.is_some() {
            if let Some((start, end)) = block.take() {
                blocks.push(Rule::raw(span_text(lines, start, end), start, end));
            }
            comments.extend(metadata);
            continue;
        }

        block = Some(block.map_or((line, line), |(start, _)| (start, line)));
    }
    if let Some((start, end)) = block {
        blocks.push(Rule::raw(span_text(lines, start, end), start, end));
    }
    (comments, blocks)
}

/// Attaches each comment to the nearest rule below it.
///
/// Returns the comments no rule claimed, as verbatim rules.
fn attach_comments(
    rules: &mut [Rule],
    comments: Vec<RuleComment>,
    lines: &[&str],
) -> Vec<Rule> {
    let mut unclaimed = Vec::new();

    for comment in comments {
        let target = rules
            .iter_mut()
            .filter(|r| r.line > comment.line)
            .min_by_key(|r| r.line - comment.line);

        let Some(rule) = target else {
            unclaimed.push(comment);
            continue;
        };
        // Comments arrive in line order, so a later one is always closer.
        if let Some(previous) = rule.comment.replace(comment) {
            unclaimed.push(previous);
        }
    }

    unclaimed
        .into_iter()
        .map(|comment| {
            tracing::debug!(line = comment.line, "metadata comment without a rule");
            let text = span_text(lines, comment.line, comment.line);
            Rule::raw(text, comment.line, comment.line)
        })
        .collect()
}

/// Demotes rules with a bad comment or a conversion error to text.
///
/// Returns true if any rule was affected.
fn fold_errors(rules: &mut [Rule], lines: &[&str]) -> bool {
    let mut had_errors = false;

    for rule in rules.iter_mut() {
        let comment_error = rule.comment.as_ref().and_then(|c| c.error.clone());
        if let Some(error) = comment_error {
            let from = rule.comment.as_ref().map_or(rule.line, |c| c.line);
            tracing::warn!(line = from, %error, "keeping rule with bad metadata as text");
            rule.commands.clear();
            rule.text = Some(span_text(lines, from, rule.end_line));
            rule.error = Some(error);
        } else if let Some(error) = &rule.error {
            tracing::warn!(line = rule.line, %error, "keeping unparsable rule as text");
            rule.commands.clear();
            if rule.text.is_none() {
                rule.text = Some(span_text(lines, rule.line, rule.end_line));
            }
        }
        had_errors |= rule.error.is_some();
    }
    had_errors
}

/// Gives every rule a unique id and returns the next free one.
///
/// Explicit ids are kept unless an earlier rule already uses them; every
/// other rule gets the next id above the largest explicit one.
fn assign_unique_ids(rules: &mut [Rule]) -> i64 {
    let mut ids = IdAllocator::default();

    for rule in rules.iter_mut().filter(|r| needs_id(r)) {
        if let Some(comment) = rule.comment.as_mut().filter(|c| c.has_unique_id())
            && !ids.claim(comment.unique_id)
        {
            tracing::debug!(id = comment.unique_id, line = comment.line, "duplicate unique id");
            comment.unique_id = RuleComment::UNASSIGNED;
        }
    }

    for rule in rules.iter_mut().filter(|r| needs_id(r)) {
        let line = rule.line.saturating_sub(1);
        let comment = rule.comment.get_or_insert_with(|| RuleComment {
            implicit: true,
            ..RuleComment::new(line)
        });
        if !comment.has_unique_id() {
            comment.unique_id = ids.take();
        }
    }
    ids.peek()
}

/// Ids in use and the largest of them.
#[derive(Debug, Default)]
struct IdAllocator {
    seen: HashSet<i64>,
    max: i64,
}

impl IdAllocator {
    /// Records an explicit id; false if it was already taken.
    fn claim(&mut self, id: i64) -> bool {
        self.max = self.max.max(id);
        self.seen.insert(id)
    }

    /// Returns the id the next rule would get.
    ///
    /// Once the largest id is `i64::MAX` there is nothing above it, so the
    /// smallest unused positive id is handed out instead.
    fn peek(&self) -> i64 {
        self.max.checked_add(1).unwrap_or_else(|| {
            (1..i64::MAX)
                .find(|id| !self.seen.contains(id))
                .unwrap_or(RuleComment::UNASSIGNED)
        })
    }

    fn take(&mut self) -> i64 {
        let id = self.peek();
        if self.max == i64::MAX {
            tracing::warn!(id, "unique ids exhausted above the largest id, reusing a gap");
        }
        self.claim(id);
        id
    }
}

fn needs_id(rule: &Rule) -> bool {
    !rule.is_passthrough() && !rule.is_require()
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
    use crate::model::{Argument, Command};

    fn parse(script: &str) -> ParseResult {
        ScriptParser::new().parse(script)
    }

    #[test]
    fn test_active_and_disabled_rules_merge_in_order() {
        let script = "# Sieve filter\r\nrequire \"fileinto\";\r\n\r\nkeep;\r\n#<!-->discard;\r\nstop;\r\n";
        let result = parse(script);

        let lines: Vec<(usize, bool)> = result.rules.iter().map(|r| (r.line, r.commented)).collect();
        assert_eq!(lines, vec![(2, false), (4, false), (5, true), (6, false)]);
        assert_eq!(result.rules[2].text.as_deref(), Some("#<!-->discard;"));
        assert_eq!(result.rules[2].commands, vec![Command::action("discard", vec![])]);
        assert!(!result.had_errors);
        assert_eq!(
            result.rules.iter().map(|r| r.position).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
    }

    #[test]
    fn test_comment_attaches_to_rule_below() {
        let script = "# Sieve filter\r\n\r\n\r\nkeep;\r\n## Flag: x|UniqueId:7|Rulename: Below\r\nstop;\r\n";
        let result = parse(script);

        let keep = &result.rules[0];
        let stop = &result.rules[1];
        assert_eq!((keep.line, stop.line), (4, 6));
        assert_eq!(stop.unique_id(), Some(7));
        assert_eq!(stop.name(), Some("Below"));
        assert_eq!(stop.comment.as_ref().unwrap().flags, vec!["x"]);
        assert_ne!(keep.unique_id(), Some(7));
    }

    #[test]
    fn test_free_comments_become_passthrough_rules() {
        let script = "# Sieve filter\r\n# first note\r\n# second note\r\n\r\nkeep;\r\n/* tail */\r\n";
        let result = parse(script);

        assert_eq!(result.rules.len(), 3);
        let note = &result.rules[0];
        assert!(note.is_passthrough());
        assert_eq!(note.text.as_deref(), Some("# first note\r\n# second note"));
        assert_eq!((note.line, note.end_line), (2, 3));
        assert_eq!(result.rules[2].text.as_deref(), Some("/* tail */"));
        assert!(result.rules[0].comment.is_none());
    }

    #[test]
    fn test_header_is_not_a_comment_block() {
        let result = parse("# Sieve filter\r\nkeep;");
        assert_eq!(result.rules.len(), 1);
    }

    #[test]
    fn test_syntax_error_is_local() {
        let script = "keep;\r\n## Flag: |UniqueId:2|Rulename: Broken\r\nif header :is \"a\" {\r\n    fileinto\r\n}\r\nstop;\r\n";
        let result = parse(script);

        assert!(result.had_errors);
        let broken = &result.rules[1];
        assert!(broken.commands.is_empty());
        assert!(broken.error.is_some());
        assert_eq!(
            broken.text.as_deref(),
            Some("if header :is \"a\" {\r\n    fileinto\r\n}")
        );
        assert_eq!(broken.unique_id(), Some(2));
        assert_eq!(result.rules[2].commands, vec![Command::action("stop", vec![])]);
    }

    #[test]
    fn test_bad_metadata_keeps_comment_line_in_text() {
        let script = "## Flag: bad flag|UniqueId:1|Rulename: x\r\nfileinto \"a\";\r\n";
        let result = parse(script);

        assert!(result.had_errors);
        let rule = &result.rules[0];
        assert!(rule.commands.is_empty());
        assert_eq!(
            rule.text.as_deref(),
            Some("## Flag: bad flag|UniqueId:1|Rulename: x\r\nfileinto \"a\";")
        );
        assert!(rule.error.as_deref().unwrap().contains("invalid flag"));
    }

    #[test]
    fn test_unique_ids_fill_gaps() {
        let script = "## Flag: |UniqueId:5|Rulename: a\r\nkeep;\r\nstop;\r\n## Flag: |UniqueId:2|Rulename: c\r\ndiscard;\r\n## Flag: |UniqueId:5|Rulename: d\r\nkeep;\r\n";
        let result = parse(script);

        let ids: Vec<Option<i64>> = result.rules.iter().map(Rule::unique_id).collect();
        assert_eq!(ids, vec![Some(5), Some(6), Some(2), Some(7)]);
        assert_eq!(result.next_unique_id, 8);
    }

    #[test]
    fn test_missing_ids_follow_the_largest() {
        let script = "## Flag: |UniqueId:3|Rulename: a\r\nkeep;\r\nstop;\r\n## Flag: |UniqueId:10|Rulename: b\r\ndiscard;\r\nkeep;\r\n";
        let result = parse(script);

        let ids: Vec<Option<i64>> = result.rules.iter().map(Rule::unique_id).collect();
        assert_eq!(ids, vec![Some(3), Some(11), Some(10), Some(12)]);
        assert_eq!(result.next_unique_id, 13);
    }

    #[test]
    fn test_negative_id_counts_as_missing() {
        let script = "## Flag: |UniqueId:-7|Rulename: neg\r\nkeep;\r\n## Flag: |UniqueId:4|Rulename: b\r\nstop;\r\n";
        let result = parse(script);

        assert!(!result.had_errors);
        assert_eq!(result.rules[0].name(), Some("neg"));
        assert_eq!(result.rules[0].unique_id(), Some(5));
        assert_eq!(result.rules[1].unique_id(), Some(4));
        assert_eq!(result.next_unique_id, 6);
    }

    #[test]
    fn test_largest_possible_id() {
        let result = parse("## Flag: |UniqueId:9223372036854775807|Rulename: x\r\nkeep;\r\n");
        assert_eq!(result.rules[0].unique_id(), Some(i64::MAX));
        assert_eq!(result.next_unique_id, 1);

        let script = "## Flag: |UniqueId:9223372036854775806|Rulename: x\r\nkeep;\r\nstop;\r\ndiscard;\r\n";
        let result = parse(script);
        let ids: Vec<Option<i64>> = result.rules.iter().map(Rule::unique_id).collect();
        assert_eq!(ids, vec![Some(i64::MAX - 1), Some(i64::MAX), Some(1)]);
        assert_eq!(result.next_unique_id, 2);
    }

    #[test]
    fn test_assigned_ids_are_implicit() {
        let result = parse("## Flag: |UniqueId:1|Rulename: \r\nkeep;\r\nstop;\r\n");
        assert!(!result.rules[0].comment.as_ref().unwrap().implicit);
        assert!(result.rules[1].comment.as_ref().unwrap().implicit);
    }

    #[test]
    fn test_deeply_nested_rule_is_kept_as_text() {
        let nested = format!("if {}true {{ stop; }}", "not ".repeat(10_000));
        let script = format!("keep;\r\n{nested}\r\n");
        let result = parse(&script);

        assert!(result.had_errors);
        assert_eq!(result.rules.len(), 2);
        assert!(result.rules[1].commands.is_empty());
        assert_eq!(result.rules[1].text.as_deref(), Some(nested.as_str()));
        assert!(result.rules[1].error.as_deref().unwrap().contains("nesting too deep"));
    }

    #[test]
    fn test_ids_start_at_one() {
        let result = parse("keep;\r\nstop;\r\n");
        let ids: Vec<Option<i64>> = result.rules.iter().map(Rule::unique_id).collect();
        assert_eq!(ids, vec![Some(1), Some(2)]);
        assert_eq!(result.next_unique_id, 3);
    }

    #[test]
    fn test_orphan_metadata_is_kept() {
        let result = parse("keep;\r\n## Flag: |UniqueId:9|Rulename: gone\r\n");
        let last = result.rules.last().unwrap();
        assert!(last.is_passthrough());
        assert_eq!(last.text.as_deref(), Some("## Flag: |UniqueId:9|Rulename: gone"));
        assert_eq!(result.next_unique_id, 2);
    }

    #[test]
    fn test_client_split() {
        let script = "# Sieve filter\r\nrequire [\"fileinto\", \"vacation\"];\r\n\r\nfileinto \"x\";\r\n";
        let client = ScriptParser::new().parse_client_rules(script);

        let require = client.require.unwrap();
        assert_eq!(
            require.commands,
            vec![Command::Require(vec![vec!["fileinto".into(), "vacation".into()]])]
        );
        assert_eq!(client.rules.len(), 1);
        assert_eq!(
            client.rules[0].commands,
            vec![Command::action("fileinto", vec![Argument::string("x")])]
        );
        assert!(client.retain.is_empty());
        assert_eq!(client.next_unique_id, 2);
    }
}
