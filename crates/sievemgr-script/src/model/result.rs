//! Parse outputs.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{Command, Rule};

/// Result of parsing one script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseResult {
    /// Rules in source order, require rule included.
    pub rules: Vec<Rule>,
    /// Id to give the next new rule.
    pub next_unique_id: i64,
    /// At least one rule or metadata comment could not be read.
    pub had_errors: bool,
}

/// Parse result split the way an editor consumes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRulesAndRequire {
    /// The merged require rule, if the script had one.
    pub require: Option<Rule>,
    /// Everything else, in order.
    pub rules: Vec<Rule>,
    /// Extensions to keep on write even if no rule needs them.
    ///
    /// Filled from the require rule when the script had errors, since the
    /// verbatim rules may still depend on them.
    pub retain: BTreeSet<String>,
    /// Id to give the next new rule.
    pub next_unique_id: i64,
    /// At least one rule or metadata comment could not be read.
    pub had_errors: bool,
}

impl From<ParseResult> for ClientRulesAndRequire {
    fn from(result: ParseResult) -> Self {
        let mut require: Option<Rule> = None;
        let mut rules = Vec::with_capacity(result.rules.len());

        for rule in result.rules {
            if !rule.is_require() {
                rules.push(rule);
                continue;
            }
            match require.as_mut() {
                Some(merged) => merged.commands.extend(rule.commands),
                None => require = Some(rule),
            }
        }

        let retain = if result.had_errors {
            require
                .iter()
                .flat_map(|r| &r.commands)
                .filter_map(|c| match c {
                    Command::Require(lists) => Some(lists),
                    _ => None,
                })
                .flatten()
                .flatten()
                .cloned()
                .collect()
        } else {
            BTreeSet::new()
        };

        Self {
            require,
            rules,
            retain,
            next_unique_id: result.next_unique_id,
            had_errors: result.had_errors,
        }
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

    fn require(exts: &[&str], line: usize) -> Rule {
        Rule::new(
            vec![Command::Require(vec![
                exts.iter().map(|e| (*e).to_string()).collect(),
            ])],
            line,
            line,
        )
    }

    #[test]
    fn test_split_merges_require_rules() {
        let result = ParseResult {
            rules: vec![
                require(&["fileinto"], 2),
                require(&["vacation"], 3),
                Rule::new(vec![Command::action("keep", vec![])], 5, 5),
            ],
            next_unique_id: 1,
            had_errors: false,
        };

        let split = ClientRulesAndRequire::from(result);
        assert_eq!(split.require.unwrap().commands.len(), 2);
        assert_eq!(split.rules.len(), 1);
        assert!(split.retain.is_empty());
    }

    #[test]
    fn test_retain_only_after_errors() {
        let result = ParseResult {
            rules: vec![require(&["fileinto", "regex"], 2), Rule::raw("if bad", 4, 4)],
            next_unique_id: 1,
            had_errors: true,
        };

        let split = ClientRulesAndRequire::from(result);
        assert_eq!(
            split.retain.into_iter().collect::<Vec<_>>(),
            vec!["fileinto", "regex"]
        );
    }
}
