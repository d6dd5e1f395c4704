//! Tree walks between grammar nodes and rules.
//!
//! Top-level nodes are grouped into rules: consecutive `require`
//! statements form one rule, an `if` takes the `elsif`/`else` nodes that
//! follow it, and every other command is a rule of its own.

use crate::grammar::{Node, SyntaxError};
use crate::model::{Argument, Command, Rule, Test};
use crate::{Result, ScriptError};

/// Converts parse results into rules.
///
/// `source` holds the lines of the unstripped script; rules that cannot be
/// converted, and every rule when `commented` is set, keep their span of it
/// as verbatim text.
#[must_use]
pub fn rules_from_nodes(
    results: Vec<std::result::Result<Node, SyntaxError>>,
    source: &[&str],
    commented: bool,
) -> Vec<Rule> {
    let mut rules = Vec::new();
    let mut group: Vec<Node> = Vec::new();

    for result in results {
        match result {
            Ok(node) => {
                let joins = group.last().is_some_and(|last| continues(last, &node));
                if !joins && !group.is_empty() {
                    rules.push(rule_from_group(&std::mem::take(&mut group), source, commented));
                }
                group.push(node);
            }
            Err(err) => {
                if !group.is_empty() {
                    rules.push(rule_from_group(&std::mem::take(&mut group), source, commented));
                }
                let error = ScriptError::Syntax {
                    line: err.line,
                    message: err.message,
                };
                let text = span_text(source, err.line, err.end_line);
                let mut rule = Rule::raw(text, err.line, err.end_line);
                rule.error = Some(error.to_string());
                rule.commented = commented;
                rules.push(rule);
            }
        }
    }
    if !group.is_empty() {
        rules.push(rule_from_group(&group, source, commented));
    }
    rules
}

/// Converts a rule back into top-level nodes positioned at the rule's line.
#[must_use]
pub fn nodes_from_rule(rule: &Rule) -> Vec<Node> {
    nodes_from_commands(&rule.commands)
        .into_iter()
        .map(|node| node.at_line(rule.line))
        .collect()
}

/// Converts commands into nodes; a `Require` yields one node per list.
#[must_use]
pub fn nodes_from_commands(commands: &[Command]) -> Vec<Node> {
    let mut nodes = Vec::with_capacity(commands.len());
    for command in commands {
        match command {
            Command::Require(lists) => {
                nodes.extend(
                    lists
                        .iter()
                        .map(|list| Node::new("require", vec![Argument::strings(list)])),
                );
            }
            Command::If { test, actions } | Command::ElseIf { test, actions } => nodes.push(
                Node::new(command.name(), Vec::new())
                    .with_tests(vec![node_from_test(test)])
                    .with_block(nodes_from_commands(actions)),
            ),
            Command::Else { actions } => {
                nodes.push(Node::new("else", Vec::new()).with_block(nodes_from_commands(actions)));
            }
            Command::Action { name, arguments } => nodes.push(Node::new(name, arguments.clone())),
        }
    }
    nodes
}

fn node_from_test(test: &Test) -> Node {
    Node::new(&test.name, test.arguments.clone())
        .with_tests(test.tests.iter().map(node_from_test).collect())
}

/// Returns lines `line..=end_line` (1-based) joined with CRLF.
#[must_use]
pub fn span_text(source: &[&str], line: usize, end_line: usize) -> String {
    let start = line.saturating_sub(1).min(source.len());
    let end = end_line.max(line).min(source.len());
    source[start..end].join("\r\n")
}

fn continues(last: &Node, next: &Node) -> bool {
    let last = last.name.to_ascii_lowercase();
    match next.name.to_ascii_lowercase().as_str() {
        "elsif" | "else" => last == "if" || last == "elsif",
        "require" => last == "require",
        _ => false,
    }
}

fn rule_from_group(group: &[Node], source: &[&str], commented: bool) -> Rule {
    let line = group.first().map_or(0, |n| n.line);
    let end_line = group.last().map_or(line, |n| n.end_line);

    let mut rule = match commands_from_nodes(group) {
        Ok(commands) => {
            let mut rule = Rule::new(commands, line, end_line);
            if commented {
                rule.text = Some(span_text(source, line, end_line));
            }
            rule
        }
        Err(err) => {
            tracing::debug!(line, %err, "keeping rule as text");
            let mut rule = Rule::raw(span_text(source, line, end_line), line, end_line);
            rule.error = Some(err.to_string());
            rule
        }
    };
    rule.commented = commented;
    rule
}

/// Converts a command sequence, checking that `elsif`/`else` follow an `if`.
///
/// # Errors
///
/// Returns [`ScriptError::Unsupported`] for nodes that do not form a valid
/// command, such as an `else` without a block or an `elsif` after an action.
pub fn commands_from_nodes(nodes: &[Node]) -> Result<Vec<Command>> {
    let mut commands: Vec<Command> = Vec::with_capacity(nodes.len());
    for node in nodes {
        let command = command_from_node(node)?;

        let chained = matches!(command, Command::ElseIf { .. } | Command::Else { .. });
        let after_if = matches!(
            commands.last(),
            Some(Command::If { .. } | Command::ElseIf { .. })
        );
        if chained && !after_if {
            return Err(ScriptError::Unsupported {
                line: node.line,
                construct: format!("{} without if", command.name()),
            });
        }

        match (commands.last_mut(), command) {
            (Some(Command::Require(lists)), Command::Require(more)) => lists.extend(more),
            (_, command) => commands.push(command),
        }
    }
    Ok(commands)
}

fn command_from_node(node: &Node) -> Result<Command> {
    let unsupported = |construct: String| ScriptError::Unsupported {
        line: node.line,
        construct,
    };

    match node.name.to_ascii_lowercase().as_str() {
        "require" => match node.arguments.as_slice() {
            [Argument::StringList(list)] if node.tests.is_empty() && node.block.is_none() => {
                Ok(Command::Require(vec![list.clone()]))
            }
            _ => Err(unsupported("require without a string list".to_string())),
        },
        keyword @ ("if" | "elsif") => {
            let (Some(block), [test]) = (&node.block, node.tests.as_slice()) else {
                return Err(unsupported(format!("{keyword} without a test and a block")));
            };
            if !node.arguments.is_empty() {
                return Err(unsupported(format!("arguments to {keyword}")));
            }
            let test = test_from_node(test);
            let actions = commands_from_nodes(block)?;
            Ok(if keyword == "if" {
                Command::If { test, actions }
            } else {
                Command::ElseIf { test, actions }
            })
        }
        "else" => match &node.block {
            Some(block) if node.tests.is_empty() && node.arguments.is_empty() => Ok(Command::Else {
                actions: commands_from_nodes(block)?,
            }),
            _ => Err(unsupported("else without a block".to_string())),
        },
        _ if node.block.is_some() => Err(unsupported(format!("block after {}", node.name))),
        _ if !node.tests.is_empty() => Err(unsupported(format!("test after {}", node.name))),
        _ => Ok(Command::action(node.name.clone(), node.arguments.clone())),
    }
}

fn test_from_node(node: &Node) -> Test {
    Test {
        name: node.name.clone(),
        arguments: node.arguments.clone(),
        tests: node.tests.iter().map(test_from_node).collect(),
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

    fn convert(script: &str, commented: bool) -> Vec<Rule> {
        let lines: Vec<&str> = script.lines().collect();
        rules_from_nodes(parse(script), &lines, commented)
    }

    #[test]
    fn test_grouping() {
        let script = "require \"fileinto\";\r\nrequire \"reject\";\r\n\r\nif true {\r\n    stop;\r\n} elsif false {\r\n    keep;\r\n} else {\r\n    discard;\r\n}\r\nkeep;\r\n";
        let rules = convert(script, false);
        assert_eq!(rules.len(), 3);

        assert_eq!(
            rules[0].commands,
            vec![Command::Require(vec![
                vec!["fileinto".to_string()],
                vec!["reject".to_string()]
            ])]
        );
        assert_eq!((rules[0].line, rules[0].end_line), (1, 2));

        let names: Vec<&str> = rules[1].commands.iter().map(Command::name).collect();
        assert_eq!(names, vec!["if", "elsif", "else"]);
        assert_eq!((rules[1].line, rules[1].end_line), (4, 10));
        assert_eq!(rules[2].line, 11);
        assert!(rules.iter().all(|r| r.text.is_none()));
    }

    #[test]
    fn test_commented_rules_keep_source() {
        let raw = "#<!-->keep;";
        let stripped = "keep;";
        let lines = vec![raw];
        let rules = rules_from_nodes(parse(stripped), &lines, true);
        assert!(rules[0].commented);
        assert_eq!(rules[0].text.as_deref(), Some(raw));
        assert_eq!(rules[0].commands, vec![Command::action("keep", vec![])]);
    }

    #[test]
    fn test_syntax_error_becomes_raw_rule() {
        let rules = convert("keep;\r\nfileinto [\"a\";\r\nstop;", false);
        assert_eq!(rules.len(), 3);
        assert!(rules[1].is_raw());
        assert_eq!(rules[1].text.as_deref(), Some("fileinto [\"a\";"));
        assert!(rules[1].error.as_deref().unwrap().starts_with("line 2: syntax error"));
    }

    #[test]
    fn test_unsupported_constructs() {
        let rules = convert("elsif true { stop; }", false);
        assert!(rules[0].error.as_deref().unwrap().contains("elsif without if"));

        let rules = convert("if true { else { stop; } }", false);
        assert!(rules[0].error.as_deref().unwrap().contains("else without if"));

        let rules = convert("foreverypart { keep; }", false);
        assert!(rules[0].error.as_deref().unwrap().contains("block after foreverypart"));
        assert_eq!(rules[0].text.as_deref(), Some("foreverypart { keep; }"));
    }

    #[test]
    fn test_nodes_from_rule() {
        let rule = Rule::new(
            vec![
                Command::Require(vec![vec!["a".to_string()], vec!["b".to_string()]]),
                Command::If {
                    test: Test::combine("not", vec![Test::new("exists", vec![Argument::string("X")])]),
                    actions: vec![Command::action("keep", vec![])],
                },
            ],
            4,
            6,
        );
        let nodes = nodes_from_rule(&rule);
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[1].name, "require");
        assert_eq!(nodes[2].tests[0].tests[0].name, "exists");
        assert!(nodes.iter().all(|n| n.line == 4));
        assert_eq!(nodes[2].block.as_ref().unwrap()[0].name, "keep");
    }

    #[test]
    fn test_span_text_clamps() {
        let lines = vec!["a", "b", "c"];
        assert_eq!(span_text(&lines, 2, 3), "b\r\nc");
        assert_eq!(span_text(&lines, 3, 9), "c");
        assert_eq!(span_text(&lines, 5, 6), "");
    }
}
