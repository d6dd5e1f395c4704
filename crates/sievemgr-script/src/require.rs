//! Require reconciliation.
//!
//! The `require` line is never edited by hand: on every write it is
//! recomputed from the commands in use, limited to what the server
//! supports.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::grammar::render::quote;
use crate::model::{Argument, Command, Rule, Test};

/// Line the require rule is written on.
pub const REQUIRE_LINE: usize = 2;

/// Comparators every implementation supports without a require.
const BUILTIN_COMPARATORS: [&str; 2] = ["i;octet", "i;ascii-casemap"];

/// Returns the extensions a command (and everything nested in it) uses.
#[must_use]
pub fn required_extensions(command: &Command) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    collect_command(command, &mut found);
    found
}

/// Computes the require set for `rules`.
///
/// Require commands and disabled rules are ignored. Each command's
/// extensions are limited to `server`, then `retain` is added as is. The
/// legacy `imapflags` is dropped whenever `imap4flags` is present.
#[must_use]
pub fn reconcile(
    rules: &[Rule],
    server: &BTreeSet<String>,
    retain: &BTreeSet<String>,
) -> BTreeSet<String> {
    let mut required = BTreeSet::new();
    for rule in rules.iter().filter(|r| !r.commented) {
        for command in &rule.commands {
            if matches!(command, Command::Require(_)) {
                continue;
            }
            required.extend(
                required_extensions(command)
                    .into_iter()
                    .filter(|ext| server.contains(ext)),
            );
        }
    }
    required.extend(retain.iter().cloned());

    if required.contains("imap4flags") && required.remove("imapflags") {
        tracing::debug!("imap4flags supersedes imapflags");
    }
    required
}

/// Builds the require rule for `extensions`, positioned on line 2.
#[must_use]
pub fn require_rule(extensions: &BTreeSet<String>) -> Option<Rule> {
    if extensions.is_empty() {
        return None;
    }
    let list = extensions.iter().cloned().collect();
    Some(Rule::new(
        vec![Command::Require(vec![list])],
        REQUIRE_LINE,
        REQUIRE_LINE,
    ))
}

/// Rewrites only the require line of `new`.
///
/// The quoted extension names on line 2 of both scripts are united and
/// written back to line 2 of `new`. If `new` has no require line, one is
/// inserted there followed by a blank line.
#[must_use]
pub fn merge_require_line(old: &str, new: &str) -> String {
    let eol = if new.contains("\r\n") { "\r\n" } else { "\n" };
    let mut lines: Vec<String> = new
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
        .collect();

    let has_require = lines.get(1).is_some_and(|l| is_require_line(l));
    let mut names = if has_require {
        require_tokens(&lines[1])
    } else {
        Vec::new()
    };
    let previous = second_line(old)
        .filter(|l| is_require_line(l))
        .map(require_tokens)
        .unwrap_or_default();
    for name in previous {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    if names.is_empty() {
        return new.to_string();
    }

    let require = format_require(&names);
    if has_require {
        lines[1] = require;
    } else {
        let at = lines.len().min(1);
        lines.splice(at..at, [require, String::new()]);
    }
    lines.join(eol)
}

fn second_line(script: &str) -> Option<&str> {
    script
        .split('\n')
        .nth(1)
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
}

fn is_require_line(line: &str) -> bool {
    line.trim_start()
        .get(..7)
        .is_some_and(|word| word.eq_ignore_ascii_case("require"))
}

fn require_tokens(line: &str) -> Vec<String> {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    let re = TOKEN_RE
        .get_or_init(|| Regex::new(r#""([A-Za-z0-9_.;:+\-]+)""#).expect("valid regex"));

    let mut names: Vec<String> = Vec::new();
    for caps in re.captures_iter(line) {
        let name = caps[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn format_require(names: &[String]) -> String {
    match names {
        [name] => format!("require {};", quote(name)),
        _ => {
            let quoted: Vec<String> = names.iter().map(|n| quote(n)).collect();
            format!("require [{}];", quoted.join(", "))
        }
    }
}

fn collect_command(command: &Command, found: &mut BTreeSet<String>) {
    match command {
        Command::Require(_) => {}
        Command::If { test, actions } | Command::ElseIf { test, actions } => {
            collect_test(test, found);
            for action in actions {
                collect_command(action, found);
            }
        }
        Command::Else { actions } => {
            for action in actions {
                collect_command(action, found);
            }
        }
        Command::Action { name, arguments } => {
            insert_all(found, action_extensions(name));
            collect_arguments(arguments, found);
        }
    }
}

fn collect_test(test: &Test, found: &mut BTreeSet<String>) {
    insert_all(found, test_extensions(&test.name));
    collect_arguments(&test.arguments, found);
    for nested in &test.tests {
        collect_test(nested, found);
    }
}

fn collect_arguments(arguments: &[Argument], found: &mut BTreeSet<String>) {
    let mut iter = arguments.iter().peekable();
    while let Some(argument) = iter.next() {
        let Argument::Tag(tag) = argument else {
            continue;
        };
        let tag = tag.to_ascii_lowercase();
        if tag == ":comparator" {
            if let Some(Argument::StringList(values)) = iter.peek()
                && let Some(comparator) = values.first()
                && !BUILTIN_COMPARATORS.contains(&comparator.to_ascii_lowercase().as_str())
            {
                found.insert(format!("comparator-{comparator}"));
            }
            continue;
        }
        insert_all(found, tag_extensions(&tag));
    }
}

fn insert_all(found: &mut BTreeSet<String>, extensions: &[&str]) {
    found.extend(extensions.iter().map(|e| (*e).to_string()));
}

const FLAG_EXTENSIONS: &[&str] = &["imap4flags", "imapflags"];

fn action_extensions(name: &str) -> &'static [&'static str] {
    match name.to_ascii_lowercase().as_str() {
        "fileinto" => &["fileinto"],
        "reject" => &["reject"],
        "ereject" => &["ereject"],
        "vacation" => &["vacation"],
        "setflag" | "addflag" | "removeflag" => FLAG_EXTENSIONS,
        "notify" => &["enotify"],
        "set" => &["variables"],
        "include" | "return" | "global" => &["include"],
        "addheader" | "deleteheader" => &["editheader"],
        "foreverypart" | "break" | "replace" | "enclose" => &["foreverypart", "mime"],
        "extracttext" => &["extracttext"],
        "convert" => &["convert"],
        "error" => &["ihave"],
        _ => &[],
    }
}

fn test_extensions(name: &str) -> &'static [&'static str] {
    match name.to_ascii_lowercase().as_str() {
        "envelope" => &["envelope"],
        "body" => &["body"],
        "date" | "currentdate" => &["date"],
        "hasflag" => FLAG_EXTENSIONS,
        "string" => &["variables"],
        "mailboxexists" => &["mailbox"],
        "metadata" | "metadataexists" => &["mboxmetadata"],
        "servermetadata" | "servermetadataexists" => &["servermetadata"],
        "spamtest" => &["spamtest"],
        "virustest" => &["virustest"],
        "duplicate" => &["duplicate"],
        "ihave" => &["ihave"],
        "environment" => &["environment"],
        "valid_notify_method" | "notify_method_capability" => &["enotify"],
        "specialuse_exists" => &["special-use"],
        "valid_ext_list" => &["extlists"],
        _ => &[],
    }
}

fn tag_extensions(tag: &str) -> &'static [&'static str] {
    match tag {
        ":regex" => &["regex"],
        ":copy" => &["copy"],
        ":create" => &["mailbox"],
        ":flags" => FLAG_EXTENSIONS,
        ":value" | ":count" => &["relational"],
        ":user" | ":detail" => &["subaddress"],
        ":mime" | ":anychild" => &["mime"],
        ":list" => &["extlists"],
        ":index" | ":last" => &["index"],
        ":percent" => &["spamtestplus"],
        ":specialuse" => &["special-use"],
        ":lower" | ":upper" | ":lowerfirst" | ":upperfirst" | ":quotewildcard" | ":length" => {
            &["variables"]
        }
        _ => &[],
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

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn flagged_rule() -> Rule {
        Rule::new(
            vec![Command::If {
                test: Test::new(
                    "header",
                    vec![
                        Argument::tag(":regex"),
                        Argument::tag(":comparator"),
                        Argument::string("i;ascii-numeric"),
                        Argument::string("Subject"),
                        Argument::string("^x"),
                    ],
                ),
                actions: vec![
                    Command::action("addflag", vec![Argument::string("\\Seen")]),
                    Command::action("fileinto", vec![Argument::tag(":copy"), Argument::string("X")]),
                ],
            }],
            4,
            7,
        )
    }

    #[test]
    fn test_required_extensions_walks_everything() {
        let found = required_extensions(&flagged_rule().commands[0]);
        assert_eq!(
            found,
            set(&[
                "comparator-i;ascii-numeric",
                "copy",
                "fileinto",
                "imap4flags",
                "imapflags",
                "regex"
            ])
        );
    }

    #[test]
    fn test_builtin_comparator_needs_nothing() {
        let test = Test::new(
            "header",
            vec![
                Argument::tag(":comparator"),
                Argument::string("i;ascii-casemap"),
                Argument::string("To"),
                Argument::string("x"),
            ],
        );
        let command = Command::If {
            test,
            actions: vec![Command::action("keep", vec![])],
        };
        assert!(required_extensions(&command).is_empty());
    }

    #[test]
    fn test_reconcile_prefers_imap4flags() {
        let server = set(&["fileinto", "imapflags", "imap4flags", "copy"]);
        let required = reconcile(&[flagged_rule()], &server, &BTreeSet::new());
        assert_eq!(required, set(&["copy", "fileinto", "imap4flags"]));
    }

    #[test]
    fn test_reconcile_keeps_legacy_flags_alone() {
        let server = set(&["imapflags"]);
        let required = reconcile(&[flagged_rule()], &server, &BTreeSet::new());
        assert_eq!(required, set(&["imapflags"]));
    }

    #[test]
    fn test_reconcile_prefers_imap4flags_from_retain() {
        let required = reconcile(&[], &BTreeSet::new(), &set(&["imapflags", "imap4flags"]));
        assert_eq!(required, set(&["imap4flags"]));
    }

    #[test]
    fn test_reconcile_skips_disabled_and_require() {
        let mut disabled = flagged_rule();
        disabled.commented = true;
        let require = Rule::new(vec![Command::Require(vec![vec!["vacation".into()]])], 2, 2);
        let server = set(&["fileinto", "vacation", "regex"]);

        let required = reconcile(&[disabled, require], &server, &set(&["body"]));
        assert_eq!(required, set(&["body"]));
    }

    #[test]
    fn test_require_rule() {
        assert!(require_rule(&BTreeSet::new()).is_none());
        let rule = require_rule(&set(&["vacation", "fileinto"])).unwrap();
        assert_eq!(rule.line, 2);
        assert_eq!(
            rule.commands,
            vec![Command::Require(vec![vec!["fileinto".into(), "vacation".into()]])]
        );
    }

    #[test]
    fn test_merge_require_line_unions() {
        let old = "# Sieve filter\r\nrequire [\"fileinto\", \"regex\"];\r\n\r\nkeep;";
        let new = "# Sieve filter\r\nrequire \"vacation\";\r\n\r\nvacation \"x\";\r\n";
        assert_eq!(
            merge_require_line(old, new),
            "# Sieve filter\r\nrequire [\"vacation\", \"fileinto\", \"regex\"];\r\n\r\nvacation \"x\";\r\n"
        );
    }

    #[test]
    fn test_merge_require_line_inserts() {
        let old = "# Sieve filter\r\nrequire \"fileinto\";\r\n";
        let new = "# Sieve filter\r\nkeep;\r\n";
        assert_eq!(
            merge_require_line(old, new),
            "# Sieve filter\r\nrequire \"fileinto\";\r\n\r\nkeep;\r\n"
        );
    }

    #[test]
    fn test_merge_require_line_nothing_to_do() {
        let new = "# Sieve filter\nkeep;\n";
        assert_eq!(merge_require_line("# Sieve filter\nkeep;", new), new);
    }
}
