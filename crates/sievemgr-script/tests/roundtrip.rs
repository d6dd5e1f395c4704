//! Integration tests for script <-> rule round trips.

#![allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::needless_collect,
    clippy::similar_names
)]

use std::collections::BTreeSet;

use proptest::prelude::*;
use sievemgr_script::{Argument, Command, Rule, ScriptParser, ScriptWriter, merge_require_line};

fn script(lines: &[&str]) -> String {
    let mut text = lines.join("\r\n");
    text.push_str("\r\n");
    text
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// What an editor can observe about a rule.
#[derive(Debug, PartialEq, Eq)]
struct Observed {
    commands: Vec<Command>,
    flags: Vec<String>,
    name: Option<String>,
    unique_id: Option<i64>,
    commented: bool,
    text: Option<String>,
    has_error: bool,
}

fn observe(rules: &[Rule]) -> Vec<Observed> {
    rules
        .iter()
        .map(|rule| Observed {
            commands: rule.commands.clone(),
            flags: rule
                .comment
                .as_ref()
                .map(|c| c.flags.clone())
                .unwrap_or_default(),
            name: rule.name().map(str::to_string),
            unique_id: rule.unique_id(),
            commented: rule.commented,
            text: rule.is_raw().then(|| rule.text.clone()).flatten(),
            has_error: rule.error.is_some(),
        })
        .collect()
}

fn rewrite(text: &str, server: &BTreeSet<String>) -> String {
    let parsed = ScriptParser::new().parse_client_rules(text);
    ScriptWriter::new().write(&parsed.rules, server, &parsed.retain)
}

const MANAGED: &[&str] = &[
    "# Sieve filter",
    "require \"fileinto\";",
    "",
    "## Flag: work|UniqueId:3|Rulename: Work mail",
    "if header :contains \"List-Id\" \"work\" {",
    "    fileinto \"Work\";",
    "}",
    "",
    "#<!-->## Flag: |UniqueId:4|Rulename: Old",
    "#<!-->if header :is \"From\" \"x\" {",
    "#<!-->    discard;",
    "#<!-->}",
];

#[test]
fn test_commented_out_rule_is_restored_exactly() {
    let text = script(&[
        "# Sieve filter",
        "require \"fileinto\";",
        "",
        "## Flag: work|UniqueId:3|Rulename: Work mail",
        "if header :contains \"List-Id\" \"work\" {",
        "    fileinto \"Work\";",
        "}",
        "",
        "#<!-->keep;",
    ]);
    let parsed = ScriptParser::new().parse_client_rules(&text);

    assert!(!parsed.had_errors);
    assert_eq!(parsed.rules.len(), 2);
    assert_eq!(parsed.rules[0].unique_id(), Some(3));
    assert_eq!(parsed.rules[0].name(), Some("Work mail"));
    assert!(parsed.rules[1].commented);
    assert_eq!(parsed.rules[1].text.as_deref(), Some("#<!-->keep;"));
    assert_eq!(parsed.rules[1].commands, vec![Command::action("keep", vec![])]);
    assert_eq!(parsed.rules[1].unique_id(), Some(4));

    let written = ScriptWriter::new().write(&parsed.rules, &set(&["fileinto"]), &parsed.retain);
    assert_eq!(written, text);
}

#[test]
fn test_naming_an_unnamed_rule_adds_metadata() {
    let text = script(&["# Sieve filter", "", "#<!-->keep;"]);
    let mut parsed = ScriptParser::new().parse_client_rules(&text);
    parsed.rules[0].comment.as_mut().unwrap().name = Some("Old".to_string());

    let written = ScriptWriter::new().write(&parsed.rules, &BTreeSet::new(), &parsed.retain);
    assert_eq!(
        written,
        script(&[
            "# Sieve filter",
            "#<!-->## Flag: |UniqueId:1|Rulename: Old",
            "#<!-->keep;",
        ])
    );
    assert_eq!(rewrite(&written, &BTreeSet::new()), written);
}

#[test]
fn test_managed_script_is_restored_exactly() {
    let text = script(MANAGED);
    let parsed = ScriptParser::new().parse_client_rules(&text);

    assert!(!parsed.had_errors);
    assert_eq!(parsed.rules.len(), 2);
    assert_eq!(parsed.rules[0].name(), Some("Work mail"));
    assert_eq!(parsed.rules[0].unique_id(), Some(3));
    assert!(!parsed.rules[0].commented);
    assert_eq!(parsed.rules[1].name(), Some("Old"));
    assert_eq!(parsed.rules[1].unique_id(), Some(4));
    assert!(parsed.rules[1].commented);
    assert_eq!(parsed.next_unique_id, 5);

    let written = ScriptWriter::new().write(&parsed.rules, &set(&["fileinto"]), &parsed.retain);
    assert_eq!(written, text);
}

#[test]
fn test_disabling_a_rule_drops_its_extension() {
    let text = script(MANAGED);
    let mut parsed = ScriptParser::new().parse_client_rules(&text);
    parsed.rules[0].commented = true;

    let written = ScriptWriter::new().write(&parsed.rules, &set(&["fileinto"]), &parsed.retain);
    assert!(!written.contains("require"));
    assert!(written.contains("#<!-->    fileinto \"Work\";\r\n"));

    let reparsed = ScriptParser::new().parse_client_rules(&written);
    assert!(reparsed.rules.iter().all(|r| r.commented));
    assert_eq!(reparsed.rules[0].unique_id(), Some(3));
}

#[test]
fn test_hand_written_script_converges() {
    let text = script(&[
        "# Sieve filter",
        "require [\"fileinto\", \"imap4flags\"];",
        "",
        "# Personal rules below",
        "## Flag: |UniqueId:1|Rulename: Flag boss",
        "if address :is \"from\" \"boss@example.com\" {",
        "    addflag \"\\\\Flagged\";",
        "}",
        "",
        "if header :contains \"Subject\" {",
        "    stop",
        "}",
        "",
        "keep;",
    ]);
    let server = set(&["fileinto", "imap4flags"]);

    let parsed = ScriptParser::new().parse_client_rules(&text);
    assert!(parsed.had_errors);
    assert_eq!(parsed.retain, server);
    assert_eq!(parsed.rules.len(), 4);
    assert!(parsed.rules[0].is_passthrough());
    assert_eq!(parsed.rules[1].name(), Some("Flag boss"));
    assert!(parsed.rules[2].error.is_some());

    let first = rewrite(&text, &server);
    assert!(first.starts_with("# Sieve filter\r\nrequire [\"fileinto\", \"imap4flags\"];\r\n"));
    assert!(first.contains("# Personal rules below\r\n"));
    assert!(first.contains("    addflag \"\\\\Flagged\";\r\n"));
    assert!(first.contains("if header :contains \"Subject\" {\r\n    stop\r\n}\r\n"));

    let second = rewrite(&first, &server);
    assert_eq!(second, first);

    let before = ScriptParser::new().parse_client_rules(&first);
    let after = ScriptParser::new().parse_client_rules(&second);
    assert_eq!(observe(&before.rules), observe(&after.rules));
}

#[test]
fn test_metadata_attaches_to_rule_below() {
    let text = script(&[
        "# Sieve filter",
        "",
        "",
        "keep;",
        "## Flag: |UniqueId:7|Rulename: Stop here",
        "stop;",
    ]);
    let parsed = ScriptParser::new().parse_client_rules(&text);

    let stop = parsed
        .rules
        .iter()
        .find(|r| r.commands == vec![Command::action("stop", vec![])])
        .unwrap();
    assert_eq!(stop.name(), Some("Stop here"));
    assert_eq!(stop.unique_id(), Some(7));

    let keep = parsed
        .rules
        .iter()
        .find(|r| r.commands == vec![Command::action("keep", vec![])])
        .unwrap();
    assert_eq!(keep.name(), None);
}

#[test]
fn test_unique_ids_stay_unique() {
    let text = script(&[
        "# Sieve filter",
        "## Flag: |UniqueId:5|Rulename: a",
        "keep;",
        "## Flag: |UniqueId:2|Rulename: b",
        "stop;",
        "discard;",
        "## Flag: |UniqueId:5|Rulename: c",
        "keep;",
        "## Flag: |UniqueId:-3|Rulename: d",
        "stop;",
    ]);
    let parsed = ScriptParser::new().parse(&text);

    let ids: Vec<Option<i64>> = parsed.rules.iter().map(Rule::unique_id).collect();
    assert_eq!(ids, vec![Some(5), Some(2), Some(6), Some(7), Some(8)]);
    assert_eq!(parsed.next_unique_id, 9);
}

#[test]
fn test_largest_id_does_not_overflow() {
    let text = script(&[
        "# Sieve filter",
        "## Flag: |UniqueId:9223372036854775807|Rulename: last",
        "keep;",
        "stop;",
    ]);
    let parsed = ScriptParser::new().parse_client_rules(&text);

    let ids: Vec<Option<i64>> = parsed.rules.iter().map(Rule::unique_id).collect();
    assert_eq!(ids, vec![Some(i64::MAX), Some(1)]);
    assert_eq!(parsed.next_unique_id, 2);

    let written = ScriptWriter::new().write(&parsed.rules, &BTreeSet::new(), &parsed.retain);
    assert_eq!(written, text);
}

#[test]
fn test_imap4flags_preferred_over_imapflags() {
    let rule = Rule::new(
        vec![Command::action("addflag", vec![Argument::string("\\Seen")])],
        0,
        0,
    );
    let written = ScriptWriter::new().write(
        &[rule],
        &set(&["imapflags", "imap4flags"]),
        &BTreeSet::new(),
    );
    assert!(written.starts_with("# Sieve filter\r\nrequire \"imap4flags\";\r\n\r\n"));

    let rule = Rule::new(
        vec![Command::action("addflag", vec![Argument::string("\\Seen")])],
        0,
        0,
    );
    let written = ScriptWriter::new().write(&[rule], &set(&["imapflags"]), &BTreeSet::new());
    assert!(written.starts_with("# Sieve filter\r\nrequire \"imapflags\";\r\n\r\n"));
}

#[test]
fn test_merge_require_line_keeps_old_extensions() {
    let old = script(&[
        "# Sieve filter",
        "require [\"fileinto\", \"vacation\"];",
        "",
        "vacation \"away\";",
    ]);
    let new = script(&["# Sieve filter", "require \"fileinto\";", "", "keep;"]);

    assert_eq!(
        merge_require_line(&old, &new),
        script(&[
            "# Sieve filter",
            "require [\"fileinto\", \"vacation\"];",
            "",
            "keep;",
        ])
    );
}

#[test]
fn test_rules_survive_the_editor_json() {
    let text = script(MANAGED);
    let parsed = ScriptParser::new().parse_client_rules(&text);

    let json = serde_json::to_string(&parsed.rules).unwrap();
    let rules: Vec<Rule> = serde_json::from_str(&json).unwrap();
    assert_eq!(rules, parsed.rules);

    let written = ScriptWriter::new().write(&rules, &set(&["fileinto"]), &parsed.retain);
    assert_eq!(written, text);
}

fn simple_rule() -> impl Strategy<Value = (Command, bool)> {
    let action = prop_oneof![
        Just(Command::action("keep", vec![])),
        Just(Command::action("stop", vec![])),
        Just(Command::action("discard", vec![])),
        "[A-Za-z][A-Za-z ]{0,9}"
            .prop_map(|folder| Command::action("fileinto", vec![Argument::string(folder)])),
    ];
    (action, any::<bool>())
}

proptest! {
    #[test]
    fn written_rules_parse_back(specs in prop::collection::vec(simple_rule(), 1..6)) {
        let rules: Vec<Rule> = specs
            .iter()
            .map(|(command, commented)| {
                let mut rule = Rule::new(vec![command.clone()], 0, 0);
                rule.commented = *commented;
                rule
            })
            .collect();

        let written = ScriptWriter::new().write(&rules, &set(&["fileinto"]), &BTreeSet::new());
        let parsed = ScriptParser::new().parse_client_rules(&written);

        prop_assert!(!parsed.had_errors);
        prop_assert_eq!(parsed.rules.len(), rules.len());
        for (got, want) in parsed.rules.iter().zip(&rules) {
            prop_assert_eq!(&got.commands, &want.commands);
            prop_assert_eq!(got.commented, want.commented);
        }

        let server = set(&["fileinto"]);
        let once = rewrite(&written, &server);
        prop_assert_eq!(rewrite(&once, &server), once);
    }
}
