//! Metadata comments: `## Flag: a,b|UniqueId:3|Rulename: Work mail`.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::RuleComment;
use crate::{DISABLED_MARKER, ScriptError};

const METADATA_PATTERN: &str = r"^(?:#<!-->)?## Flag: ?(?P<flags>[^|]*)\|UniqueId:(?P<id>[^|]*)\|Rulename: ?(?P<name>.*)$";

#[allow(clippy::expect_used)]
fn metadata_regex() -> &'static Regex {
    static METADATA_RE: OnceLock<Regex> = OnceLock::new();
    METADATA_RE.get_or_init(|| Regex::new(METADATA_PATTERN).expect("valid regex"))
}

/// Reads a metadata comment from one source line.
///
/// Returns `None` if the line is not a metadata comment. A comment with a
/// bad flag or a non-integer id is still returned, carrying the error, so
/// the rule below it can be kept verbatim.
#[must_use]
pub fn parse_comment(text: &str, line: usize) -> Option<RuleComment> {
    let caps = metadata_regex().captures(text.trim_end())?;
    let mut comment = RuleComment::new(line);

    let flags = caps.name("flags").map_or("", |m| m.as_str());
    for flag in flags.split(',').map(str::trim).filter(|f| !f.is_empty()) {
        if !is_valid_flag(flag) && comment.error.is_none() {
            comment.error = Some(
                ScriptError::InvalidFlag {
                    line,
                    flag: flag.to_string(),
                }
                .to_string(),
            );
        }
        comment.flags.push(flag.to_string());
    }

    let id = caps.name("id").map_or("", |m| m.as_str().trim());
    match id.parse::<i64>() {
        Ok(value) => comment.unique_id = value.max(RuleComment::UNASSIGNED),
        Err(_) => {
            if comment.error.is_none() {
                comment.error = Some(
                    ScriptError::InvalidUniqueId {
                        line,
                        value: id.to_string(),
                    }
                    .to_string(),
                );
            }
        }
    }

    comment.name = caps
        .name("name")
        .map(|m| m.as_str().trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    Some(comment)
}

/// Writes the metadata line, with the marker for disabled rules.
#[must_use]
pub fn format_comment(comment: &RuleComment, commented: bool) -> String {
    if commented {
        format!("{DISABLED_MARKER}{comment}")
    } else {
        comment.to_string()
    }
}

fn is_valid_flag(flag: &str) -> bool {
    flag.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
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

    #[test]
    fn test_parse_full_comment() {
        let line = "## Flag: work,urgent|UniqueId:3|Rulename: Work mail\r";
        let comment = parse_comment(line, 5).unwrap();
        assert_eq!(comment.unique_id, 3);
        assert_eq!(comment.flags, vec!["work", "urgent"]);
        assert_eq!(comment.name.as_deref(), Some("Work mail"));
        assert_eq!(comment.line, 5);
        assert!(comment.error.is_none());
    }

    #[test]
    fn test_parse_disabled_and_empty_parts() {
        let comment = parse_comment("#<!-->## Flag: |UniqueId:12|Rulename: ", 2).unwrap();
        assert!(comment.flags.is_empty());
        assert_eq!(comment.unique_id, 12);
        assert_eq!(comment.name, None);
    }

    #[test]
    fn test_not_metadata() {
        assert!(parse_comment("# just a note", 1).is_none());
        assert!(parse_comment("## Flag: a|Rulename: x", 1).is_none());
        assert!(parse_comment("keep; ## Flag: |UniqueId:1|Rulename: x", 1).is_none());
    }

    #[test]
    fn test_invalid_flag() {
        let comment = parse_comment("## Flag: ok,bad flag!|UniqueId:4|Rulename: x", 9).unwrap();
        assert_eq!(comment.error.as_deref(), Some("line 9: invalid flag \"bad flag!\""));
        assert_eq!(comment.unique_id, 4);
    }

    #[test]
    fn test_invalid_unique_id() {
        let comment = parse_comment("## Flag: a|UniqueId:x1|Rulename: x", 3).unwrap();
        assert_eq!(comment.error.as_deref(), Some("line 3: invalid unique id \"x1\""));
        assert_eq!(comment.unique_id, RuleComment::UNASSIGNED);
    }

    #[test]
    fn test_negative_ids_are_unassigned() {
        let comment = parse_comment("## Flag: |UniqueId:-7|Rulename: x", 1).unwrap();
        assert!(!comment.has_unique_id());
        assert!(comment.error.is_none());
    }

    #[test]
    fn test_format_roundtrip() {
        let line = "## Flag: work|UniqueId:3|Rulename: Work mail";
        let comment = parse_comment(line, 1).unwrap();
        assert_eq!(format_comment(&comment, false), line);
        assert_eq!(format_comment(&comment, true), format!("#<!-->{line}"));
    }
}
