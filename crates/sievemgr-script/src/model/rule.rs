//! Rules and their metadata comments.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Command;

/// One editable unit of a script.
///
/// A rule is either executable (`commands` non-empty) or kept verbatim
/// (`commands` empty, `text` set). Comment blocks between rules and rules
/// that failed to parse are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Commands in source order.
    pub commands: Vec<Command>,
    /// Metadata comment attached to this rule.
    pub comment: Option<RuleComment>,
    /// Why the rule could not be turned into commands.
    pub error: Option<String>,
    /// Verbatim source lines, CRLF separated.
    pub text: Option<String>,
    /// First source line (1-based).
    pub line: usize,
    /// Last source line (inclusive).
    pub end_line: usize,
    /// Rule is disabled with the `#<!-->` marker.
    pub commented: bool,
    /// Index in the rule list.
    pub position: usize,
}

impl Rule {
    /// Creates an executable rule.
    #[must_use]
    pub fn new(commands: Vec<Command>, line: usize, end_line: usize) -> Self {
        Self {
            commands,
            line,
            end_line,
            ..Self::default()
        }
    }

    /// Creates a verbatim rule.
    #[must_use]
    pub fn raw(text: impl Into<String>, line: usize, end_line: usize) -> Self {
        Self {
            text: Some(text.into()),
            line,
            end_line,
            ..Self::default()
        }
    }

    /// Returns true if the rule is kept as verbatim text.
    #[must_use]
    pub fn is_raw(&self) -> bool {
        self.commands.is_empty()
    }

    /// Returns true for comment blocks that are not rules of their own.
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        self.commands.is_empty() && self.error.is_none() && self.comment.is_none()
    }

    /// Returns true if every command is a `require`.
    #[must_use]
    pub fn is_require(&self) -> bool {
        !self.commands.is_empty()
            && self
                .commands
                .iter()
                .all(|c| matches!(c, Command::Require(_)))
    }

    /// Returns the assigned unique id.
    #[must_use]
    pub fn unique_id(&self) -> Option<i64> {
        self.comment
            .as_ref()
            .filter(|c| c.has_unique_id())
            .map(|c| c.unique_id)
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.comment.as_ref().and_then(|c| c.name.as_deref())
    }

    /// Number of source lines the rule body spans.
    #[must_use]
    pub const fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.line) + 1
    }
}

/// Structured metadata kept in a `## Flag:` comment above a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleComment {
    /// Script-unique id, [`RuleComment::UNASSIGNED`] until assigned.
    pub unique_id: i64,
    /// Flags in written order.
    pub flags: Vec<String>,
    /// Display name.
    pub name: Option<String>,
    /// Line of the comment (1-based).
    pub line: usize,
    /// Why the comment could not be read.
    pub error: Option<String>,
    /// Created while assigning ids; the source had no metadata line.
    #[serde(default)]
    pub implicit: bool,
}

impl RuleComment {
    /// Sentinel for "no id yet".
    pub const UNASSIGNED: i64 = -1;

    /// Creates an empty comment for `line`.
    #[must_use]
    pub const fn new(line: usize) -> Self {
        Self {
            unique_id: Self::UNASSIGNED,
            flags: Vec::new(),
            name: None,
            line,
            error: None,
            implicit: false,
        }
    }

    /// Returns true once an id is set.
    #[must_use]
    pub const fn has_unique_id(&self) -> bool {
        self.unique_id >= 0
    }

    /// Returns true if the comment gets its own line when written.
    ///
    /// An id made up on parse is only written once the rule is named or
    /// flagged, so a script without metadata is written back unchanged.
    #[must_use]
    pub const fn is_written(&self) -> bool {
        self.error.is_none() && (!self.implicit || !self.flags.is_empty() || self.name.is_some())
    }
}

impl fmt::Display for RuleComment {
    /// Writes the metadata line without the disabled-rule marker.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "## Flag: {}|UniqueId:{}|Rulename: {}",
            self.flags.join(","),
            self.unique_id,
            self.name.as_deref().unwrap_or_default()
        )
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

    #[test]
    fn test_comment_line() {
        let comment = RuleComment {
            unique_id: 3,
            flags: vec!["work".to_string(), "urgent".to_string()],
            name: Some("Work mail".to_string()),
            line: 4,
            error: None,
            implicit: false,
        };
        assert_eq!(
            comment.to_string(),
            "## Flag: work,urgent|UniqueId:3|Rulename: Work mail"
        );
        assert_eq!(
            RuleComment::new(1).to_string(),
            "## Flag: |UniqueId:-1|Rulename: "
        );
    }

    #[test]
    fn test_implicit_comment_is_written_once_named() {
        let mut comment = RuleComment {
            unique_id: 4,
            implicit: true,
            ..RuleComment::new(8)
        };
        assert!(!comment.is_written());
        comment.name = Some("Old".to_string());
        assert!(comment.is_written());
        comment.error = Some("line 8: invalid flag".to_string());
        assert!(!comment.is_written());
        assert!(RuleComment::new(1).is_written());
    }

    #[test]
    fn test_rule_kinds() {
        let raw = Rule::raw("# note", 3, 3);
        assert!(raw.is_raw());
        assert!(raw.is_passthrough());
        assert_eq!(raw.unique_id(), None);

        let require = Rule::new(vec![Command::Require(vec![vec!["fileinto".into()]])], 2, 2);
        assert!(require.is_require());
        assert!(!Rule::new(vec![Command::action("keep", vec![])], 4, 4).is_require());
    }

    #[test]
    fn test_unique_id_ignores_sentinel() {
        let mut rule = Rule::new(vec![Command::action("stop", vec![])], 5, 7);
        rule.comment = Some(RuleComment::new(4));
        assert_eq!(rule.unique_id(), None);
        assert_eq!(rule.line_count(), 3);
        rule.comment.as_mut().unwrap().unique_id = 9;
        assert_eq!(rule.unique_id(), Some(9));
    }
}
