//! Error types for script parsing.

use thiserror::Error;

/// Result type alias for script operations.
pub type Result<T> = std::result::Result<T, ScriptError>;

/// A failure confined to one rule or one metadata line.
///
/// These never abort a whole parse: the affected rule is kept as verbatim
/// text and the parse result is flagged as having errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// The grammar rejected the rule.
    #[error("line {line}: syntax error: {message}")]
    Syntax {
        /// First line of the rejected span.
        line: usize,
        /// Grammar message.
        message: String,
    },

    /// A metadata flag contains characters outside `[A-Za-z0-9_-]`.
    #[error("line {line}: invalid flag {flag:?}")]
    InvalidFlag {
        /// Line of the metadata comment.
        line: usize,
        /// The offending flag.
        flag: String,
    },

    /// The metadata unique id is not an integer.
    #[error("line {line}: invalid unique id {value:?}")]
    InvalidUniqueId {
        /// Line of the metadata comment.
        line: usize,
        /// The offending value.
        value: String,
    },

    /// Valid syntax that does not map onto a rule.
    #[error("line {line}: unsupported {construct}")]
    Unsupported {
        /// Line of the construct.
        line: usize,
        /// What was found.
        construct: String,
    },
}

impl ScriptError {
    /// Returns the line the error refers to.
    #[must_use]
    pub const fn line(&self) -> usize {
        match self {
            Self::Syntax { line, .. }
            | Self::InvalidFlag { line, .. }
            | Self::InvalidUniqueId { line, .. }
            | Self::Unsupported { line, .. } => *line,
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

    #[test]
    fn test_messages_carry_line() {
        let err = ScriptError::InvalidFlag {
            line: 7,
            flag: "a b".to_string(),
        };
        assert_eq!(err.line(), 7);
        assert_eq!(err.to_string(), "line 7: invalid flag \"a b\"");

        let err = ScriptError::Unsupported {
            line: 3,
            construct: "elsif without if".to_string(),
        };
        assert_eq!(err.to_string(), "line 3: unsupported elsif without if");
    }
}
