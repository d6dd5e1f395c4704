//! Response codes.

use serde::{Deserialize, Serialize};

use crate::codec::split_strings;

/// Response code carried in parentheses after `OK`, `NO` or `BYE`.
///
/// These provide additional information about command completion
/// (RFC 5804 section 1.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseCode {
    /// AUTH-TOO-WEAK: mechanism refused by site policy.
    AuthTooWeak,
    /// ENCRYPT-NEEDED: the operation requires TLS first.
    EncryptNeeded,
    /// QUOTA, optionally with a sub-code such as `MAXSCRIPTS` or `MAXSIZE`.
    Quota(Option<String>),
    /// REFERRAL: the client should use another server.
    Referral(String),
    /// SASL: final server data of a successful exchange (base64).
    Sasl(String),
    /// TRANSITION-NEEDED: the password must be upgraded first.
    TransitionNeeded,
    /// TRYLATER: temporary failure.
    TryLater,
    /// ACTIVE: the script is active and cannot be deleted.
    Active,
    /// NONEXISTENT: no script by that name.
    NonExistent,
    /// ALREADYEXISTS: a script by that name already exists.
    AlreadyExists,
    /// TAG: echoes the tag given with the command.
    Tag(String),
    /// WARNINGS: script stored but the server has remarks.
    Warnings,
    /// Unknown response code.
    Unknown(String),
}

impl ResponseCode {
    /// Parses the text between the parentheses, e.g. `QUOTA/MAXSIZE` or
    /// `SASL "dGVzdA=="`.
    #[must_use]
    pub fn parse(inner: &str) -> Self {
        let inner = inner.trim();
        let (atom, rest) = match inner.split_once(char::is_whitespace) {
            Some((atom, rest)) => (atom, rest.trim()),
            None => (inner, ""),
        };
        let argument = split_strings(rest).into_iter().next().unwrap_or_default();

        let upper = atom.to_uppercase();
        let (base, sub) = match upper.split_once('/') {
            Some((base, sub)) => (base.to_string(), Some(sub.to_string())),
            None => (upper.clone(), None),
        };

        match base.as_str() {
            "AUTH-TOO-WEAK" => Self::AuthTooWeak,
            "ENCRYPT-NEEDED" => Self::EncryptNeeded,
            "QUOTA" => Self::Quota(sub),
            "REFERRAL" => Self::Referral(argument),
            "SASL" => Self::Sasl(argument),
            "TRANSITION-NEEDED" => Self::TransitionNeeded,
            "TRYLATER" => Self::TryLater,
            "ACTIVE" => Self::Active,
            "NONEXISTENT" => Self::NonExistent,
            "ALREADYEXISTS" => Self::AlreadyExists,
            "TAG" => Self::Tag(argument),
            "WARNINGS" => Self::Warnings,
            _ => Self::Unknown(inner.to_string()),
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
    fn test_simple_atoms() {
        assert_eq!(ResponseCode::parse("NONEXISTENT"), ResponseCode::NonExistent);
        assert_eq!(ResponseCode::parse("active"), ResponseCode::Active);
        assert_eq!(ResponseCode::parse("TRYLATER"), ResponseCode::TryLater);
        assert_eq!(ResponseCode::parse("WARNINGS"), ResponseCode::Warnings);
    }

    #[test]
    fn test_quota_with_sub_code() {
        assert_eq!(
            ResponseCode::parse("QUOTA/MAXSCRIPTS"),
            ResponseCode::Quota(Some("MAXSCRIPTS".to_string()))
        );
        assert_eq!(ResponseCode::parse("QUOTA"), ResponseCode::Quota(None));
    }

    #[test]
    fn test_codes_with_arguments() {
        assert_eq!(
            ResponseCode::parse("SASL \"dGVzdA==\""),
            ResponseCode::Sasl("dGVzdA==".to_string())
        );
        assert_eq!(
            ResponseCode::parse("TAG \"x1\""),
            ResponseCode::Tag("x1".to_string())
        );
        assert_eq!(
            ResponseCode::parse("REFERRAL sieve://other.example.com"),
            ResponseCode::Referral("sieve://other.example.com".to_string())
        );
    }

    #[test]
    fn test_unknown_code_keeps_text() {
        assert_eq!(
            ResponseCode::parse("X-VENDOR 12"),
            ResponseCode::Unknown("X-VENDOR 12".to_string())
        );
    }
}
