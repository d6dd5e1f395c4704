//! SASL mechanism names.

use std::fmt;

use serde::{Deserialize, Serialize};

/// SASL authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mechanism {
    /// PLAIN - plaintext authentication (RFC 4616)
    Plain,
    /// LOGIN - legacy plaintext, prompt driven
    Login,
    /// GSSAPI - Kerberos via an external SASL provider
    Gssapi,
    /// `XOAUTH2` - `OAuth2` (Google/Microsoft)
    XOAuth2,
    /// `OAUTHBEARER` - RFC 7628 `OAuth2`
    OAuthBearer,
}

impl Mechanism {
    /// Parses a mechanism name (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            "GSSAPI" => Some(Self::Gssapi),
            "XOAUTH2" => Some(Self::XOAuth2),
            "OAUTHBEARER" => Some(Self::OAuthBearer),
            _ => None,
        }
    }

    /// Returns the mechanism name as sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::Gssapi => "GSSAPI",
            Self::XOAuth2 => "XOAUTH2",
            Self::OAuthBearer => "OAUTHBEARER",
        }
    }

    /// Returns true for the bearer-token mechanisms.
    #[must_use]
    pub const fn is_oauth(self) -> bool {
        matches!(self, Self::XOAuth2 | Self::OAuthBearer)
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
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
    fn test_parse_is_case_insensitive() {
        assert_eq!(Mechanism::parse("plain"), Some(Mechanism::Plain));
        assert_eq!(Mechanism::parse("Gssapi"), Some(Mechanism::Gssapi));
        assert_eq!(Mechanism::parse(" XOAUTH2 "), Some(Mechanism::XOAuth2));
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(Mechanism::parse("CRAM-MD5"), None);
        assert_eq!(Mechanism::parse(""), None);
    }

    #[test]
    fn test_as_str_round_trips() {
        for mech in [
            Mechanism::Plain,
            Mechanism::Login,
            Mechanism::Gssapi,
            Mechanism::XOAuth2,
            Mechanism::OAuthBearer,
        ] {
            assert_eq!(Mechanism::parse(mech.as_str()), Some(mech));
        }
    }

    #[test]
    fn test_oauth_mechanisms() {
        assert!(Mechanism::XOAuth2.is_oauth());
        assert!(Mechanism::OAuthBearer.is_oauth());
        assert!(!Mechanism::Plain.is_oauth());
    }
}
