//! Server capabilities.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::Mechanism;
use crate::codec::split_strings;

/// Capabilities advertised in the greeting or in reply to `CAPABILITY`.
///
/// A fresh snapshot is built for every listing; the client never merges
/// listings from different connection states.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Server implementation name (`"IMPLEMENTATION"`).
    pub implementation: Option<String>,
    /// Whether `"STARTTLS"` was advertised.
    pub starttls: bool,
    /// SASL mechanisms in advertised order, upper-cased, without duplicates.
    pub sasl: Vec<String>,
    /// Sieve language extensions (`"SIEVE"`).
    pub extensions: BTreeSet<String>,
    /// Every other capability, keyed by upper-cased name.
    pub extended: BTreeMap<String, String>,
}

impl Capabilities {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one capability line such as `"SASL" "PLAIN LOGIN"`.
    ///
    /// Returns false if the line holds no capability name.
    pub fn parse_line(&mut self, line: &str) -> bool {
        let mut parts = split_strings(line).into_iter();
        let Some(name) = parts.next() else {
            return false;
        };
        let value = parts.next();

        match name.to_uppercase().as_str() {
            "STARTTLS" => self.starttls = true,
            "IMPLEMENTATION" => self.implementation = value,
            "SIEVE" => {
                self.extensions = value
                    .unwrap_or_default()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
            }
            "SASL" => {
                self.sasl.clear();
                for mech in value.unwrap_or_default().split_whitespace() {
                    let mech = mech.to_uppercase();
                    if !self.sasl.contains(&mech) {
                        self.sasl.push(mech);
                    }
                }
            }
            other => {
                self.extended
                    .insert(other.to_string(), value.unwrap_or_default());
            }
        }
        true
    }

    /// Returns true if the mechanism is among the advertised SASL mechanisms.
    #[must_use]
    pub fn supports_mechanism(&self, mechanism: Mechanism) -> bool {
        self.sasl.iter().any(|m| m == mechanism.as_str())
    }

    /// Returns true if the Sieve extension is supported.
    #[must_use]
    pub fn supports_extension(&self, name: &str) -> bool {
        self.extensions.contains(name)
    }

    /// Returns the protocol version (`"VERSION"`), if advertised.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.extended.get("VERSION").map(String::as_str)
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

    fn dovecot() -> Capabilities {
        let mut caps = Capabilities::new();
        for line in [
            "\"IMPLEMENTATION\" \"Dovecot Pigeonhole\"",
            "\"SIEVE\" \"fileinto reject envelope imap4flags vacation\"",
            "\"NOTIFY\" \"mailto\"",
            "\"SASL\" \"PLAIN login plain\"",
            "\"STARTTLS\"",
            "\"VERSION\" \"1.0\"",
        ] {
            assert!(caps.parse_line(line));
        }
        caps
    }

    #[test]
    fn test_parses_greeting_listing() {
        let caps = dovecot();
        assert_eq!(caps.implementation.as_deref(), Some("Dovecot Pigeonhole"));
        assert!(caps.starttls);
        assert_eq!(caps.sasl, vec!["PLAIN", "LOGIN"]);
        assert!(caps.supports_extension("imap4flags"));
        assert!(!caps.supports_extension("regex"));
        assert_eq!(caps.version(), Some("1.0"));
        assert_eq!(caps.extended.get("NOTIFY").map(String::as_str), Some("mailto"));
    }

    #[test]
    fn test_mechanism_lookup() {
        let caps = dovecot();
        assert!(caps.supports_mechanism(Mechanism::Plain));
        assert!(caps.supports_mechanism(Mechanism::Login));
        assert!(!caps.supports_mechanism(Mechanism::Gssapi));
    }

    #[test]
    fn test_unquoted_names_are_accepted() {
        let mut caps = Capabilities::new();
        assert!(caps.parse_line("STARTTLS"));
        assert!(caps.starttls);
    }

    #[test]
    fn test_empty_sasl_after_tls() {
        let mut caps = dovecot();
        caps.parse_line("\"SASL\" \"\"");
        assert!(caps.sasl.is_empty());
    }

    #[test]
    fn test_blank_line_is_not_a_capability() {
        let mut caps = Capabilities::new();
        assert!(!caps.parse_line("   "));
        assert_eq!(caps, Capabilities::default());
    }
}
