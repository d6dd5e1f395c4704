//! Connection configuration types.

use std::collections::HashMap;
use std::time::Duration;

use regex::Regex;

use crate::{DEFAULT_PORT, Error, Result};

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Implementations that do not re-send their capabilities after STARTTLS
/// (Cyrus before 2.3.10).
pub const DEFAULT_NON_COMPLIANT_TLS: &str =
    r"^Cyrus.*v([0-1]\.[0-9].*|2\.[0-2].*|2\.3\.[0-9]|2\.3\.[0-9][^0-9].*)$";

/// ManageSieve connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Connect timeout; `None` waits forever.
    pub connect_timeout: Option<Duration>,
    /// Read timeout; `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Upgrade with STARTTLS when the server offers it.
    pub tls: bool,
    /// IDNA-encode the domain part of identities.
    pub punycode: bool,
    /// Explicit SASL mechanism name.
    pub preferred_mechanism: Option<String>,
    /// Legacy switch preferring GSSAPI when no mechanism is named.
    pub prefer_gssapi: bool,
    /// Implementations that need an explicit CAPABILITY after STARTTLS.
    pub non_compliant_tls: Option<Regex>,
    /// Parse bracketed response codes.
    pub response_codes: bool,
}

impl Config {
    /// Creates a configuration with STARTTLS on port 4190.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        ConfigBuilder::new(host).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }

    /// Builds a configuration from `sieve.*` properties.
    ///
    /// `sieve.host` is required. Timeouts are milliseconds: negative means
    /// the default, zero means no timeout.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| props.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let host = get("sieve.host")
            .ok_or_else(|| Error::Configuration("sieve.host is required".to_string()))?;
        let mut builder = ConfigBuilder::new(host);

        if let Some(port) = get("sieve.port") {
            builder = builder.port(parse_value("sieve.port", port)?);
        }
        if let Some(ms) = get("sieve.connect_timeout") {
            builder.connect_timeout =
                resolve_timeout(Some(parse_value("sieve.connect_timeout", ms)?), DEFAULT_CONNECT_TIMEOUT);
        }
        if let Some(ms) = get("sieve.read_timeout") {
            builder.read_timeout =
                resolve_timeout(Some(parse_value("sieve.read_timeout", ms)?), DEFAULT_READ_TIMEOUT);
        }
        if let Some(v) = get("sieve.tls") {
            builder = builder.tls(parse_bool("sieve.tls", v)?);
        }
        if let Some(v) = get("sieve.punycode") {
            builder = builder.punycode(parse_bool("sieve.punycode", v)?);
        }
        if let Some(v) = get("sieve.preferred_sasl_mechanism") {
            builder = builder.preferred_mechanism(v);
        }
        if let Some(v) = get("sieve.prefer_gssapi") {
            builder = builder.prefer_gssapi(parse_bool("sieve.prefer_gssapi", v)?);
        }
        if let Some(v) = get("sieve.non_rfc_compliant_tls_regex") {
            let regex = Regex::new(v).map_err(|e| {
                Error::Configuration(format!("sieve.non_rfc_compliant_tls_regex: {e}"))
            })?;
            builder.non_compliant_tls = Some(regex);
        }
        if let Some(v) = get("sieve.response_codes") {
            builder = builder.response_codes(parse_bool("sieve.response_codes", v)?);
        }

        Ok(builder.build())
    }

    /// Returns true if `implementation` needs an explicit CAPABILITY after
    /// STARTTLS.
    #[must_use]
    pub fn needs_capability_after_tls(&self, implementation: Option<&str>) -> bool {
        match (&self.non_compliant_tls, implementation) {
            (Some(regex), Some(name)) => regex.is_match(name),
            _ => false,
        }
    }
}

/// Resolves a timeout override in milliseconds.
///
/// `None` or a negative value falls back to `default`; zero disables the
/// timeout.
#[must_use]
pub fn resolve_timeout(override_ms: Option<i64>, default: Duration) -> Option<Duration> {
    match override_ms {
        None => Some(default),
        Some(ms) if ms < 0 => Some(default),
        Some(0) => None,
        Some(ms) => Some(Duration::from_millis(ms.unsigned_abs())),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Configuration(format!("{key}: invalid value {value:?}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(Error::Configuration(format!(
            "{key}: expected a boolean, got {value:?}"
        ))),
    }
}

/// Builder for connection configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    host: String,
    port: u16,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    tls: bool,
    punycode: bool,
    preferred_mechanism: Option<String>,
    prefer_gssapi: bool,
    non_compliant_tls: Option<Regex>,
    response_codes: bool,
}

impl ConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            tls: true,
            punycode: false,
            preferred_mechanism: None,
            prefer_gssapi: false,
            non_compliant_tls: Regex::new(DEFAULT_NON_COMPLIANT_TLS).ok(),
            response_codes: false,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the connect timeout; zero disables it.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Sets the read timeout; zero disables it.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Enables or disables STARTTLS.
    #[must_use]
    pub const fn tls(mut self, enabled: bool) -> Self {
        self.tls = enabled;
        self
    }

    /// Enables or disables IDNA encoding of identities.
    #[must_use]
    pub const fn punycode(mut self, enabled: bool) -> Self {
        self.punycode = enabled;
        self
    }

    /// Names the SASL mechanism to use.
    #[must_use]
    pub fn preferred_mechanism(mut self, name: impl Into<String>) -> Self {
        self.preferred_mechanism = Some(name.into());
        self
    }

    /// Prefers GSSAPI when no mechanism is named.
    #[must_use]
    pub const fn prefer_gssapi(mut self, enabled: bool) -> Self {
        self.prefer_gssapi = enabled;
        self
    }

    /// Replaces the pattern of implementations needing CAPABILITY after
    /// STARTTLS; `None` trusts every server to re-send its capabilities.
    #[must_use]
    pub fn non_compliant_tls(mut self, pattern: Option<Regex>) -> Self {
        self.non_compliant_tls = pattern;
        self
    }

    /// Enables or disables response code parsing.
    #[must_use]
    pub const fn response_codes(mut self, enabled: bool) -> Self {
        self.response_codes = enabled;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        Config {
            host: self.host,
            port: self.port,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            tls: self.tls,
            punycode: self.punycode,
            preferred_mechanism: self.preferred_mechanism,
            prefer_gssapi: self.prefer_gssapi,
            non_compliant_tls: self.non_compliant_tls,
            response_codes: self.response_codes,
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

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_config_new() {
        let config = Config::new("sieve.example.com");
        assert_eq!(config.host, "sieve.example.com");
        assert_eq!(config.port, 4190);
        assert!(config.tls);
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.read_timeout, Some(Duration::from_secs(60)));
        assert!(!config.response_codes);
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder("sieve.example.com")
            .port(2000)
            .tls(false)
            .read_timeout(Duration::ZERO)
            .preferred_mechanism("LOGIN")
            .build();

        assert_eq!(config.port, 2000);
        assert!(!config.tls);
        assert_eq!(config.read_timeout, None);
        assert_eq!(config.preferred_mechanism.as_deref(), Some("LOGIN"));
    }

    #[test]
    fn test_resolve_timeout() {
        let default = Duration::from_secs(30);
        assert_eq!(resolve_timeout(None, default), Some(default));
        assert_eq!(resolve_timeout(Some(-1), default), Some(default));
        assert_eq!(resolve_timeout(Some(0), default), None);
        assert_eq!(
            resolve_timeout(Some(1500), default),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_from_properties() {
        let config = Config::from_properties(&props(&[
            ("sieve.host", "imap.example.org"),
            ("sieve.port", "2000"),
            ("sieve.connect_timeout", "-5"),
            ("sieve.read_timeout", "0"),
            ("sieve.tls", "false"),
            ("sieve.punycode", "TRUE"),
            ("sieve.prefer_gssapi", "1"),
            ("sieve.response_codes", "yes"),
        ]))
        .unwrap();

        assert_eq!(config.host, "imap.example.org");
        assert_eq!(config.port, 2000);
        assert_eq!(config.connect_timeout, Some(DEFAULT_CONNECT_TIMEOUT));
        assert_eq!(config.read_timeout, None);
        assert!(!config.tls);
        assert!(config.punycode);
        assert!(config.prefer_gssapi);
        assert!(config.response_codes);
    }

    #[test]
    fn test_from_properties_requires_host() {
        let err = Config::from_properties(&props(&[("sieve.port", "4190")])).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_from_properties_rejects_garbage() {
        let err = Config::from_properties(&props(&[
            ("sieve.host", "h"),
            ("sieve.port", "http"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("sieve.port"));

        let err = Config::from_properties(&props(&[
            ("sieve.host", "h"),
            ("sieve.non_rfc_compliant_tls_regex", "("),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_non_compliant_pattern() {
        let config = Config::new("h");
        assert!(config.needs_capability_after_tls(Some("Cyrus timsieved v2.2.13")));
        assert!(config.needs_capability_after_tls(Some("Cyrus timsieved v2.3.9")));
        assert!(!config.needs_capability_after_tls(Some("Cyrus timsieved v2.3.10")));
        assert!(!config.needs_capability_after_tls(Some("Dovecot Pigeonhole")));
        assert!(!config.needs_capability_after_tls(None));
    }
}
