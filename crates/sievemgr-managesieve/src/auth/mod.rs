//! SASL authentication.
//!
//! Every mechanism is a plain async function over the framed stream; the
//! mechanism is picked with an exhaustive `match` in [`authenticate`].
//!
//! - PLAIN (RFC 4616)
//! - LOGIN (legacy, prompt driven)
//! - GSSAPI through a caller supplied [`SaslProvider`]
//! - XOAUTH2 and OAUTHBEARER (RFC 7628)

#![allow(clippy::missing_errors_doc)]

mod gssapi;
mod login;
mod oauth;
mod plain;

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncRead, AsyncWrite};

pub use oauth::{OAuthError, oauthbearer_message, parse_oauth_error, xoauth2_message};
pub use plain::plain_message;

use crate::codec::{FramedStream, Reply, unquote};
use crate::command::Command;
use crate::types::{Capabilities, Mechanism, Response};
use crate::{Error, Result};

/// Token generator for mechanisms this crate does not implement itself.
///
/// GSSAPI uses it to obtain Kerberos tokens from the platform library.
pub trait SaslProvider: Send {
    /// Produces the response to a decoded server challenge.
    ///
    /// The first call receives an empty challenge and yields the initial
    /// response.
    fn step(&mut self, challenge: &[u8]) -> Result<Vec<u8>>;

    /// Returns true once the provider expects no further challenges.
    fn is_complete(&self) -> bool;
}

/// Identity and secrets used to authenticate.
pub struct Credentials {
    /// Authorization identity (the user whose scripts are managed).
    pub username: String,
    /// Authentication identity; defaults to `username`.
    pub authname: Option<String>,
    /// Password for PLAIN and LOGIN.
    pub password: String,
    /// Bearer token for XOAUTH2 and OAUTHBEARER.
    pub oauth_token: Option<String>,
    /// Provider for GSSAPI.
    pub sasl: Option<Box<dyn SaslProvider>>,
}

impl Credentials {
    /// Creates password credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            authname: None,
            password: password.into(),
            oauth_token: None,
            sasl: None,
        }
    }

    /// Sets a separate authentication identity.
    #[must_use]
    pub fn with_authname(mut self, authname: impl Into<String>) -> Self {
        self.authname = Some(authname.into());
        self
    }

    /// Sets the bearer token for the `OAuth2` mechanisms.
    #[must_use]
    pub fn with_oauth_token(mut self, token: impl Into<String>) -> Self {
        self.oauth_token = Some(token.into());
        self
    }

    /// Sets the provider used for GSSAPI.
    #[must_use]
    pub fn with_sasl_provider(mut self, provider: Box<dyn SaslProvider>) -> Self {
        self.sasl = Some(provider);
        self
    }

    /// Returns the authentication identity.
    #[must_use]
    pub fn authname(&self) -> &str {
        self.authname.as_deref().unwrap_or(&self.username)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("authname", &self.authname)
            .field("password", &"<redacted>")
            .field("oauth_token", &self.oauth_token.as_ref().map(|_| "<redacted>"))
            .field("sasl", &self.sasl.is_some())
            .finish()
    }
}

/// Connection facts a mechanism may need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOptions {
    /// Server host, bound into OAUTHBEARER tokens.
    pub host: String,
    /// Server port, bound into OAUTHBEARER tokens.
    pub port: u16,
    /// IDNA-encode the domain part of identities.
    pub punycode: bool,
    /// Parse bracketed response codes.
    pub response_codes: bool,
}

/// Picks the mechanism to use.
///
/// An explicit name wins, then the legacy GSSAPI preference, then PLAIN. The
/// choice must be advertised by the server.
pub fn select_mechanism(
    preferred: Option<&str>,
    prefer_gssapi: bool,
    capabilities: &Capabilities,
) -> Result<Mechanism> {
    let mechanism = match preferred.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => {
            Mechanism::parse(name).ok_or_else(|| Error::UnsupportedMechanism(name.to_string()))?
        }
        None if prefer_gssapi => Mechanism::Gssapi,
        None => Mechanism::Plain,
    };

    if !capabilities.supports_mechanism(mechanism) {
        return Err(Error::UnsupportedMechanism(mechanism.to_string()));
    }
    Ok(mechanism)
}

/// Runs the SASL exchange for `mechanism`.
///
/// Credentials the mechanism needs are checked before anything is written.
pub async fn authenticate<S>(
    stream: &mut FramedStream<S>,
    mechanism: Mechanism,
    credentials: &mut Credentials,
    options: &AuthOptions,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tracing::debug!(%mechanism, user = %credentials.username, "authenticating");
    match mechanism {
        Mechanism::Plain => plain::authenticate(stream, credentials, options).await,
        Mechanism::Login => login::authenticate(stream, credentials, options).await,
        Mechanism::Gssapi => gssapi::authenticate(stream, credentials, options).await,
        Mechanism::XOAuth2 | Mechanism::OAuthBearer => {
            oauth::authenticate(stream, mechanism, credentials, options).await
        }
    }
}

/// Encodes the domain of `user@domain` as punycode when enabled.
#[must_use]
pub fn encode_identity(identity: &str, punycode: bool) -> String {
    if !punycode {
        return identity.to_string();
    }
    let Some((local, domain)) = identity.rsplit_once('@') else {
        return identity.to_string();
    };

    match idna::domain_to_ascii(domain) {
        Ok(ascii) => format!("{local}@{ascii}"),
        Err(e) => {
            tracing::warn!(%domain, error = ?e, "cannot IDNA-encode domain, sending as is");
            identity.to_string()
        }
    }
}

/// What the server sent while a SASL exchange is in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Challenge {
    /// Continuation data, still base64 encoded.
    Continue(String),
    /// Final `OK`.
    Done(Response),
}

impl Challenge {
    fn decode(data: &str) -> Result<Vec<u8>> {
        STANDARD
            .decode(data.trim())
            .map_err(|e| Error::Authentication(format!("invalid base64 challenge: {e}")))
    }
}

pub(crate) async fn send_authenticate<S>(
    stream: &mut FramedStream<S>,
    mechanism: Mechanism,
    initial: Option<&[u8]>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let cmd = Command::Authenticate {
        mechanism: mechanism.as_str().to_string(),
        initial_response: initial.map(|data| STANDARD.encode(data)),
    };
    tracing::trace!("C: AUTHENTICATE \"{mechanism}\"");
    stream.write_raw(&cmd.serialize());
    stream.flush().await
}

/// Reads a continuation (quoted string or literal) or the final status.
pub(crate) async fn read_challenge<S>(
    stream: &mut FramedStream<S>,
    with_codes: bool,
) -> Result<Challenge>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match stream.read_reply(with_codes).await? {
        Reply::Status(resp) if resp.is_ok() => Ok(Challenge::Done(resp)),
        Reply::Status(resp) => Err(Error::Authentication(resp.message)),
        Reply::Data {
            literal: Some(literal),
            ..
        } => Ok(Challenge::Continue(
            String::from_utf8_lossy(&literal.data).trim().to_string(),
        )),
        Reply::Data { line, .. } => Ok(Challenge::Continue(
            unquote(&line).unwrap_or_else(|| line.trim().to_string()),
        )),
    }
}

/// Sends a client response as a base64 literal; empty data becomes `{0+}`.
pub(crate) async fn write_response<S>(stream: &mut FramedStream<S>, data: &[u8]) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let encoded = STANDARD.encode(data);
    stream.write_line(&format!("{{{}+}}", encoded.len()));
    stream.write_line(&encoded);
    stream.flush().await
}

/// Expects the final `OK` of an exchange that needs no further data.
pub(crate) async fn finish<S>(stream: &mut FramedStream<S>, with_codes: bool) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match read_challenge(stream, with_codes).await? {
        Challenge::Done(_) => Ok(()),
        Challenge::Continue(_) => Err(Error::Protocol(
            "unexpected continuation after final SASL response".to_string(),
        )),
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
    use tokio_test::io::Builder;

    fn caps(sasl: &str) -> Capabilities {
        let mut caps = Capabilities::new();
        caps.parse_line(&format!("\"SASL\" \"{sasl}\""));
        caps
    }

    #[test]
    fn test_select_default_plain() {
        let mech = select_mechanism(None, false, &caps("PLAIN LOGIN")).unwrap();
        assert_eq!(mech, Mechanism::Plain);
    }

    #[test]
    fn test_select_explicit_wins_over_gssapi() {
        let mech = select_mechanism(Some("login"), true, &caps("PLAIN LOGIN GSSAPI")).unwrap();
        assert_eq!(mech, Mechanism::Login);
    }

    #[test]
    fn test_select_prefer_gssapi() {
        let mech = select_mechanism(Some(""), true, &caps("GSSAPI PLAIN")).unwrap();
        assert_eq!(mech, Mechanism::Gssapi);
    }

    #[test]
    fn test_select_not_advertised() {
        let err = select_mechanism(None, true, &caps("PLAIN")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedMechanism(ref m) if m == "GSSAPI"));
    }

    #[test]
    fn test_select_unknown_name() {
        let err = select_mechanism(Some("CRAM-MD5"), false, &caps("CRAM-MD5")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedMechanism(_)));
    }

    #[test]
    fn test_encode_identity() {
        assert_eq!(encode_identity("bob@bücher.example", false), "bob@bücher.example");
        assert_eq!(
            encode_identity("bob@bücher.example", true),
            "bob@xn--bcher-kva.example"
        );
        assert_eq!(encode_identity("bob", true), "bob");
    }

    #[test]
    fn test_credentials_debug_redacts() {
        let creds = Credentials::new("bob", "hunter2").with_oauth_token("tok");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("tok\""));
        assert_eq!(creds.authname(), "bob");
    }

    #[tokio::test]
    async fn test_read_challenge_forms() {
        let mock = Builder::new()
            .read(b"\"VXNlcm5hbWU6\"\r\n")
            .read(b"{12}\r\nUGFzc3dvcmQ6\r\n")
            .read(b"OK\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        assert_eq!(
            read_challenge(&mut framed, false).await.unwrap(),
            Challenge::Continue("VXNlcm5hbWU6".to_string())
        );
        assert_eq!(
            read_challenge(&mut framed, false).await.unwrap(),
            Challenge::Continue("UGFzc3dvcmQ6".to_string())
        );
        assert!(matches!(
            read_challenge(&mut framed, false).await.unwrap(),
            Challenge::Done(_)
        ));
    }

    #[tokio::test]
    async fn test_write_empty_response() {
        let mock = Builder::new().write(b"{0+}\r\n\r\n").build();
        let mut framed = FramedStream::new(mock);
        write_response(&mut framed, b"").await.unwrap();
    }

    #[tokio::test]
    async fn test_no_is_authentication_error() {
        let mock = Builder::new()
            .read(b"NO \"Authentication failed\"\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let err = finish(&mut framed, false).await.unwrap_err();
        assert!(matches!(err, Error::Authentication(ref m) if m == "Authentication failed"));
    }
}
