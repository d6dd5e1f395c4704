//! `OAuth2` bearer mechanisms.
//!
//! - OAUTHBEARER (RFC 7628), host and port bound into the message
//! - XOAUTH2 (Google/Microsoft proprietary)

use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};

use super::{
    AuthOptions, Challenge, Credentials, encode_identity, read_challenge, send_authenticate,
    write_response,
};
use crate::codec::FramedStream;
use crate::types::Mechanism;
use crate::{Error, ErrorKind, Result};

/// Builds the OAUTHBEARER client message.
///
/// Format: `n,a=<user>,\x01host=<host>\x01port=<port>\x01auth=Bearer <token>\x01\x01`
#[must_use]
pub fn oauthbearer_message(user: &str, host: &str, port: u16, token: &str) -> Vec<u8> {
    format!("n,a={user},\x01host={host}\x01port={port}\x01auth=Bearer {token}\x01\x01")
        .into_bytes()
}

/// Builds the XOAUTH2 client message.
///
/// Format: `user=<user>\x01auth=Bearer <token>\x01\x01`
#[must_use]
pub fn xoauth2_message(user: &str, token: &str) -> Vec<u8> {
    format!("user={user}\x01auth=Bearer {token}\x01\x01").into_bytes()
}

/// Parses an `OAuth2` error sent as a SASL continuation.
///
/// `OAuth2` errors are JSON-encoded: `{"status":"401", "schemes":"bearer", "scope":"..."}`
pub fn parse_oauth_error(response: &str) -> std::result::Result<OAuthError, serde_json::Error> {
    serde_json::from_str(response)
}

/// `OAuth2` error response from server.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthError {
    /// HTTP-style status code.
    #[serde(default)]
    pub status: String,
    /// Authentication schemes supported.
    #[serde(default)]
    pub schemes: String,
    /// `OAuth2` scope required.
    pub scope: Option<String>,
}

pub(super) async fn authenticate<S>(
    stream: &mut FramedStream<S>,
    mechanism: Mechanism,
    credentials: &Credentials,
    options: &AuthOptions,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let token = credentials
        .oauth_token
        .as_deref()
        .filter(|token| !token.is_empty())
        .ok_or_else(|| Error::Authentication(format!("no OAuth token for {mechanism}")))?;

    let user = encode_identity(&credentials.username, options.punycode);
    let message = if mechanism == Mechanism::OAuthBearer {
        oauthbearer_message(&user, &options.host, options.port, token)
    } else {
        xoauth2_message(&user, token)
    };
    send_authenticate(stream, mechanism, Some(&message)).await?;

    let data = match read_challenge(stream, options.response_codes).await? {
        Challenge::Done(_) => return Ok(()),
        Challenge::Continue(data) => data,
    };

    // The server reports the failure as a JSON continuation and expects an
    // empty response before it sends the final NO.
    let detail = match Challenge::decode(&data)
        .ok()
        .and_then(|json| parse_oauth_error(&String::from_utf8_lossy(&json)).ok())
    {
        Some(e) => format!("status {}, schemes {}", e.status, e.schemes),
        None => "server rejected the token".to_string(),
    };
    write_response(stream, &[]).await?;

    match read_challenge(stream, options.response_codes).await {
        Err(e) if e.kind() != ErrorKind::Authentication => Err(e),
        _ => Err(Error::Authentication(format!("{mechanism} failed: {detail}"))),
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

    fn options() -> AuthOptions {
        AuthOptions {
            host: "sieve.example.com".to_string(),
            port: 4190,
            punycode: false,
            response_codes: false,
        }
    }

    #[test]
    fn test_oauthbearer_format() {
        let message = oauthbearer_message("test@test.com", "imap.test.com", 4190, "abc");
        assert_eq!(
            message,
            b"n,a=test@test.com,\x01host=imap.test.com\x01port=4190\x01auth=Bearer abc\x01\x01"
        );
    }

    #[test]
    fn test_xoauth2_format() {
        let message = xoauth2_message("test@test.com", "abc");
        assert_eq!(message, b"user=test@test.com\x01auth=Bearer abc\x01\x01");
    }

    #[test]
    fn test_parse_oauth_error() {
        let json = r#"{"status":"401","schemes":"bearer","scope":"https://mail.google.com/"}"#;
        let error = parse_oauth_error(json).unwrap();

        assert_eq!(error.status, "401");
        assert_eq!(error.schemes, "bearer");
        assert_eq!(error.scope.as_deref(), Some("https://mail.google.com/"));
    }

    #[tokio::test]
    async fn test_xoauth2_success() {
        let mock = Builder::new()
            .write(b"AUTHENTICATE \"XOAUTH2\" {52+}\r\n")
            .write(b"dXNlcj1ib2JAZXhhbXBsZS5jb20BYXV0aD1CZWFyZXIgYWJjAQE=\r\n")
            .read(b"OK\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let creds = Credentials::new("bob@example.com", "").with_oauth_token("abc");
        authenticate(&mut framed, Mechanism::XOAuth2, &creds, &options())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_oauthbearer_error_continuation() {
        let mock = Builder::new()
            .write(b"AUTHENTICATE \"OAUTHBEARER\" {96+}\r\n")
            .write(b"bixhPWJvYkBleGFtcGxlLmNvbSwBaG9zdD1zaWV2ZS5leGFtcGxlLmNvbQFwb3J0PTQxOTABYXV0aD1CZWFyZXIgYWJjAQE=\r\n")
            .read(b"\"eyJzdGF0dXMiOiI0MDEiLCJzY2hlbWVzIjoiYmVhcmVyIiwic2NvcGUiOiJodHRwczovL21haWwuZ29vZ2xlLmNvbS8ifQ==\"\r\n")
            .write(b"{0+}\r\n\r\n")
            .read(b"NO \"Authentication failed\"\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let creds = Credentials::new("bob@example.com", "").with_oauth_token("abc");
        let err = authenticate(&mut framed, Mechanism::OAuthBearer, &creds, &options())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Authentication(ref m) if m.contains("status 401")));
    }

    #[tokio::test]
    async fn test_missing_token_sends_nothing() {
        let mock = Builder::new().build();
        let mut framed = FramedStream::new(mock);

        let creds = Credentials::new("bob@example.com", "").with_oauth_token("");
        let err = authenticate(&mut framed, Mechanism::XOAuth2, &creds, &options())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }
}
