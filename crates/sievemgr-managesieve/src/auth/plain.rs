//! PLAIN mechanism (RFC 4616).

use tokio::io::{AsyncRead, AsyncWrite};

use super::{AuthOptions, Credentials, encode_identity, finish, send_authenticate};
use crate::codec::FramedStream;
use crate::types::Mechanism;
use crate::{Error, Result};

/// Builds the PLAIN message `authzid NUL authcid NUL password`.
///
/// This is the buffer before base64 encoding.
#[must_use]
pub fn plain_message(authzid: &str, authcid: &str, password: &str) -> Vec<u8> {
    format!("{authzid}\0{authcid}\0{password}").into_bytes()
}

pub(super) async fn authenticate<S>(
    stream: &mut FramedStream<S>,
    credentials: &Credentials,
    options: &AuthOptions,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if credentials.password.is_empty() {
        return Err(Error::Authentication("no password for PLAIN".to_string()));
    }

    let message = plain_message(
        &encode_identity(&credentials.username, options.punycode),
        &encode_identity(credentials.authname(), options.punycode),
        &credentials.password,
    );
    send_authenticate(stream, Mechanism::Plain, Some(&message)).await?;
    finish(stream, options.response_codes).await
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
    fn test_plain_message_layout() {
        assert_eq!(plain_message("bob", "bob", "pw"), b"bob\0bob\0pw");
        assert_eq!(plain_message("", "admin", "x"), b"\0admin\0x");
    }

    #[tokio::test]
    async fn test_plain_exchange() {
        let mock = Builder::new()
            .write(b"AUTHENTICATE \"PLAIN\" {16+}\r\nYm9iAGJvYgBwdw==\r\n")
            .read(b"OK \"Logged in.\"\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let creds = Credentials::new("bob", "pw");
        authenticate(&mut framed, &creds, &options()).await.unwrap();
    }

    #[tokio::test]
    async fn test_plain_rejected() {
        let mock = Builder::new()
            .write(b"AUTHENTICATE \"PLAIN\" {16+}\r\nYm9iAGJvYgBwdw==\r\n")
            .read(b"NO \"Authentication failed.\"\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let creds = Credentials::new("bob", "pw");
        let err = authenticate(&mut framed, &creds, &options()).await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[tokio::test]
    async fn test_missing_password_sends_nothing() {
        let mock = Builder::new().build();
        let mut framed = FramedStream::new(mock);

        let creds = Credentials::new("bob", "");
        let err = authenticate(&mut framed, &creds, &options()).await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }
}
