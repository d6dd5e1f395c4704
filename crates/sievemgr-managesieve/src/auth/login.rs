//! LOGIN mechanism.
//!
//! Not standardised. The server prompts with base64 `Username:` and
//! `Password:`; anything else aborts the exchange.

use tokio::io::{AsyncRead, AsyncWrite};

use super::{
    AuthOptions, Challenge, Credentials, encode_identity, finish, read_challenge,
    send_authenticate, write_response,
};
use crate::codec::FramedStream;
use crate::types::Mechanism;
use crate::{Error, Result};

const USERNAME_PROMPT: &str = "VXNlcm5hbWU6";
const PASSWORD_PROMPT: &str = "UGFzc3dvcmQ6";

pub(super) async fn authenticate<S>(
    stream: &mut FramedStream<S>,
    credentials: &Credentials,
    options: &AuthOptions,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if credentials.password.is_empty() {
        return Err(Error::Authentication("no password for LOGIN".to_string()));
    }

    send_authenticate(stream, Mechanism::Login, None).await?;

    expect_prompt(stream, USERNAME_PROMPT, options).await?;
    let user = encode_identity(credentials.authname(), options.punycode);
    write_response(stream, user.as_bytes()).await?;

    expect_prompt(stream, PASSWORD_PROMPT, options).await?;
    write_response(stream, credentials.password.as_bytes()).await?;

    finish(stream, options.response_codes).await
}

async fn expect_prompt<S>(
    stream: &mut FramedStream<S>,
    expected: &str,
    options: &AuthOptions,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match read_challenge(stream, options.response_codes).await? {
        Challenge::Continue(prompt) if prompt == expected => Ok(()),
        Challenge::Continue(prompt) => Err(Error::Authentication(format!(
            "unexpected LOGIN prompt {prompt:?}"
        ))),
        Challenge::Done(_) => Err(Error::Protocol(
            "server ended LOGIN before asking for credentials".to_string(),
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

    fn options() -> AuthOptions {
        AuthOptions {
            host: "sieve.example.com".to_string(),
            port: 4190,
            punycode: false,
            response_codes: false,
        }
    }

    #[tokio::test]
    async fn test_login_exchange() {
        let mock = Builder::new()
            .write(b"AUTHENTICATE \"LOGIN\"\r\n")
            .read(b"\"VXNlcm5hbWU6\"\r\n")
            .write(b"{4+}\r\nYm9i\r\n")
            .read(b"{12}\r\nUGFzc3dvcmQ6\r\n")
            .write(b"{4+}\r\ncHc=\r\n")
            .read(b"OK\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let creds = Credentials::new("bob", "pw");
        authenticate(&mut framed, &creds, &options()).await.unwrap();
    }

    #[tokio::test]
    async fn test_login_wrong_prompt() {
        let mock = Builder::new()
            .write(b"AUTHENTICATE \"LOGIN\"\r\n")
            .read(b"\"UGFzc3dvcmQ6\"\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let creds = Credentials::new("bob", "pw");
        let err = authenticate(&mut framed, &creds, &options()).await.unwrap_err();
        assert!(err.to_string().contains("unexpected LOGIN prompt"));
    }
}
