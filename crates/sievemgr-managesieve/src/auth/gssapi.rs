//! GSSAPI through an external [`SaslProvider`](super::SaslProvider).

use tokio::io::{AsyncRead, AsyncWrite};

use super::{AuthOptions, Challenge, Credentials, read_challenge, send_authenticate, write_response};
use crate::codec::FramedStream;
use crate::types::Mechanism;
use crate::{Error, Result};

/// Upper bound on challenge rounds before the exchange is abandoned.
const MAX_ROUNDS: usize = 32;

pub(super) async fn authenticate<S>(
    stream: &mut FramedStream<S>,
    credentials: &mut Credentials,
    options: &AuthOptions,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let provider = credentials
        .sasl
        .as_mut()
        .ok_or_else(|| Error::Authentication("no SASL provider for GSSAPI".to_string()))?;

    let initial = provider.step(&[])?;
    send_authenticate(stream, Mechanism::Gssapi, Some(&initial)).await?;

    for _ in 0..MAX_ROUNDS {
        match read_challenge(stream, options.response_codes).await? {
            Challenge::Done(_) => {
                if !provider.is_complete() {
                    tracing::warn!("server accepted GSSAPI before the provider completed");
                }
                return Ok(());
            }
            Challenge::Continue(data) => {
                let challenge = Challenge::decode(&data)?;
                let response = provider.step(&challenge)?;
                write_response(stream, &response).await?;
            }
        }
    }

    Err(Error::Authentication(format!(
        "GSSAPI exchange exceeded {MAX_ROUNDS} rounds"
    )))
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
    use super::super::SaslProvider;
    use super::*;
    use tokio_test::io::Builder;

    /// Replays canned tokens and records the challenges it saw.
    struct Scripted {
        responses: Vec<Vec<u8>>,
        seen: std::sync::Arc<std::sync::Mutex<Vec<Vec<u8>>>>,
    }

    impl SaslProvider for Scripted {
        fn step(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
            self.seen.lock().unwrap().push(challenge.to_vec());
            Ok(self.responses.remove(0))
        }

        fn is_complete(&self) -> bool {
            self.responses.is_empty()
        }
    }

    fn options() -> AuthOptions {
        AuthOptions {
            host: "sieve.example.com".to_string(),
            port: 4190,
            punycode: false,
            response_codes: false,
        }
    }

    #[tokio::test]
    async fn test_gssapi_rounds_with_mixed_continuations() {
        // "tok1" -> dG9rMQ==, "srv" -> c3J2, "" -> empty literal
        let mock = Builder::new()
            .write(b"AUTHENTICATE \"GSSAPI\" {8+}\r\ndG9rMQ==\r\n")
            .read(b"{4}\r\nc3J2\r\n")
            .write(b"{0+}\r\n\r\n")
            .read(b"\"c3J2\"\r\n")
            .write(b"{4+}\r\nZG9u\r\n")
            .read(b"OK\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let seen = std::sync::Arc::default();
        let provider = Scripted {
            responses: vec![b"tok1".to_vec(), Vec::new(), b"don".to_vec()],
            seen: std::sync::Arc::clone(&seen),
        };
        let mut creds = Credentials::new("bob", "").with_sasl_provider(Box::new(provider));

        authenticate(&mut framed, &mut creds, &options()).await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen[0].is_empty());
        assert_eq!(seen[1], b"srv");
        assert_eq!(seen[2], b"srv");
    }

    #[tokio::test]
    async fn test_gssapi_without_provider() {
        let mock = Builder::new().build();
        let mut framed = FramedStream::new(mock);

        let mut creds = Credentials::new("bob", "");
        let err = authenticate(&mut framed, &mut creds, &options()).await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }
}
