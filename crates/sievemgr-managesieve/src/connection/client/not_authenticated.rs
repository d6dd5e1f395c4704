//! Implementation for the not-authenticated state.

use std::marker::PhantomData;

use tokio::io::{AsyncRead, AsyncWrite};

use super::states::{Authenticated, NotAuthenticated};
use super::{Client, check_status};
use crate::auth::{self, AuthOptions, Credentials};
use crate::codec::FramedStream;
use crate::command::Command;
use crate::connection::config::Config;
use crate::connection::stream::TlsUpgrade;
use crate::types::{Capabilities, Mechanism, Status};
use crate::{Error, Result};

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new client from a connected stream.
    ///
    /// Reads the greeting, which carries the initial capability listing.
    pub async fn from_stream(stream: S, config: &Config) -> Result<Self> {
        let mut client = Self {
            stream: FramedStream::with_read_timeout(stream, config.read_timeout),
            capabilities: Capabilities::new(),
            response_codes: config.response_codes,
            _state: PhantomData,
        };

        let (capabilities, greeting) = match client.read_capabilities().await {
            Ok(listing) => listing,
            Err(Error::ConnectionClosed) => {
                return Err(connection_error(config, "no welcome from server", None));
            }
            Err(e) => return Err(e),
        };

        if greeting.status != Status::Ok {
            let reason = if greeting.message.is_empty() {
                "server refused the connection"
            } else {
                greeting.message.as_str()
            };
            return Err(connection_error(config, reason, greeting.code.clone()));
        }

        tracing::debug!(
            implementation = capabilities.implementation.as_deref().unwrap_or("unknown"),
            starttls = capabilities.starttls,
            sasl = ?capabilities.sasl,
            "greeting received"
        );
        client.capabilities = capabilities;
        Ok(client)
    }

    /// Runs the SASL exchange for `mechanism`.
    ///
    /// Consumes self and returns an authenticated client on success. On
    /// failure the connection is logged out and closed.
    pub async fn authenticate(
        mut self,
        mechanism: Mechanism,
        credentials: &mut Credentials,
        options: &AuthOptions,
    ) -> Result<Client<S, Authenticated>> {
        match auth::authenticate(&mut self.stream, mechanism, credentials, options).await {
            Ok(()) => {
                tracing::debug!(%mechanism, "authenticated");
                Ok(self.transition())
            }
            Err(e) => {
                let _ = self.logout().await;
                Err(e)
            }
        }
    }

    /// Reads capabilities after a TLS upgrade.
    ///
    /// Compliant servers re-send the listing unsolicited; implementations
    /// matching the configured pattern need an explicit CAPABILITY.
    pub(crate) async fn refresh_after_tls(
        &mut self,
        config: &Config,
        implementation: Option<&str>,
    ) -> Result<()> {
        if config.needs_capability_after_tls(implementation) {
            tracing::debug!(?implementation, "requesting capabilities after STARTTLS");
            self.capability().await?;
            return Ok(());
        }

        let (capabilities, response) = self.read_capabilities().await?;
        check_status(response)?;
        self.capabilities = capabilities;
        Ok(())
    }
}

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin + TlsUpgrade,
{
    /// Upgrades the connection with STARTTLS.
    ///
    /// Consumes self and returns the client on the encrypted stream with a
    /// fresh capability snapshot.
    pub async fn starttls(mut self, config: &Config) -> Result<Self> {
        if let Err(e) = self.simple(&Command::StartTls).await {
            let _ = self.logout().await;
            return Err(e);
        }

        let implementation = self.capabilities.implementation.clone();
        let response_codes = self.response_codes;
        let stream = self.stream.into_inner().upgrade_to_tls(&config.host).await?;
        tracing::debug!(host = %config.host, "TLS established");

        let mut client = Self {
            stream: FramedStream::with_read_timeout(stream, config.read_timeout),
            capabilities: Capabilities::new(),
            response_codes,
            _state: PhantomData,
        };
        if let Err(e) = client
            .refresh_after_tls(config, implementation.as_deref())
            .await
        {
            let _ = client.logout().await;
            return Err(e);
        }
        Ok(client)
    }
}

fn connection_error(
    config: &Config,
    reason: &str,
    code: Option<crate::types::ResponseCode>,
) -> Error {
    Error::Connection {
        host: config.host.clone(),
        port: config.port,
        reason: reason.to_string(),
        code,
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
    use crate::types::ResponseCode;
    use tokio_test::io::Builder;

    const GREETING: &[u8] = b"\"IMPLEMENTATION\" \"Dovecot Pigeonhole\"\r\n\
\"SIEVE\" \"fileinto reject imap4flags\"\r\n\
\"SASL\" \"\"\r\n\
\"STARTTLS\"\r\n\
\"VERSION\" \"1.0\"\r\n\
OK \"Dovecot ready.\"\r\n";

    #[tokio::test]
    async fn test_greeting_capabilities() {
        let mock = Builder::new().read(GREETING).build();
        let client = Client::from_stream(mock, &Config::new("localhost"))
            .await
            .unwrap();

        let caps = client.capabilities();
        assert_eq!(caps.implementation.as_deref(), Some("Dovecot Pigeonhole"));
        assert!(caps.starttls);
        assert!(caps.sasl.is_empty());
        assert!(caps.supports_extension("imap4flags"));
    }

    #[tokio::test]
    async fn test_greeting_no_carries_code() {
        let mock = Builder::new()
            .read(b"NO (TRYLATER) \"Maintenance\"\r\n")
            .build();
        let config = Config::builder("localhost").response_codes(true).build();
        let err = Client::from_stream(mock, &config).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Connection { ref reason, code: Some(ResponseCode::TryLater), .. } if reason == "Maintenance"
        ));
    }

    #[tokio::test]
    async fn test_greeting_eof_is_no_welcome() {
        let mock = Builder::new().read(b"\"STARTTLS\"\r\n").build();
        let err = Client::from_stream(mock, &Config::new("localhost"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no welcome"));
    }

    #[tokio::test]
    async fn test_starttls_reads_unsolicited_capabilities() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"STARTTLS\r\n")
            .read(b"OK \"Begin TLS negotiation now.\"\r\n")
            .read(b"\"IMPLEMENTATION\" \"Dovecot Pigeonhole\"\r\n\"SASL\" \"PLAIN LOGIN\"\r\nOK\r\n")
            .build();
        let config = Config::new("localhost");
        let client = Client::from_stream(mock, &config).await.unwrap();
        let client = client.starttls(&config).await.unwrap();

        assert_eq!(client.capabilities().sasl, vec!["PLAIN", "LOGIN"]);
        assert!(!client.capabilities().starttls);
    }

    #[tokio::test]
    async fn test_starttls_non_compliant_server_gets_capability() {
        let mock = Builder::new()
            .read(b"\"IMPLEMENTATION\" \"Cyrus timsieved v2.2.13\"\r\n\"STARTTLS\"\r\nOK\r\n")
            .write(b"STARTTLS\r\n")
            .read(b"OK\r\n")
            .write(b"CAPABILITY\r\n")
            .read(b"\"SASL\" \"PLAIN\"\r\nOK\r\n")
            .build();
        let config = Config::new("localhost");
        let client = Client::from_stream(mock, &config).await.unwrap();
        let client = client.starttls(&config).await.unwrap();

        assert_eq!(client.capabilities().sasl, vec!["PLAIN"]);
    }

    #[tokio::test]
    async fn test_authenticate_plain() {
        let mock = Builder::new()
            .read(b"\"SASL\" \"PLAIN\"\r\nOK\r\n")
            .write(b"AUTHENTICATE \"PLAIN\" {16+}\r\nYm9iAGJvYgBwdw==\r\n")
            .read(b"OK\r\n")
            .build();
        let config = Config::new("localhost");
        let client = Client::from_stream(mock, &config).await.unwrap();

        let mut creds = Credentials::new("bob", "pw");
        let options = AuthOptions {
            host: config.host.clone(),
            port: config.port,
            punycode: false,
            response_codes: false,
        };
        client
            .authenticate(Mechanism::Plain, &mut creds, &options)
            .await
            .unwrap();
    }
}
