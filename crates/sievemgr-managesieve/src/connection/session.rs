//! High-level ManageSieve session.
//!
//! `Session` owns the configuration and drives the connection sequence:
//! greeting, optional STARTTLS, mechanism selection and authentication. It
//! then exposes the script commands through a `&mut self` API.
//!
//! ## Phases
//!
//! ```text
//! Disconnected → Connected → CapabilitiesKnown ─┬─────────────────────────────────┬→ Authenticated → Ready → Closed
//!                                               └→ TlsNegotiating → CapabilitiesKnown ┘
//! ```
//!
//! Any failure after the socket is open logs out and ends in `Closed`.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

use super::client::{Authenticated, Client, ScriptList};
use super::config::Config;
use super::stream::{SieveStream, TlsUpgrade, connect_plain};
use crate::auth::{AuthOptions, Credentials, select_mechanism};
use crate::types::Capabilities;
use crate::{Error, ErrorKind, Result};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    /// No socket yet.
    Disconnected,
    /// Socket open, awaiting the greeting.
    Connected,
    /// Greeting or post-TLS capabilities read.
    CapabilitiesKnown,
    /// STARTTLS accepted, handshake in progress.
    TlsNegotiating,
    /// SASL exchange succeeded.
    Authenticated,
    /// Script commands may be issued.
    Ready,
    /// Logged out or failed.
    Closed,
}

/// An authenticated ManageSieve session.
pub struct Session<S = SieveStream> {
    config: Config,
    phase: SessionPhase,
    client: Option<Client<S, Authenticated>>,
}

// Manual Debug implementation since the client holds the stream
impl<S> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl Session<SieveStream> {
    /// Connects, negotiates TLS if configured and authenticates.
    ///
    /// # Errors
    ///
    /// Returns an error carrying the server's host and port if any step fails.
    pub async fn connect(config: Config, credentials: &mut Credentials) -> Result<Self> {
        tracing::debug!(host = %config.host, port = config.port, "connecting");
        let stream = connect_plain(&config.host, config.port, config.connect_timeout)
            .await
            .map_err(|e| match e {
                Error::Io(io) => Error::Connection {
                    host: config.host.clone(),
                    port: config.port,
                    reason: io.to_string(),
                    code: None,
                },
                other => other.with_server(&config.host, config.port),
            })?;

        Self::handshake(stream, config, credentials).await
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + TlsUpgrade,
{
    /// Runs the connection sequence over an already open stream.
    ///
    /// # Errors
    ///
    /// Returns an error carrying the server's host and port if any step fails.
    pub async fn handshake(stream: S, config: Config, credentials: &mut Credentials) -> Result<Self> {
        let mut session = Self {
            config,
            phase: SessionPhase::Disconnected,
            client: None,
        };
        session.set_phase(SessionPhase::Connected);

        match session.establish(stream, credentials).await {
            Ok(client) => {
                session.client = Some(client);
                session.set_phase(SessionPhase::Ready);
                Ok(session)
            }
            Err(e) => {
                session.set_phase(SessionPhase::Closed);
                Err(e.with_server(&session.config.host, session.config.port))
            }
        }
    }

    async fn establish(
        &mut self,
        stream: S,
        credentials: &mut Credentials,
    ) -> Result<Client<S, Authenticated>> {
        let mut client = Client::from_stream(stream, &self.config).await?;
        self.set_phase(SessionPhase::CapabilitiesKnown);

        if self.config.tls {
            if client.capabilities().starttls {
                self.set_phase(SessionPhase::TlsNegotiating);
                client = client.starttls(&self.config).await?;
                self.set_phase(SessionPhase::CapabilitiesKnown);
            } else {
                tracing::warn!(
                    host = %self.config.host,
                    "TLS requested but STARTTLS not advertised, continuing without TLS"
                );
            }
        }

        let mechanism = match select_mechanism(
            self.config.preferred_mechanism.as_deref(),
            self.config.prefer_gssapi,
            client.capabilities(),
        ) {
            Ok(mechanism) => mechanism,
            Err(e) => {
                let _ = client.logout().await;
                return Err(e);
            }
        };

        let options = AuthOptions {
            host: self.config.host.clone(),
            port: self.config.port,
            punycode: self.config.punycode,
            response_codes: self.config.response_codes,
        };
        let client = client.authenticate(mechanism, credentials, &options).await?;
        self.set_phase(SessionPhase::Authenticated);
        Ok(client)
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the current phase.
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the capability snapshot, or `None` once closed.
    #[must_use]
    pub fn capabilities(&self) -> Option<&Capabilities> {
        self.client.as_ref().map(Client::capabilities)
    }

    /// Refreshes the capability snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed or the command fails.
    pub async fn capability(&mut self) -> Result<Capabilities> {
        let result = match self.client_mut() {
            Ok(client) => client.capability().await.cloned(),
            Err(e) => Err(e),
        };
        self.context(result)
    }

    /// Lists stored scripts.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed or the command fails.
    pub async fn list_scripts(&mut self) -> Result<ScriptList> {
        let result = match self.client_mut() {
            Ok(client) => client.list_scripts().await,
            Err(e) => Err(e),
        };
        self.context(result)
    }

    /// Fetches a script; a bare `OK` from the server yields an empty string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] if the server refuses.
    pub async fn get_script(&mut self, name: &str) -> Result<String> {
        let result = match self.client_mut() {
            Ok(client) => client.get_script(name).await,
            Err(e) => Err(e),
        };
        self.context(result)
    }

    /// Stores a script.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] if the server refuses.
    pub async fn put_script(&mut self, name: &str, script: &[u8]) -> Result<()> {
        let result = match self.client_mut() {
            Ok(client) => client.put_script(name, script).await,
            Err(e) => Err(e),
        };
        self.context(result)
    }

    /// Activates a script.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] if the server refuses.
    pub async fn activate(&mut self, name: &str) -> Result<()> {
        let result = match self.client_mut() {
            Ok(client) => client.activate(name).await,
            Err(e) => Err(e),
        };
        self.context(result)
    }

    /// Deactivates `name` if it is the active script.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] if the server refuses.
    pub async fn deactivate(&mut self, name: &str) -> Result<()> {
        let result = match self.client_mut() {
            Ok(client) => client.deactivate(name).await,
            Err(e) => Err(e),
        };
        self.context(result)
    }

    /// Deactivates and deletes a script.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] if the server refuses.
    pub async fn delete_script(&mut self, name: &str) -> Result<()> {
        let result = match self.client_mut() {
            Ok(client) => client.delete_script(name).await,
            Err(e) => Err(e),
        };
        self.context(result)
    }

    /// Renames a script.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] if the server refuses.
    pub async fn rename_script(&mut self, old: &str, new: &str) -> Result<()> {
        let result = match self.client_mut() {
            Ok(client) => client.rename_script(old, new).await,
            Err(e) => Err(e),
        };
        self.context(result)
    }

    /// Asks whether a script of `size` octets would fit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] when over quota.
    pub async fn have_space(&mut self, name: &str, size: u64) -> Result<()> {
        let result = match self.client_mut() {
            Ok(client) => client.have_space(name, size).await,
            Err(e) => Err(e),
        };
        self.context(result)
    }

    /// Validates a script without storing it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] with the server's diagnostics.
    pub async fn check_script(&mut self, script: &[u8]) -> Result<()> {
        let result = match self.client_mut() {
            Ok(client) => client.check_script(script).await,
            Err(e) => Err(e),
        };
        self.context(result)
    }

    /// Sends NOOP.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed or the connection broke.
    pub async fn noop(&mut self) -> Result<()> {
        let result = match self.client_mut() {
            Ok(client) => client.noop().await,
            Err(e) => Err(e),
        };
        self.context(result)
    }

    /// Logs out and closes the socket. Errors are ignored; calling it twice
    /// is harmless.
    pub async fn close(&mut self) {
        if let Some(client) = self.client.take()
            && let Err(e) = client.logout().await
        {
            tracing::debug!(error = %e, "logout failed");
        }
        self.set_phase(SessionPhase::Closed);
    }

    fn client_mut(&mut self) -> Result<&mut Client<S, Authenticated>> {
        self.client
            .as_mut()
            .ok_or_else(|| Error::InvalidState("session is closed".to_string()))
    }

    /// Adds host/port context; a broken connection closes the session.
    fn context<T>(&mut self, result: Result<T>) -> Result<T> {
        result.map_err(|e| {
            if e.kind() == ErrorKind::Connection {
                self.client = None;
                self.set_phase(SessionPhase::Closed);
            }
            e.with_server(&self.config.host, self.config.port)
        })
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            tracing::debug!(from = ?self.phase, to = ?phase, "session phase");
            self.phase = phase;
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
    use tokio_test::io::Builder;

    fn config() -> Config {
        Config::builder("sieve.example.com").build()
    }

    #[tokio::test]
    async fn test_full_sequence() {
        let mock = Builder::new()
            .read(b"\"IMPLEMENTATION\" \"Dovecot\"\r\n\"SASL\" \"\"\r\n\"STARTTLS\"\r\nOK\r\n")
            .write(b"STARTTLS\r\n")
            .read(b"OK\r\n")
            .read(b"\"IMPLEMENTATION\" \"Dovecot\"\r\n\"SASL\" \"PLAIN\"\r\n\"SIEVE\" \"fileinto\"\r\nOK\r\n")
            .write(b"AUTHENTICATE \"PLAIN\" {16+}\r\nYm9iAGJvYgBwdw==\r\n")
            .read(b"OK \"Logged in.\"\r\n")
            .write(b"LISTSCRIPTS\r\n")
            .read(b"\"main\" ACTIVE\r\nOK\r\n")
            .write(b"LOGOUT\r\n")
            .read(b"OK \"Bye.\"\r\n")
            .build();

        let mut creds = Credentials::new("bob", "pw");
        let mut session = Session::handshake(mock, config(), &mut creds).await.unwrap();
        assert_eq!(session.phase(), SessionPhase::Ready);
        assert!(session.capabilities().unwrap().supports_extension("fileinto"));

        let listing = session.list_scripts().await.unwrap();
        assert_eq!(listing.active(), Some("main"));

        session.close().await;
        assert_eq!(session.phase(), SessionPhase::Closed);
        session.close().await;
    }

    #[tokio::test]
    async fn test_tls_not_advertised_continues_in_plaintext() {
        let mock = Builder::new()
            .read(b"\"SASL\" \"PLAIN\"\r\nOK\r\n")
            .write(b"AUTHENTICATE \"PLAIN\" {16+}\r\nYm9iAGJvYgBwdw==\r\n")
            .read(b"OK\r\n")
            .build();

        let mut creds = Credentials::new("bob", "pw");
        let session = Session::handshake(mock, config(), &mut creds).await.unwrap();
        assert_eq!(session.phase(), SessionPhase::Ready);
    }

    #[tokio::test]
    async fn test_unsupported_mechanism_closes() {
        let mock = Builder::new()
            .read(b"\"SASL\" \"PLAIN\"\r\nOK\r\n")
            .write(b"LOGOUT\r\n")
            .read(b"OK\r\n")
            .build();

        let config = Config::builder("sieve.example.com")
            .tls(false)
            .preferred_mechanism("GSSAPI")
            .build();
        let mut creds = Credentials::new("bob", "pw");
        let err = Session::handshake(mock, config, &mut creds).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert!(err.to_string().starts_with("sieve.example.com:4190"));
    }

    #[tokio::test]
    async fn test_rejected_credentials_close() {
        let mock = Builder::new()
            .read(b"\"SASL\" \"PLAIN\"\r\nOK\r\n")
            .write(b"AUTHENTICATE \"PLAIN\" {16+}\r\nYm9iAGJvYgBwdw==\r\n")
            .read(b"NO \"Authentication failed.\"\r\n")
            .write(b"LOGOUT\r\n")
            .read(b"OK\r\n")
            .build();

        let mut creds = Credentials::new("bob", "pw");
        let err = Session::handshake(mock, config(), &mut creds).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_broken_connection_closes_session() {
        let mock = Builder::new()
            .read(b"\"SASL\" \"PLAIN\"\r\nOK\r\n")
            .write(b"AUTHENTICATE \"PLAIN\" {16+}\r\nYm9iAGJvYgBwdw==\r\n")
            .read(b"OK\r\n")
            .write(b"GETSCRIPT \"main\"\r\n")
            .build();

        let mut creds = Credentials::new("bob", "pw");
        let mut session = Session::handshake(mock, config(), &mut creds).await.unwrap();

        let err = session.get_script("main").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(session.phase(), SessionPhase::Closed);

        let err = session.noop().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }
}
