//! Error types for ManageSieve operations.

use std::time::Duration;

use thiserror::Error;

use crate::types::ResponseCode;

/// Coarse classification of a failure, used to decide what to show a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The server could not be reached or the connection broke.
    Connection,
    /// The server sent something this client did not expect.
    Protocol,
    /// Credentials were rejected or the mechanism is not available.
    Authentication,
    /// The server refused a script operation.
    Script,
    /// Required configuration is missing or invalid.
    Configuration,
}

/// Errors that can occur during ManageSieve operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Connection refused, aborted, or rejected at greeting.
    #[error("Connection to {host}:{port} failed: {reason}")]
    Connection {
        /// Server host.
        host: String,
        /// Server port.
        port: u16,
        /// What went wrong.
        reason: String,
        /// Response code sent by the server, if any.
        code: Option<ResponseCode>,
    },

    /// The server closed the stream in the middle of a response.
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// Unexpected response shape or malformed literal header.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The requested SASL mechanism is not advertised by the server.
    #[error("SASL mechanism {0} is not supported by the server")]
    UnsupportedMechanism(String),

    /// Authentication was rejected or the SASL exchange failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Server returned NO for a script command.
    #[error("Server returned NO: {message}")]
    No {
        /// Parsed response code, when response codes are enabled.
        code: Option<ResponseCode>,
        /// Human readable message.
        message: String,
    },

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid state for the requested operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Missing or invalid configuration property.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Any of the above, with the server it happened on.
    #[error("{host}:{port}: {source}")]
    Server {
        /// Server host.
        host: String,
        /// Server port.
        port: u16,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Returns the taxonomy bucket of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_)
            | Self::Tls(_)
            | Self::InvalidDnsName(_)
            | Self::Connection { .. }
            | Self::ConnectionClosed
            | Self::Timeout(_) => ErrorKind::Connection,
            Self::Protocol(_) | Self::InvalidState(_) => ErrorKind::Protocol,
            Self::UnsupportedMechanism(_) | Self::Authentication(_) => ErrorKind::Authentication,
            Self::No { .. } => ErrorKind::Script,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Server { source, .. } => source.kind(),
        }
    }

    /// Returns the response code carried by this error, if any.
    #[must_use]
    pub fn response_code(&self) -> Option<&ResponseCode> {
        match self {
            Self::Connection { code, .. } | Self::No { code, .. } => code.as_ref(),
            Self::Server { source, .. } => source.response_code(),
            _ => None,
        }
    }

    /// Attaches host/port context unless the error already carries it.
    #[must_use]
    pub fn with_server(self, host: &str, port: u16) -> Self {
        match self {
            Self::Connection { .. } | Self::Server { .. } | Self::Configuration(_) => self,
            other => Self::Server {
                host: host.to_string(),
                port,
                source: Box::new(other),
            },
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

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
    fn test_kind_mapping() {
        assert_eq!(Error::ConnectionClosed.kind(), ErrorKind::Connection);
        assert_eq!(Error::Protocol("x".into()).kind(), ErrorKind::Protocol);
        assert_eq!(
            Error::UnsupportedMechanism("GSSAPI".into()).kind(),
            ErrorKind::Authentication
        );
        assert_eq!(
            Error::No {
                code: None,
                message: "nope".into()
            }
            .kind(),
            ErrorKind::Script
        );
        assert_eq!(
            Error::Configuration("sieve.host".into()).kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn test_with_server_keeps_kind_and_code() {
        let err = Error::No {
            code: Some(ResponseCode::NonExistent),
            message: "no such script".into(),
        }
        .with_server("sieve.example.com", 4190);

        assert_eq!(err.kind(), ErrorKind::Script);
        assert_eq!(err.response_code(), Some(&ResponseCode::NonExistent));
        assert!(err.to_string().starts_with("sieve.example.com:4190"));
    }

    #[test]
    fn test_with_server_does_not_double_wrap() {
        let err = Error::ConnectionClosed
            .with_server("a", 1)
            .with_server("b", 2);
        assert!(err.to_string().starts_with("a:1"));
    }
}
