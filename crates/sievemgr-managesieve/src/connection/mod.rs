//! ManageSieve connection management.
//!
//! This module provides connection handling for ManageSieve servers, including:
//! - Configuration (host, port, timeouts, TLS and SASL preferences)
//! - Plaintext/TLS stream abstraction with in-place STARTTLS upgrade
//! - Type-state connection wrapper
//! - High-level session driving the connection sequence

mod client;
mod config;
mod session;
mod stream;

pub use client::{Authenticated, Client, NotAuthenticated, ScriptList};
pub use config::{
    Config, ConfigBuilder, DEFAULT_CONNECT_TIMEOUT, DEFAULT_NON_COMPLIANT_TLS,
    DEFAULT_READ_TIMEOUT, resolve_timeout,
};
pub use session::{Session, SessionPhase};
pub use stream::{SieveStream, TlsUpgrade, connect_plain, create_tls_connector};
