//! # sievemgr-managesieve
//!
//! An async ManageSieve client library implementing RFC 5804.
//!
//! ## Features
//!
//! - **Type-state connection management**: script commands are only reachable
//!   on an authenticated client (`NotAuthenticated` → `Authenticated`)
//! - **Literal framing**: byte-exact `{N}` / `{N+}` literals for script
//!   bodies and SASL tokens
//! - **STARTTLS via rustls**: in-band upgrade with a workaround for servers
//!   that do not re-send their capabilities afterwards
//! - **Authentication**: PLAIN, LOGIN, GSSAPI (external provider), XOAUTH2,
//!   OAUTHBEARER
//! - **Script management**: PUTSCRIPT, GETSCRIPT, LISTSCRIPTS, SETACTIVE,
//!   DELETESCRIPT, RENAMESCRIPT, HAVESPACE, CHECKSCRIPT
//!
//! ## Quick Start
//!
//! ```ignore
//! use sievemgr_managesieve::{Config, Credentials, Session};
//!
//! #[tokio::main]
//! async fn main() -> sievemgr_managesieve::Result<()> {
//!     let config = Config::builder("sieve.example.com").tls(true).build();
//!     let mut credentials = Credentials::new("user@example.com", "secret");
//!
//!     let mut session = Session::connect(config, &mut credentials).await?;
//!     let listing = session.list_scripts().await?;
//!     if let Some(active) = listing.active() {
//!         let script = session.get_script(active).await?;
//!         println!("{script}");
//!     }
//!     session.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! ┌──────────────────┐
//! │ NotAuthenticated │ ─── starttls() ───→ NotAuthenticated (TLS)
//! └──────────────────┘
//!          │
//!          └─── authenticate() ───→ Authenticated ─── logout() ───→ closed
//! ```
//!
//! ## Modules
//!
//! - [`auth`]: SASL mechanisms
//! - [`codec`]: line/literal framing and response classification
//! - [`command`]: command serialization
//! - [`connection`]: configuration, streams, type-state client and session
//! - [`types`]: capabilities, mechanisms, response codes

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod codec;
pub mod command;
pub mod connection;
mod error;
pub mod types;

pub use auth::{Credentials, SaslProvider};
pub use codec::{FramedStream, ScriptBodyDecoder, parse_first_line, parse_response};
pub use command::Command;
pub use connection::{
    Authenticated, Client, Config, ConfigBuilder, NotAuthenticated, ScriptList, Session,
    SessionPhase, SieveStream,
};
pub use error::{Error, ErrorKind, Result};
pub use types::{Capabilities, Mechanism, Response, ResponseCode, Status};

/// Default ManageSieve port (RFC 5804).
pub const DEFAULT_PORT: u16 = 4190;
