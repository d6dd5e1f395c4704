//! Type-state ManageSieve client connection.
//!
//! Uses the type-state pattern to enforce valid state transitions at compile time:
//!
//! - `NotAuthenticated`: after the greeting, possibly after STARTTLS
//! - `Authenticated`: after a successful AUTHENTICATE
//!
//! Each state only exposes methods that are valid for that state.

#![allow(clippy::missing_errors_doc)]

mod authenticated;
mod not_authenticated;
mod states;

use std::marker::PhantomData;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

pub use self::authenticated::ScriptList;
pub use self::states::{Authenticated, NotAuthenticated};
use crate::codec::{FramedStream, Reply, before_literal, quote};
use crate::command::Command;
use crate::types::{Capabilities, Response, Status};
use crate::{Error, Result};

/// ManageSieve client connection with type-state.
///
/// The type parameter `State` tracks the connection state at compile time.
pub struct Client<S, State> {
    pub(crate) stream: FramedStream<S>,
    pub(crate) capabilities: Capabilities,
    pub(crate) response_codes: bool,
    _state: PhantomData<State>,
}

// Manual Debug implementation since FramedStream doesn't implement Debug
impl<S, State> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("capabilities", &self.capabilities)
            .field("response_codes", &self.response_codes)
            .finish_non_exhaustive()
    }
}

/// Shared implementation for all states.
impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the current capability snapshot.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Sends a NOOP command.
    pub async fn noop(&mut self) -> Result<()> {
        self.simple(&Command::Noop).await.map(drop)
    }

    /// Sends CAPABILITY and replaces the stored snapshot.
    pub async fn capability(&mut self) -> Result<&Capabilities> {
        self.send(&Command::Capability).await?;
        let (capabilities, response) = self.read_capabilities().await?;
        check_status(response)?;
        self.capabilities = capabilities;
        Ok(&self.capabilities)
    }

    /// Sends LOGOUT and shuts the stream down.
    ///
    /// The reply is not required; the stream is closed regardless.
    pub async fn logout(mut self) -> Result<()> {
        let sent = self.send(&Command::Logout).await;
        if sent.is_ok() {
            let _ = self.stream.read_reply(self.response_codes).await;
        }
        let closed = self.stream.get_mut().shutdown().await;
        tracing::debug!("logged out");
        sent?;
        closed.map_err(Error::from)
    }

    /// Moves the connection into another state.
    pub(crate) fn transition<Next>(self) -> Client<S, Next> {
        Client {
            stream: self.stream,
            capabilities: self.capabilities,
            response_codes: self.response_codes,
            _state: PhantomData,
        }
    }

    pub(crate) async fn send(&mut self, cmd: &Command) -> Result<()> {
        tracing::trace!(command = cmd.name(), "C:");
        self.stream.write_raw(&cmd.serialize());
        self.stream.flush().await
    }

    /// Sends a command whose only reply is a status line.
    pub(crate) async fn simple(&mut self, cmd: &Command) -> Result<Response> {
        self.send(cmd).await?;
        self.expect_ok().await
    }

    /// Reads a status line and turns NO/BYE into errors.
    pub(crate) async fn expect_ok(&mut self) -> Result<Response> {
        match self.stream.read_reply(self.response_codes).await? {
            Reply::Status(response) => check_status(response),
            Reply::Data { line, .. } => Err(Error::Protocol(format!(
                "unexpected response line: {line}"
            ))),
        }
    }

    /// Reads capability lines up to the closing status line.
    pub(crate) async fn read_capabilities(&mut self) -> Result<(Capabilities, Response)> {
        let mut capabilities = Capabilities::new();
        loop {
            match self.stream.read_reply(self.response_codes).await? {
                Reply::Status(response) => return Ok((capabilities, response)),
                Reply::Data { line, literal } => {
                    let line = match literal {
                        Some(literal) => format!(
                            "{} {}",
                            before_literal(&line),
                            quote(&String::from_utf8_lossy(&literal.data))
                        ),
                        None => line,
                    };
                    if !capabilities.parse_line(&line) {
                        tracing::warn!(%line, "ignoring empty capability line");
                    }
                }
            }
        }
    }
}

/// Maps a status line to success or the matching error.
pub(crate) fn check_status(response: Response) -> Result<Response> {
    match response.status {
        Status::Ok => Ok(response),
        Status::No => Err(Error::No {
            code: response.code,
            message: response.message,
        }),
        Status::Bye => {
            tracing::warn!(message = %response.message, "server closed the session");
            Err(Error::ConnectionClosed)
        }
    }
}
