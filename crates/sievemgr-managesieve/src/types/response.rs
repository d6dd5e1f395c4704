//! Response status and parsed completion responses.

use super::ResponseCode;

/// Status word that completes a ManageSieve response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Command failed.
    No,
    /// Server is closing the connection.
    Bye,
}

impl Status {
    /// Returns true if this is a successful status.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// A parsed `OK` / `NO` / `BYE` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Completion status.
    pub status: Status,
    /// Bracketed response code, only filled when code parsing is enabled.
    pub code: Option<ResponseCode>,
    /// Human readable text (unquoted).
    pub message: String,
}

impl Response {
    /// Creates a response without a code.
    #[must_use]
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            code: None,
            message: message.into(),
        }
    }

    /// Returns true if the status is OK.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}
