//! ManageSieve command builder.

use crate::codec::quote;

/// ManageSieve command (RFC 5804 section 2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// CAPABILITY - Request the capability listing
    Capability,
    /// AUTHENTICATE - Begin a SASL exchange
    Authenticate {
        /// Mechanism name as advertised
        mechanism: String,
        /// Base64 initial response, sent as a literal
        initial_response: Option<String>,
    },
    /// PUTSCRIPT - Store a script
    PutScript {
        /// Script name
        name: String,
        /// Script content
        script: Vec<u8>,
    },
    /// SETACTIVE - Activate a script (empty name deactivates)
    SetActive {
        /// Script name
        name: String,
    },
    /// DELETESCRIPT - Remove a script
    DeleteScript {
        /// Script name
        name: String,
    },
    /// LISTSCRIPTS - List stored scripts
    ListScripts,
    /// GETSCRIPT - Fetch a script
    GetScript {
        /// Script name
        name: String,
    },
    /// RENAMESCRIPT - Rename a script
    RenameScript {
        /// Current name
        old: String,
        /// New name
        new: String,
    },
    /// HAVESPACE - Ask whether a script of the given size would fit
    HaveSpace {
        /// Script name
        name: String,
        /// Script size in octets
        size: u64,
    },
    /// CHECKSCRIPT - Validate a script without storing it
    CheckScript {
        /// Script content
        script: Vec<u8>,
    },
    /// NOOP - No operation
    Noop,
    /// LOGOUT - Close the connection
    Logout,
}

impl Command {
    /// Returns the command keyword.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StartTls => "STARTTLS",
            Self::Capability => "CAPABILITY",
            Self::Authenticate { .. } => "AUTHENTICATE",
            Self::PutScript { .. } => "PUTSCRIPT",
            Self::SetActive { .. } => "SETACTIVE",
            Self::DeleteScript { .. } => "DELETESCRIPT",
            Self::ListScripts => "LISTSCRIPTS",
            Self::GetScript { .. } => "GETSCRIPT",
            Self::RenameScript { .. } => "RENAMESCRIPT",
            Self::HaveSpace { .. } => "HAVESPACE",
            Self::CheckScript { .. } => "CHECKSCRIPT",
            Self::Noop => "NOOP",
            Self::Logout => "LOGOUT",
        }
    }

    /// Serializes the command to bytes, CRLF included.
    ///
    /// Payloads are always sent as non-synchronizing literals (`{N+}`).
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.name().as_bytes());

        match self {
            Self::StartTls | Self::Capability | Self::ListScripts | Self::Noop | Self::Logout => {}
            Self::Authenticate {
                mechanism,
                initial_response,
            } => {
                push_quoted(&mut buf, mechanism);
                if let Some(resp) = initial_response {
                    push_literal(&mut buf, resp.as_bytes());
                }
            }
            Self::PutScript { name, script } => {
                push_quoted(&mut buf, name);
                push_literal(&mut buf, script);
            }
            Self::SetActive { name } | Self::DeleteScript { name } | Self::GetScript { name } => {
                push_quoted(&mut buf, name);
            }
            Self::RenameScript { old, new } => {
                push_quoted(&mut buf, old);
                push_quoted(&mut buf, new);
            }
            Self::HaveSpace { name, size } => {
                push_quoted(&mut buf, name);
                buf.extend_from_slice(format!(" {size}").as_bytes());
            }
            Self::CheckScript { script } => push_literal(&mut buf, script),
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }
}

fn push_quoted(buf: &mut Vec<u8>, s: &str) {
    buf.push(b' ');
    buf.extend_from_slice(quote(s).as_bytes());
}

fn push_literal(buf: &mut Vec<u8>, payload: &[u8]) {
    buf.extend_from_slice(format!(" {{{}+}}\r\n", payload.len()).as_bytes());
    buf.extend_from_slice(payload);
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

    #[test]
    fn test_simple_commands() {
        assert_eq!(Command::StartTls.serialize(), b"STARTTLS\r\n");
        assert_eq!(Command::Capability.serialize(), b"CAPABILITY\r\n");
        assert_eq!(Command::ListScripts.serialize(), b"LISTSCRIPTS\r\n");
        assert_eq!(Command::Logout.serialize(), b"LOGOUT\r\n");
    }

    #[test]
    fn test_putscript_literal() {
        let cmd = Command::PutScript {
            name: "main".to_string(),
            script: b"keep;\r\n".to_vec(),
        };
        assert_eq!(cmd.serialize(), b"PUTSCRIPT \"main\" {7+}\r\nkeep;\r\n\r\n");
    }

    #[test]
    fn test_empty_literal() {
        let cmd = Command::CheckScript { script: Vec::new() };
        assert_eq!(cmd.serialize(), b"CHECKSCRIPT {0+}\r\n\r\n");
    }

    #[test]
    fn test_authenticate_with_initial_response() {
        let cmd = Command::Authenticate {
            mechanism: "PLAIN".to_string(),
            initial_response: Some("Ym9iAGJvYgBwdw==".to_string()),
        };
        assert_eq!(
            cmd.serialize(),
            b"AUTHENTICATE \"PLAIN\" {16+}\r\nYm9iAGJvYgBwdw==\r\n"
        );

        let cmd = Command::Authenticate {
            mechanism: "LOGIN".to_string(),
            initial_response: None,
        };
        assert_eq!(cmd.serialize(), b"AUTHENTICATE \"LOGIN\"\r\n");
    }

    #[test]
    fn test_names_are_quoted() {
        let cmd = Command::SetActive {
            name: String::new(),
        };
        assert_eq!(cmd.serialize(), b"SETACTIVE \"\"\r\n");

        let cmd = Command::RenameScript {
            old: "a \"b\"".to_string(),
            new: "c".to_string(),
        };
        assert_eq!(cmd.serialize(), b"RENAMESCRIPT \"a \\\"b\\\"\" \"c\"\r\n");

        let cmd = Command::HaveSpace {
            name: "main".to_string(),
            size: 1024,
        };
        assert_eq!(cmd.serialize(), b"HAVESPACE \"main\" 1024\r\n");
    }
}
