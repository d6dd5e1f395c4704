//! Implementation for the authenticated state.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use super::check_status;
use super::states::Authenticated;
use crate::codec::{Reply, ScriptBodyDecoder, split_strings, unquote};
use crate::command::Command;
use crate::types::ResponseCode;
use crate::{Error, Result};

/// Result of LISTSCRIPTS.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptList {
    /// Script names in server order.
    pub scripts: Vec<String>,
    /// Name of the active script, if any.
    pub active: Option<String>,
}

impl ScriptList {
    /// Returns the active script name.
    #[must_use]
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Returns true if a script with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.scripts.iter().any(|s| s == name)
    }

    /// Returns true if `name` is the active script.
    #[must_use]
    pub fn is_active(&self, name: &str) -> bool {
        self.active() == Some(name)
    }
}

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Stores a script (PUTSCRIPT).
    pub async fn put_script(&mut self, name: &str, script: &[u8]) -> Result<()> {
        let response = self
            .simple(&Command::PutScript {
                name: name.to_string(),
                script: script.to_vec(),
            })
            .await?;
        if response.code == Some(ResponseCode::Warnings) {
            tracing::warn!(%name, message = %response.message, "script stored with warnings");
        }
        tracing::debug!(%name, bytes = script.len(), "script stored");
        Ok(())
    }

    /// Activates a script (SETACTIVE).
    pub async fn activate(&mut self, name: &str) -> Result<()> {
        self.simple(&Command::SetActive {
            name: name.to_string(),
        })
        .await?;
        tracing::debug!(%name, "script activated");
        Ok(())
    }

    /// Deactivates `name` if it is the active script; otherwise does nothing.
    pub async fn deactivate(&mut self, name: &str) -> Result<()> {
        let listing = self.list_scripts().await?;
        if !listing.is_active(name) {
            tracing::debug!(%name, "script not active, nothing to deactivate");
            return Ok(());
        }

        self.simple(&Command::SetActive {
            name: String::new(),
        })
        .await?;
        tracing::debug!(%name, "script deactivated");
        Ok(())
    }

    /// Deactivates and then deletes a script (DELETESCRIPT).
    pub async fn delete_script(&mut self, name: &str) -> Result<()> {
        self.deactivate(name).await?;
        self.simple(&Command::DeleteScript {
            name: name.to_string(),
        })
        .await?;
        tracing::debug!(%name, "script deleted");
        Ok(())
    }

    /// Renames a script (RENAMESCRIPT).
    pub async fn rename_script(&mut self, old: &str, new: &str) -> Result<()> {
        self.simple(&Command::RenameScript {
            old: old.to_string(),
            new: new.to_string(),
        })
        .await
        .map(drop)
    }

    /// Asks whether a script of `size` octets may be stored (HAVESPACE).
    ///
    /// A quota refusal is reported as [`Error::No`].
    pub async fn have_space(&mut self, name: &str, size: u64) -> Result<()> {
        self.simple(&Command::HaveSpace {
            name: name.to_string(),
            size,
        })
        .await
        .map(drop)
    }

    /// Validates a script without storing it (CHECKSCRIPT).
    pub async fn check_script(&mut self, script: &[u8]) -> Result<()> {
        self.simple(&Command::CheckScript {
            script: script.to_vec(),
        })
        .await
        .map(drop)
    }

    /// Lists stored scripts (LISTSCRIPTS).
    pub async fn list_scripts(&mut self) -> Result<ScriptList> {
        self.send(&Command::ListScripts).await?;

        let mut listing = ScriptList::default();
        loop {
            let (name, rest) = match self.stream.read_reply(self.response_codes).await? {
                Reply::Status(response) => {
                    check_status(response)?;
                    return Ok(listing);
                }
                Reply::Data {
                    literal: Some(literal),
                    ..
                } => (
                    String::from_utf8_lossy(&literal.data).into_owned(),
                    literal.trailer,
                ),
                Reply::Data { line, .. } => {
                    let mut tokens = split_strings(&line).into_iter();
                    let Some(name) = tokens.next() else {
                        continue;
                    };
                    (name, tokens.collect::<Vec<_>>().join(" "))
                }
            };

            if rest.trim().eq_ignore_ascii_case("ACTIVE") {
                listing.active = Some(name.clone());
            }
            listing.scripts.push(name);
        }
    }

    /// Fetches a script (GETSCRIPT).
    ///
    /// A bare `OK` yields an empty string.
    pub async fn get_script(&mut self, name: &str) -> Result<String> {
        self.send(&Command::GetScript {
            name: name.to_string(),
        })
        .await?;

        match self.stream.read_reply(self.response_codes).await? {
            Reply::Status(response) => {
                check_status(response)?;
                tracing::debug!(%name, "server sent no content");
                Ok(String::new())
            }
            Reply::Data {
                literal: Some(literal),
                ..
            } => {
                self.expect_ok().await?;
                Ok(String::from_utf8_lossy(&literal.data).into_owned())
            }
            Reply::Data { line, .. } => {
                if let Some(text) = unquote(&line) {
                    self.expect_ok().await?;
                    return Ok(text);
                }
                self.read_unframed_body(line).await
            }
        }
    }

    async fn read_unframed_body(&mut self, first: String) -> Result<String> {
        tracing::debug!("script body without literal");
        let mut decoder = ScriptBodyDecoder::new();
        let mut line = first;
        while !decoder.feed_line(&line) {
            line = self
                .stream
                .read_line()
                .await?
                .ok_or(Error::ConnectionClosed)?;
        }
        Ok(decoder.finish())
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
    use crate::connection::client::NotAuthenticated;
    use crate::connection::config::Config;
    use tokio_test::io::{Builder, Mock};

    async fn client(mock: Mock) -> Client<Mock, Authenticated> {
        let config = Config::builder("localhost").response_codes(true).build();
        Client::<Mock, NotAuthenticated>::from_stream(mock, &config)
            .await
            .unwrap()
            .transition()
    }

    #[tokio::test]
    async fn test_list_scripts() {
        let mock = Builder::new()
            .read(b"OK\r\n")
            .write(b"LISTSCRIPTS\r\n")
            .read(b"\"summer\"\r\n\"main\" ACTIVE\r\n{7}\r\nwith \"q\r\nOK\r\n")
            .build();
        let mut client = client(mock).await;

        let listing = client.list_scripts().await.unwrap();
        assert_eq!(listing.scripts, vec!["summer", "main", "with \"q"]);
        assert_eq!(listing.active(), Some("main"));
    }

    #[tokio::test]
    async fn test_get_script_literal() {
        let mock = Builder::new()
            .read(b"OK\r\n")
            .write(b"GETSCRIPT \"main\"\r\n")
            .read(b"{14}\r\nkeep;\r\nstop;\r\n\r\nOK\r\n")
            .build();
        let mut client = client(mock).await;

        assert_eq!(client.get_script("main").await.unwrap(), "keep;\r\nstop;\r\n");
    }

    #[tokio::test]
    async fn test_get_script_bare_ok_is_empty() {
        let mock = Builder::new()
            .read(b"OK\r\n")
            .write(b"GETSCRIPT \"missing\"\r\n")
            .read(b"OK\r\n")
            .build();
        let mut client = client(mock).await;

        assert_eq!(client.get_script("missing").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_get_script_no_is_error() {
        let mock = Builder::new()
            .read(b"OK\r\n")
            .write(b"GETSCRIPT \"missing\"\r\n")
            .read(b"NO (NONEXISTENT) \"There is no script by that name\"\r\n")
            .build();
        let mut client = client(mock).await;

        let err = client.get_script("missing").await.unwrap_err();
        assert_eq!(err.response_code(), Some(&ResponseCode::NonExistent));
    }

    #[tokio::test]
    async fn test_get_script_quoted() {
        let mock = Builder::new()
            .read(b"OK\r\n")
            .write(b"GETSCRIPT \"tiny\"\r\n")
            .read(b"\"keep;\"\r\nOK\r\n")
            .build();
        let mut client = client(mock).await;

        assert_eq!(client.get_script("tiny").await.unwrap(), "keep;");
    }

    #[tokio::test]
    async fn test_get_script_unframed() {
        let mock = Builder::new()
            .read(b"OK\r\n")
            .write(b"GETSCRIPT \"old\"\r\n")
            .read(b"# B\\303\\244r\r\nkeep;\r\nOK\r\n")
            .build();
        let mut client = client(mock).await;

        assert_eq!(client.get_script("old").await.unwrap(), "# Bär\r\nkeep;\r\n");
    }

    #[tokio::test]
    async fn test_put_script_no() {
        let mock = Builder::new()
            .read(b"OK\r\n")
            .write(b"PUTSCRIPT \"big\" {5+}\r\nkeep;\r\n")
            .read(b"NO (QUOTA/MAXSIZE) \"Too big\"\r\n")
            .build();
        let mut client = client(mock).await;

        let err = client.put_script("big", b"keep;").await.unwrap_err();
        assert!(matches!(
            err,
            Error::No { code: Some(ResponseCode::Quota(Some(ref sub))), ref message } if sub == "MAXSIZE" && message == "Too big"
        ));
    }

    #[tokio::test]
    async fn test_put_script_unexpected_line() {
        let mock = Builder::new()
            .read(b"OK\r\n")
            .write(b"PUTSCRIPT \"a\" {5+}\r\nkeep;\r\n")
            .read(b"\"surprise\"\r\n")
            .build();
        let mut client = client(mock).await;

        let err = client.put_script("a", b"keep;").await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_deactivate_inactive_is_noop() {
        let mock = Builder::new()
            .read(b"OK\r\n")
            .write(b"LISTSCRIPTS\r\n")
            .read(b"\"main\" ACTIVE\r\n\"other\"\r\nOK\r\n")
            .build();
        let mut client = client(mock).await;

        client.deactivate("other").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_active_script() {
        let mock = Builder::new()
            .read(b"OK\r\n")
            .write(b"LISTSCRIPTS\r\n")
            .read(b"\"main\" ACTIVE\r\nOK\r\n")
            .write(b"SETACTIVE \"\"\r\n")
            .read(b"OK\r\n")
            .write(b"DELETESCRIPT \"main\"\r\n")
            .read(b"OK\r\n")
            .build();
        let mut client = client(mock).await;

        client.delete_script("main").await.unwrap();
    }

    #[tokio::test]
    async fn test_rename_have_space_check() {
        let mock = Builder::new()
            .read(b"OK\r\n")
            .write(b"RENAMESCRIPT \"a\" \"b\"\r\n")
            .read(b"OK\r\n")
            .write(b"HAVESPACE \"b\" 100\r\n")
            .read(b"OK\r\n")
            .write(b"CHECKSCRIPT {5+}\r\nkeep;\r\n")
            .read(b"NO \"line 1: error\"\r\n")
            .build();
        let mut client = client(mock).await;

        client.rename_script("a", "b").await.unwrap();
        client.have_space("b", 100).await.unwrap();
        let err = client.check_script(b"keep;").await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Script);
    }
}
