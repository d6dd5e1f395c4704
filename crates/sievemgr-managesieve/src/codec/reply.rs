//! Reading whole replies: a status or data line plus any literal it announces.

use tokio::io::{AsyncRead, AsyncWrite};

use super::framed::FramedStream;
use super::response::{literal_length, parse_first_line, parse_response};
use crate::types::Response;
use crate::{Error, Result};

/// A literal payload and the text that followed it on the same line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    /// Exactly the announced number of octets.
    pub data: Vec<u8>,
    /// Remainder of the line after the payload (e.g. ` ACTIVE`).
    pub trailer: String,
}

/// One server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `OK`, `NO` or `BYE`. A message sent as a literal is already inlined.
    Status(Response),
    /// Any other line, with the literal it announced.
    Data {
        /// The line as received.
        line: String,
        /// Payload announced by a trailing `{N}` / `{N+}`.
        literal: Option<Literal>,
    },
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Reads one reply. End of stream is reported as [`Error::ConnectionClosed`].
    pub async fn read_reply(&mut self, with_codes: bool) -> Result<Reply> {
        let line = self.read_line().await?.ok_or(Error::ConnectionClosed)?;
        let first = parse_first_line(&line);

        let literal = match first.literal {
            Some(len) => Some(self.read_trailing_literal(len).await?),
            None => None,
        };

        if first.status.is_some()
            && let Some(mut response) = parse_response(&line, with_codes)
        {
            if let Some(literal) = literal {
                response.message = String::from_utf8_lossy(&literal.data).into_owned();
            }
            return Ok(Reply::Status(response));
        }

        Ok(Reply::Data { line, literal })
    }

    async fn read_trailing_literal(&mut self, len: usize) -> Result<Literal> {
        let data = self.read_literal(len).await?;
        let trailer = self.read_line().await?.ok_or(Error::ConnectionClosed)?;
        Ok(Literal { data, trailer })
    }
}

/// Returns the part of a data line before its literal header.
#[must_use]
pub fn before_literal(line: &str) -> &str {
    if literal_length(line).is_some()
        && let Some(open) = line.rfind('{')
    {
        return line[..open].trim_end();
    }
    line
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
    use crate::types::{ResponseCode, Status};
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_status_reply() {
        let mock = Builder::new()
            .read(b"NO (NONEXISTENT) \"no such script\"\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let Reply::Status(resp) = framed.read_reply(true).await.unwrap() else {
            panic!("expected status");
        };
        assert_eq!(resp.status, Status::No);
        assert_eq!(resp.code, Some(ResponseCode::NonExistent));
        assert_eq!(resp.message, "no such script");
    }

    #[tokio::test]
    async fn test_status_message_as_literal() {
        let mock = Builder::new()
            .read(b"NO {15}\r\nline 3: error\r\n\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let Reply::Status(resp) = framed.read_reply(false).await.unwrap() else {
            panic!("expected status");
        };
        assert_eq!(resp.message, "line 3: error\r\n");
    }

    #[tokio::test]
    async fn test_data_reply_with_literal_and_trailer() {
        let mock = Builder::new().read(b"{4}\r\nmain ACTIVE\r\n").build();
        let mut framed = FramedStream::new(mock);

        let Reply::Data { line, literal } = framed.read_reply(false).await.unwrap() else {
            panic!("expected data");
        };
        assert_eq!(line, "{4}");
        let literal = literal.unwrap();
        assert_eq!(literal.data, b"main");
        assert_eq!(literal.trailer, " ACTIVE");
    }

    #[tokio::test]
    async fn test_eof_is_connection_closed() {
        let mock = Builder::new().build();
        let mut framed = FramedStream::new(mock);

        assert!(matches!(
            framed.read_reply(false).await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[test]
    fn test_before_literal() {
        assert_eq!(before_literal("\"SIEVE\" {12}"), "\"SIEVE\"");
        assert_eq!(before_literal("\"main\" ACTIVE"), "\"main\" ACTIVE");
    }
}
