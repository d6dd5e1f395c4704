//! Framed I/O for the ManageSieve protocol.
//!
//! ManageSieve uses CRLF-terminated lines with octet-counted literals.
//! This module provides buffered reading and explicit-flush writing.

#![allow(clippy::missing_errors_doc)]

use std::future::Future;
use std::io;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum literal size to prevent memory exhaustion.
pub const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// Framed connection for the ManageSieve protocol.
///
/// Writes are buffered until [`flush`](Self::flush) so a command and its
/// literal payload leave in one piece.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    write_buffer: BytesMut,
    read_timeout: Option<Duration>,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream without a read timeout.
    pub fn new(stream: S) -> Self {
        Self::with_read_timeout(stream, None)
    }

    /// Creates a new framed stream; `None` waits forever.
    pub fn with_read_timeout(stream: S, read_timeout: Option<Duration>) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            write_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
            read_timeout,
        }
    }

    /// Returns the configured read timeout.
    pub const fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Changes the read timeout; `None` waits forever.
    pub const fn set_read_timeout(&mut self, read_timeout: Option<Duration>) {
        self.read_timeout = read_timeout;
    }

    /// Buffers a line of character data followed by CRLF.
    pub fn write_line(&mut self, line: &str) {
        self.write_buffer.extend_from_slice(line.as_bytes());
        self.write_buffer.extend_from_slice(b"\r\n");
    }

    /// Buffers raw bytes (literal payloads, pre-serialized commands).
    pub fn write_raw(&mut self, data: &[u8]) {
        self.write_buffer.extend_from_slice(data);
    }

    /// Sends everything buffered so far.
    pub async fn flush(&mut self) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buffer).await?;
        stream.flush().await?;
        tracing::trace!(bytes = self.write_buffer.len(), "flushed");
        self.write_buffer.clear();

        Ok(())
    }

    /// Reads one line and strips its terminator.
    ///
    /// Returns `Ok(None)` when the stream ended before any byte of the line.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        let timeout = self.read_timeout;
        let line = bounded(timeout, read_raw_line(&mut self.reader)).await?;

        Ok(line.map(|bytes| {
            let line = String::from_utf8_lossy(&bytes).into_owned();
            tracing::trace!(%line, "S:");
            line
        }))
    }

    /// Reads exactly `len` octets, CR and LF included.
    pub async fn read_literal(&mut self, len: usize) -> Result<Vec<u8>> {
        // Validate literal size to prevent DoS via memory exhaustion
        if len > MAX_LITERAL_SIZE {
            return Err(Error::Protocol(format!(
                "literal too large: {len} bytes (max {MAX_LITERAL_SIZE})"
            )));
        }

        let timeout = self.read_timeout;
        let reader = &mut self.reader;
        bounded(timeout, async move {
            let mut literal = vec![0u8; len];
            match reader.read_exact(&mut literal).await {
                Ok(_) => Ok(literal),
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(Error::ConnectionClosed),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    /// Gets a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }

    /// Gets a mutable reference to the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        self.reader.get_mut()
    }

    /// Consumes the framed stream and returns the inner stream.
    ///
    /// Note: Any buffered data will be lost.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

async fn bounded<T>(
    timeout: Option<Duration>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout(limit))?,
        None => fut.await,
    }
}

async fn read_raw_line<R>(reader: &mut BufReader<R>) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::new();

    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Ok((!line.is_empty()).then_some(line));
        }

        if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            line.extend_from_slice(&buf[..pos]);
            reader.consume(pos + 1);
            break;
        }

        // No LF yet, consume all and continue
        let len = buf.len();
        line.extend_from_slice(buf);
        reader.consume(len);

        if line.len() > MAX_LINE_LENGTH {
            return Err(Error::Protocol("line too long".to_string()));
        }
    }

    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(Some(line))
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

    #[tokio::test]
    async fn test_read_simple_line() {
        let mock = Builder::new().read(b"OK \"ready\"\r\n").build();
        let mut framed = FramedStream::new(mock);

        let line = framed.read_line().await.unwrap();
        assert_eq!(line.as_deref(), Some("OK \"ready\""));
    }

    #[tokio::test]
    async fn test_read_line_split_across_reads() {
        let mock = Builder::new()
            .read(b"\"SIEVE\" \"file")
            .read(b"into\"\r")
            .read(b"\nOK\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        assert_eq!(
            framed.read_line().await.unwrap().as_deref(),
            Some("\"SIEVE\" \"fileinto\"")
        );
        assert_eq!(framed.read_line().await.unwrap().as_deref(), Some("OK"));
    }

    #[tokio::test]
    async fn test_read_line_eof_is_none() {
        let mock = Builder::new().build();
        let mut framed = FramedStream::new(mock);

        assert!(framed.read_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_literal_keeps_crlf() {
        let mock = Builder::new()
            .read(b"{12}\r\n")
            .read(b"keep;\r\nstop;")
            .read(b"\r\nOK\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let header = framed.read_line().await.unwrap().unwrap();
        assert_eq!(header, "{12}");
        let literal = framed.read_literal(12).await.unwrap();
        assert_eq!(literal, b"keep;\r\nstop;");
        assert_eq!(framed.read_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(framed.read_line().await.unwrap().as_deref(), Some("OK"));
    }

    #[tokio::test]
    async fn test_read_literal_zero_length() {
        let mock = Builder::new().read(b"\r\n").build();
        let mut framed = FramedStream::new(mock);

        assert!(framed.read_literal(0).await.unwrap().is_empty());
        assert_eq!(framed.read_line().await.unwrap().as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_read_literal_short_stream() {
        let mock = Builder::new().read(b"abc").build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_literal(10).await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_literal_size_validation() {
        let mock = Builder::new().build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_literal(MAX_LITERAL_SIZE + 1).await;
        assert!(result.unwrap_err().to_string().contains("literal too large"));
    }

    #[tokio::test]
    async fn test_writes_are_buffered_until_flush() {
        let mock = Builder::new()
            .write(b"PUTSCRIPT \"a\" {5+}\r\nkeep;\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        framed.write_line("PUTSCRIPT \"a\" {5+}");
        framed.write_raw(b"keep;");
        framed.write_line("");
        framed.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_line_length_limit() {
        let long_line = "A".repeat(MAX_LINE_LENGTH + 100);
        let mock = Builder::new().read(long_line.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_line().await;
        assert!(result.unwrap_err().to_string().contains("line too long"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout() {
        let mock = Builder::new()
            .wait(Duration::from_secs(5))
            .read(b"OK\r\n")
            .build();
        let mut framed = FramedStream::with_read_timeout(mock, Some(Duration::from_secs(1)));

        let result = framed.read_line().await;
        assert!(matches!(result, Err(Error::Timeout(_))));

        framed.set_read_timeout(None);
        assert_eq!(framed.read_line().await.unwrap().as_deref(), Some("OK"));
    }
}
