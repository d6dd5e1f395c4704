//! Integration tests for the ManageSieve client.
//!
//! These tests use a mock stream to simulate server responses without
//! requiring a real server connection.

use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use proptest::prelude::*;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sievemgr_managesieve::connection::TlsUpgrade;
use sievemgr_managesieve::{
    Config, Credentials, Error, ErrorKind, FramedStream, Result, Session, SessionPhase,
};

/// Routes client logs to the test output; `RUST_LOG` overrides the filter.
fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sievemgr_managesieve=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// Mock stream that returns predefined responses.
struct MockStream {
    /// Responses to return (in order).
    responses: Cursor<Vec<u8>>,
    /// Captured commands sent by the client.
    sent: Arc<Mutex<Vec<u8>>>,
}

impl MockStream {
    fn new(responses: &[u8]) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let stream = Self {
            responses: Cursor::new(responses.to_vec()),
            sent: Arc::clone(&sent),
        };
        (stream, sent)
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let data = self.responses.get_ref();
        let pos = usize::try_from(self.responses.position()).unwrap_or(usize::MAX);

        if pos >= data.len() {
            return Poll::Ready(Ok(()));
        }

        // One line per read so the TLS switch never swallows buffered bytes.
        let remaining = &data[pos..];
        let line_end = remaining
            .iter()
            .position(|&b| b == b'\n')
            .map_or(remaining.len(), |p| p + 1);
        let to_read = line_end.min(buf.remaining());
        buf.put_slice(&remaining[..to_read]);
        self.responses.set_position((pos + to_read) as u64);

        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl TlsUpgrade for MockStream {
    async fn upgrade_to_tls(self, _host: &str) -> Result<Self> {
        Ok(self)
    }
}

fn sent_text(sent: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8_lossy(&sent.lock().unwrap()).into_owned()
}

const GREETING: &str = "\"IMPLEMENTATION\" \"Example Sieve\"\r\n\
\"SIEVE\" \"fileinto imap4flags vacation\"\r\n\
\"SASL\" \"PLAIN LOGIN\"\r\n\
\"VERSION\" \"1.0\"\r\n\
OK \"ready\"\r\n";

#[tokio::test]
async fn test_fetch_and_store_round_trip() {
    init_logging();
    let script = "# Sieve filter\r\nrequire \"fileinto\";\r\n\r\nkeep;\r\n";
    let responses = format!(
        "{GREETING}OK\r\n\
\"main\" ACTIVE\r\nOK\r\n\
{{{}}}\r\n{script}\r\nOK\r\n\
OK\r\n\
OK\r\n",
        script.len()
    );
    let (stream, sent) = MockStream::new(responses.as_bytes());

    let config = Config::builder("sieve.example.com").tls(false).build();
    let mut credentials = Credentials::new("bob", "pw");
    let mut session = Session::handshake(stream, config, &mut credentials)
        .await
        .unwrap();

    let listing = session.list_scripts().await.unwrap();
    let active = listing.active().unwrap().to_string();
    let fetched = session.get_script(&active).await.unwrap();
    assert_eq!(fetched, script);

    session.put_script(&active, fetched.as_bytes()).await.unwrap();
    session.close().await;
    assert_eq!(session.phase(), SessionPhase::Closed);

    let expected = format!(
        "AUTHENTICATE \"PLAIN\" {{16+}}\r\nYm9iAGJvYgBwdw==\r\n\
LISTSCRIPTS\r\n\
GETSCRIPT \"main\"\r\n\
PUTSCRIPT \"main\" {{{}+}}\r\n{script}\r\n\
LOGOUT\r\n",
        script.len()
    );
    assert_eq!(sent_text(&sent), expected);
}

#[tokio::test]
async fn test_getscript_bare_ok_and_no() {
    init_logging();
    let responses = format!("{GREETING}OK\r\nOK\r\nNO \"no such script\"\r\n");
    let (stream, _sent) = MockStream::new(responses.as_bytes());

    let config = Config::builder("sieve.example.com").tls(false).build();
    let mut credentials = Credentials::new("bob", "pw");
    let mut session = Session::handshake(stream, config, &mut credentials)
        .await
        .unwrap();

    assert_eq!(session.get_script("ghost").await.unwrap(), "");

    let err = session.get_script("ghost").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Script);
    assert!(err.to_string().contains("no such script"));
    assert_eq!(session.phase(), SessionPhase::Ready);
}

#[tokio::test]
async fn test_starttls_then_login() {
    init_logging();
    let responses = "\"IMPLEMENTATION\" \"Example Sieve\"\r\n\"STARTTLS\"\r\n\"SASL\" \"\"\r\nOK\r\n\
OK \"Begin TLS negotiation now.\"\r\n\
\"IMPLEMENTATION\" \"Example Sieve\"\r\n\"SASL\" \"LOGIN\"\r\nOK\r\n\
\"VXNlcm5hbWU6\"\r\n\
\"UGFzc3dvcmQ6\"\r\n\
OK\r\n";
    let (stream, sent) = MockStream::new(responses.as_bytes());

    let config = Config::builder("sieve.example.com")
        .preferred_mechanism("LOGIN")
        .build();
    let mut credentials = Credentials::new("bob", "pw");
    let session = Session::handshake(stream, config, &mut credentials)
        .await
        .unwrap();

    assert_eq!(session.phase(), SessionPhase::Ready);
    assert_eq!(
        sent_text(&sent),
        "STARTTLS\r\nAUTHENTICATE \"LOGIN\"\r\n{4+}\r\nYm9i\r\n{4+}\r\ncHc=\r\n"
    );
}

#[tokio::test]
async fn test_greeting_without_ok_is_connection_error() {
    init_logging();
    let (stream, _sent) = MockStream::new(b"\"SASL\" \"PLAIN\"\r\n");

    let config = Config::new("sieve.example.com");
    let mut credentials = Credentials::new("bob", "pw");
    let err = Session::handshake(stream, config, &mut credentials)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(matches!(err, Error::Connection { ref host, port: 4190, .. } if host == "sieve.example.com"));
}

proptest! {
    #[test]
    fn literal_reads_exact_octets(payload in proptest::collection::vec(
        prop_oneof![Just(b'\r'), Just(b'\n'), any::<u8>()],
        0..512,
    )) {
        let mut wire = format!("{{{}}}\r\n", payload.len()).into_bytes();
        wire.extend_from_slice(&payload);
        wire.extend_from_slice(b"\r\nOK\r\n");

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let (literal, next) = runtime.block_on(async {
            let (stream, _sent) = MockStream::new(&wire);
            let mut framed = FramedStream::new(stream);
            framed.read_line().await.unwrap();
            let literal = framed.read_literal(payload.len()).await.unwrap();
            framed.read_line().await.unwrap();
            let next = framed.read_line().await.unwrap();
            (literal, next)
        });

        prop_assert_eq!(literal, payload);
        prop_assert_eq!(next.as_deref(), Some("OK"));
    }
}
