//! Test harness utilities.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use conduit_core::{CorrelationId, Envelope, Message, RegisterRequest, SessionId};
use conduit_ipc::{Transport, TransportConfig, TransportHandle, TransportReader};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf};
use tracing_subscriber::EnvFilter;

/// How long harness helpers wait for the host before failing the test.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a temporary directory for tests.
///
/// # Panics
///
/// Panics if the directory cannot be created.
#[must_use]
pub fn test_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// A socket path inside `dir`.
#[must_use]
pub fn socket_path_in(dir: &TempDir) -> PathBuf {
    dir.path().join("conduit.sock")
}

/// Set up test logging with the given filter.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn setup_test_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}

/// Set up test logging with the default filter (warn level).
pub fn setup_test_logging_default() {
    setup_test_logging("warn");
}

/// Poll `condition` every 10ms until it holds or `timeout` passes.
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: AsyncFnMut() -> bool,
{
    let poll = async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(timeout, poll).await.is_ok()
}

/// A plugin speaking the raw wire protocol, for asserting exact frames.
///
/// Every helper panics on failure; this is test code.
pub struct RawPlugin<S> {
    handle: TransportHandle,
    reader: TransportReader<ReadHalf<S>>,
    backlog: VecDeque<Envelope>,
    next_id: u64,
}

impl<S> RawPlugin<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Frame `stream`. Must be called within a Tokio runtime.
    #[must_use]
    pub fn new(stream: S) -> Self {
        let (handle, reader) = Transport::split(stream, &TransportConfig::default());
        Self {
            handle,
            reader,
            backlog: VecDeque::new(),
            next_id: 1,
        }
    }

    /// Send an envelope as-is.
    ///
    /// # Panics
    ///
    /// Panics if the transport is closed.
    pub async fn send(&self, envelope: Envelope) {
        self.handle.send(&envelope).await.expect("send failed");
    }

    /// Send `message` without a correlation id.
    pub async fn push(&self, message: Message) {
        self.send(Envelope::push(message)).await;
    }

    /// Send `message` with a fresh correlation id and return the id.
    pub async fn request(&mut self, message: Message) -> CorrelationId {
        let id = CorrelationId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.send(Envelope::with_id(id, message)).await;
        id
    }

    /// Next envelope from the host.
    ///
    /// # Panics
    ///
    /// Panics on timeout, a read error or a closed connection.
    pub async fn recv(&mut self) -> Envelope {
        if let Some(envelope) = self.backlog.pop_front() {
            return envelope;
        }
        tokio::time::timeout(RECV_TIMEOUT, self.reader.next())
            .await
            .expect("timed out waiting for the host")
            .expect("connection closed")
            .expect("unreadable frame")
    }

    /// Send a request and wait for the envelope echoing its id. Anything
    /// else received meanwhile is kept for [`recv`](Self::recv).
    pub async fn call(&mut self, message: Message) -> Message {
        let id = self.request(message).await;
        loop {
            let envelope = tokio::time::timeout(RECV_TIMEOUT, self.reader.next())
                .await
                .expect("timed out waiting for the host")
                .expect("connection closed")
                .expect("unreadable frame");
            if envelope.id == Some(id) {
                return envelope.message;
            }
            self.backlog.push_back(envelope);
        }
    }

    /// Wait until the host closes the connection. Returns `false` if it
    /// stays open past [`RECV_TIMEOUT`].
    pub async fn closed_by_host(&mut self) -> bool {
        let wait = async {
            while let Some(Ok(envelope)) = self.reader.next().await {
                self.backlog.push_back(envelope);
            }
        };
        tokio::time::timeout(RECV_TIMEOUT, wait).await.is_ok()
    }

    /// Complete the handshake as `name`.
    ///
    /// # Panics
    ///
    /// Panics if the host does not answer with `register_response`.
    pub async fn register(&mut self, name: &str) -> SessionId {
        match self
            .call(Message::Register(RegisterRequest::new(name, "0.1.0")))
            .await
        {
            Message::RegisterResponse { session_id } => session_id,
            other => panic!("expected register_response, got {other:?}"),
        }
    }

    /// Close the plugin side of the connection.
    pub fn close(&self) {
        self.handle.close();
    }
}
