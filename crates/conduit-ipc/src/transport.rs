//! Transport Session: one framed duplex stream to one peer.
//!
//! The write half is owned by a dedicated writer task fed through a bounded
//! queue, so any number of tasks can send concurrently while frames stay in
//! enqueue order. The read half is handed out exactly once as a
//! [`TransportReader`], the sole reader of the stream.

use std::time::Duration;

use conduit_core::Envelope;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio_util::bytes::Bytes;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::codec::{DEFAULT_MAX_FRAME_BYTES, EnvelopeCodec};
use crate::error::{TransportError, TransportResult};

/// Default capacity of the outbound frame queue.
pub const DEFAULT_OUTBOUND_QUEUE: usize = 256;

/// How long the writer keeps flushing queued frames after close.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Transport tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Maximum encoded envelope size in either direction.
    pub max_frame_bytes: usize,
    /// Outbound frames buffered before `send` waits.
    pub outbound_queue: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
        }
    }
}

impl TransportConfig {
    /// Set the frame size limit.
    #[must_use]
    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    /// Set the outbound queue capacity.
    #[must_use]
    pub fn with_outbound_queue(mut self, outbound_queue: usize) -> Self {
        self.outbound_queue = outbound_queue.max(1);
        self
    }
}

/// Entry point for framing a stream.
pub struct Transport;

impl Transport {
    /// Split `stream` into a send handle and a receive half, spawning the
    /// writer task on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn split<S>(
        stream: S,
        config: &TransportConfig,
    ) -> (TransportHandle, TransportReader<ReadHalf<S>>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (tx, rx) = mpsc::channel(config.outbound_queue.max(1));
        let shutdown = CancellationToken::new();

        let sink = FramedWrite::new(write_half, EnvelopeCodec::new(config.max_frame_bytes));
        tokio::spawn(write_loop(sink, rx, shutdown.clone()));

        let handle = TransportHandle {
            tx,
            shutdown,
            max_frame_bytes: config.max_frame_bytes,
        };
        let reader = TransportReader {
            frames: FramedRead::new(read_half, EnvelopeCodec::new(config.max_frame_bytes)),
        };
        (handle, reader)
    }
}

/// Cloneable sending side of a transport.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    tx: mpsc::Sender<Bytes>,
    shutdown: CancellationToken,
    max_frame_bytes: usize,
}

impl TransportHandle {
    /// Serialize and enqueue an envelope.
    ///
    /// Waits only when the outbound queue is full.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Serialization`] if the envelope cannot be encoded
    /// - [`TransportError::FrameTooLarge`] if it exceeds the frame limit
    /// - [`TransportError::Closed`] once the transport has been closed
    pub async fn send(&self, envelope: &Envelope) -> TransportResult<()> {
        let frame = self.encode(envelope)?;
        self.tx.send(frame).await.map_err(|_| TransportError::Closed)
    }

    /// Enqueue an envelope without waiting, for callers outside async code.
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send), plus [`TransportError::QueueFull`] when the
    /// outbound queue has no room.
    pub fn try_send(&self, envelope: &Envelope) -> TransportResult<()> {
        let frame = self.encode(envelope)?;
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    fn encode(&self, envelope: &Envelope) -> TransportResult<Bytes> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }
        let bytes = serde_json::to_vec(envelope).map_err(TransportError::Serialization)?;
        if bytes.len() > self.max_frame_bytes {
            return Err(TransportError::FrameTooLarge {
                size: bytes.len(),
                limit: self.max_frame_bytes,
            });
        }
        trace!(kind = envelope.message.kind(), id = ?envelope.id, "enqueue frame");
        Ok(Bytes::from(bytes))
    }

    /// Stop the writer. Frames already queued are flushed on a best-effort
    /// basis, then the write half is shut down so the peer sees EOF.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Whether [`close`](Self::close) was called or the writer failed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once the transport is closed.
    pub async fn closed(&self) {
        self.shutdown.cancelled().await;
    }
}

/// Receiving side of a transport. Not cloneable; not restartable.
#[derive(Debug)]
pub struct TransportReader<R> {
    frames: FramedRead<R, EnvelopeCodec>,
}

impl<R> TransportReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Next envelope from the peer.
    ///
    /// Returns `None` once the stream reaches EOF. An `Err` means the stream
    /// is no longer usable and the caller should stop reading.
    pub async fn next(&mut self) -> Option<TransportResult<Envelope>> {
        self.frames.next().await
    }
}

async fn write_loop<W>(
    mut sink: FramedWrite<WriteHalf<W>, EnvelopeCodec>,
    mut rx: mpsc::Receiver<Bytes>,
    shutdown: CancellationToken,
) where
    W: AsyncWrite,
{
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = sink.send(frame).await {
                    warn!(error = %e, "transport write failed");
                    shutdown.cancel();
                    return;
                }
            }
        }
    }

    shutdown.cancel();
    rx.close();

    let drain = async {
        while let Ok(frame) = rx.try_recv() {
            sink.feed(frame).await?;
        }
        sink.close().await
    };
    match tokio::time::timeout(DRAIN_TIMEOUT, drain).await {
        Ok(Ok(())) => debug!("transport writer closed"),
        Ok(Err(e)) => debug!(error = %e, "transport writer closed with error"),
        Err(_) => debug!("transport writer drain timed out"),
    }
}
