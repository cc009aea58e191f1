//! Transport and call errors.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the framed transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The writer is gone; nothing more can be sent.
    #[error("transport closed")]
    Closed,

    /// The outbound queue is full because the peer is not reading.
    #[error("outbound queue full")]
    QueueFull,

    /// An outbound envelope could not be encoded.
    #[error("failed to serialize envelope: {0}")]
    Serialization(#[source] serde_json::Error),

    /// An inbound frame did not contain a valid envelope.
    #[error("failed to decode envelope: {0}")]
    Decode(#[source] serde_json::Error),

    /// A frame exceeded the configured size limit.
    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge {
        /// Size of the offending frame, when known.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Underlying stream failure.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Whether the error means the peer sent something malformed.
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::FrameTooLarge { .. })
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Why a correlated call did not produce a response.
#[derive(Debug, Error)]
pub enum CallError {
    /// No response arrived before the deadline.
    #[error("call timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// The session closed while the call was pending.
    #[error("session closed")]
    SessionClosed,

    /// The request could not be sent.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
