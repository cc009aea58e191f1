//! SDK error types.

use std::io;

use conduit_core::ErrorCode;
use conduit_ipc::{CallError, TransportError};
use thiserror::Error;

/// Errors returned by [`PluginClient`](crate::PluginClient).
#[derive(Debug, Error)]
pub enum SdkError {
    /// Could not reach the host.
    #[error("connection failed: {0}")]
    Connect(#[from] io::Error),

    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request got no answer.
    #[error(transparent)]
    Call(#[from] CallError),

    /// The host answered with an `error` message.
    #[error("host rejected request ({code}): {message}")]
    Host {
        /// Wire error code.
        code: ErrorCode,
        /// Detail from the host.
        message: String,
    },

    /// The host answered with an unrelated message kind.
    #[error("expected {expected}, got {got}")]
    UnexpectedReply {
        /// Kind the request expects.
        expected: &'static str,
        /// Kind that arrived.
        got: &'static str,
    },

    /// Event payloads must be JSON objects.
    #[error("event payload must be a JSON object")]
    InvalidPayload,
}

impl SdkError {
    /// The host's error code, for [`SdkError::Host`].
    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Host { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result type for SDK operations.
pub type SdkResult<T> = Result<T, SdkError>;
