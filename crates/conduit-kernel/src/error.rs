//! Kernel error types.

use std::io;
use std::time::Duration;

use conduit_config::ConfigError;
use conduit_core::{ErrorCode, Message};
use conduit_events::EventError;
use conduit_ipc::TransportError;
use conduit_llm::LlmError;
use conduit_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the plugin host.
///
/// Every variant maps onto a wire [`ErrorCode`] through [`code`](Self::code),
/// so a failure can always be reported back to the plugin that caused it.
#[derive(Debug, Error)]
pub enum KernelError {
    /// The peer broke the protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// An operation exceeded its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// What timed out, e.g. `skill 'mqtt_publish'`.
        operation: String,
        /// The deadline that elapsed.
        after: Duration,
    },

    /// The session closed while a call was in flight.
    #[error("session closed")]
    SessionClosed,

    /// No skill with this name is registered.
    #[error("unknown skill '{0}'")]
    UnknownSkill(String),

    /// The skill's owner is gone.
    #[error("owner of skill '{0}' is unavailable")]
    SkillOwnerUnavailable(String),

    /// A live plugin already owns this skill name.
    #[error("skill '{name}' is already registered by '{owner}'")]
    DuplicateName {
        /// Skill name.
        name: String,
        /// Name of the plugin that owns it.
        owner: String,
    },

    /// The skill ran and reported a failure.
    #[error("skill '{name}' failed: {message}")]
    SkillFailed {
        /// Skill name.
        name: String,
        /// Failure reported by the plugin.
        message: String,
    },

    /// The request was well-formed but its content was rejected.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A storage, config, chat or LLM backend failed.
    #[error("downstream error: {0}")]
    Downstream(String),

    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// I/O failure, e.g. binding the socket.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl KernelError {
    /// The wire code reported to plugins.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ProtocolViolation(_) => ErrorCode::ProtocolViolation,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::SessionClosed | Self::Transport(_) => ErrorCode::SessionClosed,
            Self::UnknownSkill(_) => ErrorCode::UnknownSkill,
            Self::SkillOwnerUnavailable(_) => ErrorCode::SkillOwnerUnavailable,
            Self::DuplicateName { .. } => ErrorCode::DuplicateName,
            Self::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Self::SkillFailed { .. } | Self::Downstream(_) | Self::Io(_) => {
                ErrorCode::DownstreamError
            },
        }
    }

    /// Render as an `error` message.
    #[must_use]
    pub fn to_message(&self) -> Message {
        Message::error(self.code(), self.to_string())
    }
}

impl From<StorageError> for KernelError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidName(_)
            | StorageError::TableNotFound { .. }
            | StorageError::DuplicateId(_) => Self::InvalidRequest(e.to_string()),
            StorageError::Internal(_) => Self::Downstream(e.to_string()),
        }
    }
}

impl From<ConfigError> for KernelError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::InvalidSchema { .. }
            | ConfigError::UnknownNamespace(_)
            | ConfigError::UnknownKey { .. }
            | ConfigError::TypeMismatch { .. } => Self::InvalidRequest(e.to_string()),
            _ => Self::Downstream(e.to_string()),
        }
    }
}

impl From<LlmError> for KernelError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::UnknownProvider(_) => Self::InvalidRequest(e.to_string()),
            _ => Self::Downstream(e.to_string()),
        }
    }
}

impl From<EventError> for KernelError {
    fn from(e: EventError) -> Self {
        Self::InvalidRequest(e.to_string())
    }
}

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;
