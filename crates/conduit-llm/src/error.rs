//! LLM-related error types.

use thiserror::Error;

/// Errors that can occur with LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// A remote endpoint needs a key and none is configured.
    #[error("API key not configured for {provider}")]
    ApiKeyNotConfigured {
        /// Provider name.
        provider: String,
    },

    /// The request could not be built or sent.
    #[error("API request failed: {0}")]
    ApiRequestFailed(String),

    /// The endpoint answered with an error status or an unusable body.
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// No provider with this name is configured.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for LLM operations.
pub type LlmResult<T> = Result<T, LlmError>;
