//! Error types for protocol-level validation.

use thiserror::Error;

/// Errors raised while validating protocol payloads.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A skill declaration is malformed.
    #[error("invalid skill '{name}': {reason}")]
    InvalidSkill {
        /// Skill name as declared.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A config schema declaration is malformed.
    #[error("invalid config schema: {0}")]
    InvalidSchema(String),

    /// A subscription pattern is malformed.
    #[error("invalid event pattern '{0}'")]
    InvalidPattern(String),
}

/// Result type for core validation.
pub type CoreResult<T> = Result<T, CoreError>;
