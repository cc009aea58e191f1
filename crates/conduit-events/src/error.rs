use thiserror::Error;

/// Event bus errors.
#[derive(Debug, Error)]
pub enum EventError {
    /// A subscription pattern is empty or has an empty segment.
    #[error("invalid event pattern '{0}'")]
    InvalidPattern(String),

    /// A subscription was requested with no patterns.
    #[error("subscription requires at least one pattern")]
    NoPatterns,

    /// A plugin sink could not deliver the event.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Result type for event bus operations.
pub type EventResult<T> = Result<T, EventError>;
