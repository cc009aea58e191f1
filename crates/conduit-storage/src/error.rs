//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Namespace or table name is empty or contains forbidden characters.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// The table was never created in this namespace.
    #[error("table '{table}' does not exist in namespace '{namespace}'")]
    TableNotFound {
        /// Namespace searched.
        namespace: String,
        /// Missing table.
        table: String,
    },

    /// An inserted row carries an `id` that is already taken.
    #[error("row with id {0} already exists")]
    DuplicateId(serde_json::Value),

    /// Internal storage error.
    #[error("internal storage error: {0}")]
    Internal(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
