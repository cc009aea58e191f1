//! Conduit Storage - namespaced row storage for plugins.
//!
//! The host forwards every `storage_request` to a [`PluginStorage`]
//! backend, scoped to the requesting plugin's namespace, and relays the
//! rows back. [`MemoryStorage`] is the default backend.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod memory;

pub use conduit_core::{Row, StorageOperation};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStorage;

use async_trait::async_trait;

/// Storage backend consumed by the host.
#[async_trait]
pub trait PluginStorage: Send + Sync {
    /// Run `operation` inside `namespace` and return the affected rows.
    ///
    /// - `create_table` returns no rows
    /// - `insert` returns the stored row, including its assigned `id`
    /// - `update` and `delete` return the rows as they were after / before
    ///   the change
    /// - `query` returns matching rows in insertion order
    async fn execute(&self, namespace: &str, operation: StorageOperation)
    -> StorageResult<Vec<Row>>;
}
