//! Prelude module - commonly used types for convenient import.
//!
//! Use `use conduit_storage::prelude::*;` to import all essential types.

pub use crate::{MemoryStorage, PluginStorage, Row, StorageError, StorageOperation, StorageResult};
