//! Prelude module - commonly used types for convenient import.
//!
//! Use `use conduit_config::prelude::*;` to import all essential types.

pub use crate::{
    Config, ConfigError, ConfigResult, MemoryConfigStore, PluginConfigStore, WatchId, load,
};
