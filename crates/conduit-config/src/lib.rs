//! Conduit Config - host configuration and the plugin config store.
//!
//! Two unrelated stores live here:
//!
//! - [`Config`]: the daemon's own settings, loaded in layers (embedded
//!   defaults, `~/.conduit/config.toml`, an explicit file, then `CONDUIT_*`
//!   environment fallbacks) and validated.
//! - [`PluginConfigStore`]: per-plugin key/value settings declared through
//!   `config_schema` messages, with change notification.
//!
//! # Example
//!
//! ```rust,no_run
//! let config = conduit_config::load(None, None).unwrap();
//! println!("listening on {}", config.server.socket_path().display());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod env;
mod error;
mod loader;
mod plugin;
mod types;
mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load, load_file, load_with_env};
pub use plugin::{ConfigChange, ConfigWatcher, MemoryConfigStore, PluginConfigStore, WatchId};
pub use types::{
    Config, DEFAULT_SOCKET_NAME, LlmSection, LoggingSection, ProviderSection, ServerSection,
    TimeoutsSection,
};
pub use validate::validate;
