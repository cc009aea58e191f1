//! Conduit Telemetry - logging setup for the Conduit host.
//!
//! Wraps `tracing-subscriber` so the daemon can turn its `[logging]` config
//! section into an installed global subscriber with one call.
//!
//! # Example
//!
//! ```rust,no_run
//! use conduit_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), conduit_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("conduit_ipc=trace");
//!
//! setup_logging(&config)?;
//! tracing::info!("host starting");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{FileRotation, LogConfig, LogFormat, LogTarget, setup_logging};
