//! Conduit Test - shared test utilities for the Conduit plugin host.
//!
//! This crate provides mock implementations and test helpers used across
//! the Conduit crates as a dev-dependency.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! conduit-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use conduit_test::{MockLlmProvider, MockLlmTurn, MockToolCall};
//! use serde_json::json;
//!
//! let provider = MockLlmProvider::new(vec![
//!     MockLlmTurn::tool_calls(vec![MockToolCall::new("mqtt_publish", json!({"topic": "a"}))]),
//!     MockLlmTurn::text("Done."),
//! ]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod events;
pub mod fixtures;
pub mod harness;
pub mod mock_llm;

pub use events::*;
pub use fixtures::*;
pub use harness::*;
pub use mock_llm::*;
