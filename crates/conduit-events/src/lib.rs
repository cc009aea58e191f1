//! Conduit Events - hierarchical wildcard pub/sub.
//!
//! This crate provides:
//! - [`matches`]: the dot-segmented pattern matcher
//! - [`EventBus`]: subscriptions keyed by [`SubscriptionId`] with concurrent
//!   fan-out on publish
//! - Subscription targets for in-process handlers and plugin sessions
//!
//! # Architecture
//!
//! A subscription pairs a set of patterns with a [`SubscriptionTarget`].
//! `publish` snapshots the subscriptions whose patterns match, then spawns
//! one task per delivery and returns. A slow or panicking handler only
//! affects its own task.
//!
//! # Example
//!
//! ```rust
//! use conduit_events::{EventBus, FnHandler, SubscriptionTarget};
//! use conduit_core::Event;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new();
//! let target = SubscriptionTarget::handler(FnHandler::new("printer", |event| {
//!     println!("got {}", event.event_type);
//! }));
//! bus.subscribe(vec!["chat.message.*".into()], target).unwrap();
//!
//! let delivered = bus.publish(Event::from_value("chat.message.received", json!({"text": "hi"})));
//! assert_eq!(delivered, 1);
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod bus;
mod error;
mod pattern;
mod subscriber;

pub use bus::EventBus;
pub use conduit_core::{Event, EventMetadata, SubscriptionId};
pub use error::{EventError, EventResult};
pub use pattern::{matches, validate_pattern};
pub use subscriber::{EventHandler, EventSink, FnHandler, Subscription, SubscriptionTarget};
