//! Prelude module - commonly used types for convenient import.
//!
//! Use `use conduit_events::prelude::*;` to import all essential types.

pub use crate::{
    Event, EventBus, EventError, EventHandler, EventResult, EventSink, FnHandler, Subscription,
    SubscriptionId, SubscriptionTarget, matches,
};
