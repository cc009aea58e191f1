//! Subscription targets.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::{Event, SessionId, SubscriptionId};

use crate::error::EventResult;
use crate::pattern::matches;

/// In-process event handler.
///
/// Each delivery runs on its own task, so a handler may take as long as it
/// likes without delaying the publisher or other subscribers.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one event.
    async fn handle(&self, event: Arc<Event>);

    /// Name used in logs.
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// Outbound path to a subscribed plugin.
///
/// The host implements this over the plugin's transport; delivery is
/// fire-and-forget, so an error is only logged.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Push `event` to the plugin as a dispatch for `subscription`.
    async fn deliver(&self, subscription: SubscriptionId, event: Arc<Event>) -> EventResult<()>;
}

/// Handler wrapping a synchronous closure.
pub struct FnHandler<F> {
    name: String,
    handler: F,
}

impl<F> FnHandler<F>
where
    F: Fn(Arc<Event>) + Send + Sync + 'static,
{
    /// Wrap `handler` under `name`.
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(Arc<Event>) + Send + Sync + 'static,
{
    async fn handle(&self, event: Arc<Event>) {
        (self.handler)(event);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Where matching events go.
#[derive(Clone)]
pub enum SubscriptionTarget {
    /// An in-process handler.
    Handler(Arc<dyn EventHandler>),
    /// A connected plugin.
    Plugin {
        /// Owning session; used to purge subscriptions on disconnect.
        session_id: SessionId,
        /// Outbound path to the plugin.
        sink: Arc<dyn EventSink>,
    },
}

impl SubscriptionTarget {
    /// Target an in-process handler.
    pub fn handler(handler: impl EventHandler + 'static) -> Self {
        Self::Handler(Arc::new(handler))
    }

    /// Target a plugin session.
    pub fn plugin(session_id: SessionId, sink: Arc<dyn EventSink>) -> Self {
        Self::Plugin { session_id, sink }
    }

    /// The owning session, for plugin targets.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Self::Handler(_) => None,
            Self::Plugin { session_id, .. } => Some(*session_id),
        }
    }
}

impl fmt::Debug for SubscriptionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler(handler) => f.debug_tuple("Handler").field(&handler.name()).finish(),
            Self::Plugin { session_id, .. } => f
                .debug_struct("Plugin")
                .field("session_id", session_id)
                .finish_non_exhaustive(),
        }
    }
}

/// One registered subscription.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Unique id.
    pub id: SubscriptionId,
    /// Patterns; an event matching any of them is delivered once.
    pub patterns: Vec<String>,
    /// Delivery target.
    pub target: SubscriptionTarget,
}

impl Subscription {
    /// Whether any pattern matches `event_type`.
    #[must_use]
    pub fn matches(&self, event_type: &str) -> bool {
        self.patterns.iter().any(|p| matches(p, event_type))
    }
}
