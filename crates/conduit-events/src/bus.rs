//! The event bus.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use conduit_core::{Event, SessionId, SubscriptionId};
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

use crate::error::{EventError, EventResult};
use crate::pattern::validate_pattern;
use crate::subscriber::{Subscription, SubscriptionTarget};

/// Subscription registry with pattern-matched fan-out.
///
/// The subscription map is never locked across an await: `publish` copies
/// the matching targets out and releases the lock before spawning.
pub struct EventBus {
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscription_count", &self.subscription_count())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `target` for events matching any of `patterns`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::NoPatterns`] for an empty list and
    /// [`EventError::InvalidPattern`] for a malformed pattern.
    pub fn subscribe(
        &self,
        patterns: Vec<String>,
        target: SubscriptionTarget,
    ) -> EventResult<SubscriptionId> {
        if patterns.is_empty() {
            return Err(EventError::NoPatterns);
        }
        for pattern in &patterns {
            validate_pattern(pattern)?;
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(subscription_id = %id, ?patterns, target = ?target, "subscribed");

        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Subscription {
                    id,
                    patterns,
                    target,
                },
            );
        Ok(id)
    }

    /// Remove a subscription. Returns `true` if it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if removed {
            debug!(subscription_id = %id, "unsubscribed");
        }
        removed
    }

    /// Remove a subscription only if it targets `session_id`.
    ///
    /// Plugins may only drop their own subscriptions.
    pub fn unsubscribe_owned(&self, id: SubscriptionId, session_id: SessionId) -> bool {
        let mut subs = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let owned = subs
            .get(&id)
            .is_some_and(|s| s.target.session_id() == Some(session_id));
        if owned {
            subs.remove(&id);
            debug!(subscription_id = %id, %session_id, "unsubscribed");
        }
        owned
    }

    /// Remove every subscription targeting `session_id`. Returns how many
    /// were removed.
    pub fn unsubscribe_session(&self, session_id: SessionId) -> usize {
        let mut subs = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|_, s| s.target.session_id() != Some(session_id));
        let removed = before.saturating_sub(subs.len());
        if removed > 0 {
            debug!(%session_id, removed, "removed session subscriptions");
        }
        removed
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .read()
            .map(|s| s.len())
            .unwrap_or_default()
    }

    /// Patterns of one subscription, if it exists.
    #[must_use]
    pub fn patterns(&self, id: SubscriptionId) -> Option<Vec<String>> {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|s| s.patterns.clone())
    }

    /// Deliver `event` to every matching subscription.
    ///
    /// Each delivery is spawned as its own task; this returns as soon as they
    /// are spawned. Returns the number of deliveries started, which is zero
    /// when nothing matches or when called outside a Tokio runtime.
    pub fn publish(&self, event: Event) -> usize {
        let targets: Vec<(SubscriptionId, SubscriptionTarget)> = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|s| s.matches(&event.event_type))
            .map(|s| (s.id, s.target.clone()))
            .collect();

        if targets.is_empty() {
            trace!(event_type = %event.event_type, "no subscribers");
            return 0;
        }

        let Ok(runtime) = Handle::try_current() else {
            warn!(event_type = %event.event_type, "publish outside a runtime, event dropped");
            return 0;
        };

        let count = targets.len();
        let event = Arc::new(event);
        for (id, target) in targets {
            let event = Arc::clone(&event);
            runtime.spawn(deliver(id, target, event));
        }
        trace!(event_type = %event.event_type, deliveries = count, "published");
        count
    }
}

async fn deliver(id: SubscriptionId, target: SubscriptionTarget, event: Arc<Event>) {
    match target {
        SubscriptionTarget::Handler(handler) => handler.handle(event).await,
        SubscriptionTarget::Plugin { session_id, sink } => {
            if let Err(e) = sink.deliver(id, event).await {
                debug!(subscription_id = %id, %session_id, error = %e, "plugin delivery failed");
            }
        },
    }
}
