//! Event subscriptions on the plugin side.

use std::collections::BTreeMap;

use conduit_core::{Event, SubscriptionId};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Events buffered per subscription before new ones are dropped.
pub const SUBSCRIPTION_BUFFER: usize = 256;

/// Dispatches kept for a subscription whose `subscribed` reply has not
/// been processed yet.
const PENDING_EVENTS: usize = 32;

/// Unknown subscription ids tracked at once.
const PENDING_IDS: usize = 16;

/// A live subscription. Receives every matching event in dispatch order.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    events: mpsc::Receiver<Event>,
}

impl Subscription {
    /// Subscription id assigned by the host.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next event. `None` once the connection closed.
    pub async fn recv(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Next event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.events.try_recv().ok()
    }
}

#[derive(Debug)]
enum Slot {
    /// Dispatches that arrived before the subscriber was attached.
    Pending(Vec<Event>),
    Active(mpsc::Sender<Event>),
}

/// Routes `event_dispatch` pushes to [`Subscription`]s.
///
/// The host may dispatch an event for a new subscription before its
/// `subscribed` reply is read, so unknown ids are buffered briefly.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionTable {
    slots: BTreeMap<SubscriptionId, Slot>,
}

impl SubscriptionTable {
    pub(crate) fn dispatch(&mut self, id: SubscriptionId, event: Event) {
        match self.slots.get_mut(&id) {
            Some(Slot::Active(tx)) => {
                if let Err(e) = tx.try_send(event) {
                    warn!(subscription_id = %id, error = %e, "subscriber lagging, event dropped");
                }
            },
            Some(Slot::Pending(buffer)) => {
                if buffer.len() < PENDING_EVENTS {
                    buffer.push(event);
                }
            },
            None => {
                let pending = self
                    .slots
                    .values()
                    .filter(|s| matches!(s, Slot::Pending(_)))
                    .count();
                if pending >= PENDING_IDS {
                    let oldest = self
                        .slots
                        .iter()
                        .find(|(_, s)| matches!(s, Slot::Pending(_)))
                        .map(|(id, _)| *id);
                    if let Some(oldest) = oldest {
                        self.slots.remove(&oldest);
                    }
                }
                debug!(subscription_id = %id, "dispatch for unknown subscription buffered");
                self.slots.insert(id, Slot::Pending(vec![event]));
            },
        }
    }

    pub(crate) fn attach(&mut self, id: SubscriptionId) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        if let Some(Slot::Pending(early)) = self.slots.remove(&id) {
            for event in early {
                let _ = tx.try_send(event);
            }
        }
        self.slots.insert(id, Slot::Active(tx));
        Subscription { id, events: rx }
    }

    pub(crate) fn detach(&mut self, id: SubscriptionId) -> bool {
        self.slots.remove(&id).is_some()
    }

    /// Drop every sender so receivers observe the close.
    pub(crate) fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn event(n: u64) -> Event {
        Event::from_value("chat.message.received", json!({"n": n}))
    }

    #[test]
    fn test_early_dispatch_is_kept() {
        let mut table = SubscriptionTable::default();
        table.dispatch(SubscriptionId(3), event(1));
        table.dispatch(SubscriptionId(3), event(2));

        let mut sub = table.attach(SubscriptionId(3));
        table.dispatch(SubscriptionId(3), event(3));

        let seen: Vec<Value> = std::iter::from_fn(|| sub.try_recv())
            .map(|e| e.payload["n"].clone())
            .collect();
        assert_eq!(seen, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn test_unknown_ids_are_bounded() {
        let mut table = SubscriptionTable::default();
        for id in 0..40 {
            table.dispatch(SubscriptionId(id), event(id));
        }
        assert_eq!(table.slots.len(), PENDING_IDS);
        // Oldest ids were evicted first.
        assert!(!table.slots.contains_key(&SubscriptionId(0)));
        assert!(table.slots.contains_key(&SubscriptionId(39)));
    }

    #[test]
    fn test_detach_and_clear() {
        let mut table = SubscriptionTable::default();
        let mut sub = table.attach(SubscriptionId(1));
        assert!(table.detach(SubscriptionId(1)));
        assert!(!table.detach(SubscriptionId(1)));
        assert!(sub.try_recv().is_none());

        let _other = table.attach(SubscriptionId(2));
        table.clear();
        assert!(table.slots.is_empty());
    }
}
