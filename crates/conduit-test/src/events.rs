//! Event bus helpers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use conduit_core::Event;
use conduit_events::EventHandler;
use tokio::sync::Notify;

/// Handler that records every event it receives.
///
/// Clones share the same record, so keep one clone and subscribe another.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    events: Arc<Mutex<Vec<Arc<Event>>>>,
    notify: Arc<Notify>,
}

impl RecordingHandler {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far, in arrival order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn events(&self) -> Vec<Arc<Event>> {
        self.events.lock().expect("lock poisoned").clone()
    }

    /// Types of the events received so far.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    /// Number of events received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events().len()
    }

    /// Whether nothing was received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `count` events arrived. Returns `false` on
    /// timeout.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: Arc<Event>) {
        self.events.lock().expect("lock poisoned").push(event);
        self.notify.notify_waiters();
    }

    fn name(&self) -> &str {
        "recording"
    }
}
