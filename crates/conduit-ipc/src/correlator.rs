//! Pending-call correlation.
//!
//! A [`Correlator`] pairs outbound requests with the responses that echo
//! their correlation id. Each call owns a single-use slot in a concurrent map;
//! whichever of response, deadline or close comes first settles it, and the
//! slot is removed so nothing can settle it twice.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use conduit_core::{CorrelationId, Envelope, Message};
use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::CallError;
use crate::transport::TransportHandle;

type Slot = oneshot::Sender<Result<Message, CallError>>;

/// Request/response correlator bound to one transport.
#[derive(Debug)]
pub struct Correlator {
    transport: TransportHandle,
    pending: DashMap<CorrelationId, Slot>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl Correlator {
    /// Create a correlator that sends through `transport`.
    #[must_use]
    pub fn new(transport: TransportHandle) -> Self {
        Self {
            transport,
            pending: DashMap::new(),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// The transport requests are sent on.
    #[must_use]
    pub fn transport(&self) -> &TransportHandle {
        &self.transport
    }

    /// Send `message` and wait for the response carrying the same id.
    ///
    /// The slot is released on every exit path, including when the caller
    /// drops this future, so a late response is always discarded.
    ///
    /// # Errors
    ///
    /// - [`CallError::Timeout`] if no response arrives within `timeout`
    /// - [`CallError::SessionClosed`] if the correlator is or becomes closed
    /// - [`CallError::Transport`] if the request cannot be sent
    pub async fn call(&self, message: Message, timeout: Duration) -> Result<Message, CallError> {
        if self.is_closed() {
            return Err(CallError::SessionClosed);
        }

        let id = CorrelationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        let _slot = SlotGuard {
            pending: &self.pending,
            id,
        };

        // close() may have drained the map between the check above and the insert.
        if self.is_closed() {
            return Err(CallError::SessionClosed);
        }

        // The deadline covers the enqueue as well as the response.
        let kind = message.kind();
        let exchange = async {
            self.transport.send(&Envelope::with_id(id, message)).await?;
            debug!(correlation_id = %id, kind, "call sent");
            rx.await.map_err(|_| CallError::SessionClosed)?
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                debug!(correlation_id = %id, kind, "call timed out");
                Err(CallError::Timeout(timeout))
            },
        }
    }

    /// Settle the pending call `id` with `message`.
    ///
    /// Returns `false` when no call is waiting on that id: it already timed
    /// out, was already answered, or never existed. Such responses are
    /// dropped.
    pub fn resolve(&self, id: CorrelationId, message: Message) -> bool {
        let Some((_, slot)) = self.pending.remove(&id) else {
            warn!(
                correlation_id = %id,
                kind = message.kind(),
                "dropping response for unknown or expired call"
            );
            return false;
        };
        if slot.send(Ok(message)).is_err() {
            debug!(correlation_id = %id, "caller stopped waiting before response arrived");
            return false;
        }
        true
    }

    /// Fail every pending call with [`CallError::SessionClosed`] and reject
    /// future calls.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);

        let ids: Vec<CorrelationId> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut failed: usize = 0;
        for id in ids {
            if let Some((_, slot)) = self.pending.remove(&id) {
                let _ = slot.send(Err(CallError::SessionClosed));
                failed = failed.saturating_add(1);
            }
        }
        if failed > 0 {
            debug!(failed, "failed pending calls on close");
        }
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of calls currently awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Removes a call's slot when the call finishes, whatever the outcome.
struct SlotGuard<'a> {
    pending: &'a DashMap<CorrelationId, Slot>,
    id: CorrelationId,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}
