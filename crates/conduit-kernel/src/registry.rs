//! Live plugin sessions.

use std::collections::HashMap;
use std::sync::Arc;

use conduit_core::SessionId;
use tokio::sync::RwLock;

use crate::session::PluginSession;

/// Registered plugin sessions keyed by id.
///
/// Only sessions that completed the handshake are inserted; they are
/// removed during disconnect cleanup.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<PluginSession>>>,
}

impl PluginRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a session.
    pub async fn insert(&self, session: Arc<PluginSession>) {
        self.sessions.write().await.insert(session.id(), session);
    }

    /// Stop tracking a session.
    pub async fn remove(&self, id: SessionId) -> Option<Arc<PluginSession>> {
        self.sessions.write().await.remove(&id)
    }

    /// Look up a session.
    pub async fn get(&self, id: SessionId) -> Option<Arc<PluginSession>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Find a live session by plugin name.
    pub async fn find_by_name(&self, name: &str) -> Option<Arc<PluginSession>> {
        self.sessions
            .read()
            .await
            .values()
            .find(|s| s.is_live() && s.name() == name)
            .cloned()
    }

    /// Whether `id` is tracked and live.
    pub async fn is_live(&self, id: SessionId) -> bool {
        self.sessions
            .read()
            .await
            .get(&id)
            .is_some_and(|s| s.is_live())
    }

    /// Every tracked session.
    pub async fn all(&self) -> Vec<Arc<PluginSession>> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Number of tracked sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is tracked.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
