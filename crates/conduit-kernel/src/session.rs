//! One connected plugin.

use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Duration;

use conduit_config::WatchId;
use conduit_core::{Message, RegisterRequest, SessionId};
use conduit_ipc::{CallError, Correlator, TransportHandle};

/// Lifecycle of a plugin session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, handshake not finished.
    Connecting,
    /// Handshake accepted; requests are served.
    Registered,
    /// Gone. Terminal.
    Disconnected,
}

/// A plugin connection and everything the host tracks for it.
///
/// The state only moves forward: `Connecting -> Registered -> Disconnected`,
/// or straight from `Connecting` to `Disconnected`.
#[derive(Debug)]
pub struct PluginSession {
    id: SessionId,
    identity: OnceLock<RegisterRequest>,
    state: Mutex<SessionState>,
    correlator: Correlator,
    config_watch: Mutex<Option<WatchId>>,
}

impl PluginSession {
    /// A new session in the `Connecting` state.
    #[must_use]
    pub fn new(transport: TransportHandle) -> Self {
        Self {
            id: SessionId::new(),
            identity: OnceLock::new(),
            state: Mutex::new(SessionState::Connecting),
            correlator: Correlator::new(transport),
            config_watch: Mutex::new(None),
        }
    }

    /// Session id.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the session is registered and not yet disconnected.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state() == SessionState::Registered
    }

    /// Complete the handshake. Returns `false` unless the session was
    /// still `Connecting`.
    pub fn promote(&self, request: RegisterRequest) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != SessionState::Connecting || self.identity.set(request).is_err() {
            return false;
        }
        *state = SessionState::Registered;
        true
    }

    /// Move to `Disconnected`. Returns `true` only for the first call.
    pub fn mark_disconnected(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == SessionState::Disconnected {
            return false;
        }
        *state = SessionState::Disconnected;
        true
    }

    /// Registered plugin name; empty before the handshake.
    #[must_use]
    pub fn name(&self) -> &str {
        self.identity.get().map_or("", |r| r.name.as_str())
    }

    /// Registered plugin version; empty before the handshake.
    #[must_use]
    pub fn version(&self) -> &str {
        self.identity.get().map_or("", |r| r.version.as_str())
    }

    /// Send a request to the plugin and wait for its answer.
    ///
    /// # Errors
    ///
    /// See [`Correlator::call`].
    pub async fn call(&self, message: Message, timeout: Duration) -> Result<Message, CallError> {
        self.correlator.call(message, timeout).await
    }

    /// The request correlator.
    #[must_use]
    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    /// Outbound transport.
    #[must_use]
    pub fn transport(&self) -> &TransportHandle {
        self.correlator.transport()
    }

    /// Record the config watcher installed for this session. Returns
    /// `false` if one was already installed.
    pub fn set_config_watch(&self, id: WatchId) -> bool {
        let mut slot = self
            .config_watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(id);
        true
    }

    /// Whether a config watcher is installed.
    #[must_use]
    pub fn has_config_watch(&self) -> bool {
        self.config_watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Take the config watcher for removal.
    pub fn take_config_watch(&self) -> Option<WatchId> {
        self.config_watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
