//! Conduit Kernel - the plugin host.
//!
//! This crate provides:
//! - [`ConnectionManager`]: registration handshake, per-envelope routing and
//!   disconnect cleanup for each plugin connection
//! - [`PluginRegistry`]: the live sessions
//! - [`SkillRegistry`]: skill ownership and correlated invocation
//! - [`ChatService`]: chat persistence and the LLM function-calling loop
//! - [`Kernel`]: wires the above to an [`EventBus`], listens on a Unix
//!   socket and shuts everything down on request
//!
//! # Example
//!
//! ```rust,no_run
//! use conduit_kernel::{Kernel, KernelSettings};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), conduit_kernel::KernelError> {
//! let kernel = Kernel::new(KernelSettings::default().with_socket_path("/tmp/conduit.sock"));
//! kernel.listen_default()?;
//! // ... serve until asked to stop ...
//! kernel.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod chat;
mod connection;
mod error;
mod registry;
mod session;
mod settings;
mod skills;

pub use chat::{ChatService, ChatStore, MemoryChatStore, providers_from_config};
pub use connection::{Collaborators, ConnectionManager, PLUGIN_DISCONNECTED, PLUGIN_REGISTERED};
pub use error::{KernelError, KernelResult};
pub use registry::PluginRegistry;
pub use session::{PluginSession, SessionState};
pub use settings::KernelSettings;
pub use skills::{SkillDefinition, SkillRegistry};

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use conduit_config::{Config, MemoryConfigStore, PluginConfigStore};
use conduit_events::EventBus;
use conduit_llm::LlmProvider;
use conduit_storage::{MemoryStorage, PluginStorage};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Builder for a [`Kernel`] with non-default collaborators.
#[must_use]
pub struct KernelBuilder {
    settings: KernelSettings,
    storage: Option<Arc<dyn PluginStorage>>,
    plugin_config: Option<Arc<dyn PluginConfigStore>>,
    chat_store: Option<Arc<dyn ChatStore>>,
    providers: Vec<Arc<dyn LlmProvider>>,
    default_provider: Option<String>,
}

impl KernelBuilder {
    /// Use `storage` for `storage_request` messages.
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn PluginStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Use `store` for plugin config.
    #[must_use]
    pub fn with_config_store(mut self, store: Arc<dyn PluginConfigStore>) -> Self {
        self.plugin_config = Some(store);
        self
    }

    /// Use `store` for chat history.
    #[must_use]
    pub fn with_chat_store(mut self, store: Arc<dyn ChatStore>) -> Self {
        self.chat_store = Some(store);
        self
    }

    /// Add an LLM provider. The first one added is the default.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Choose the default provider by name.
    #[must_use]
    pub fn with_default_provider(mut self, name: impl Into<String>) -> Self {
        self.default_provider = Some(name.into());
        self
    }

    /// Assemble the kernel.
    #[must_use]
    pub fn build(self) -> Kernel {
        let bus = Arc::new(EventBus::new());
        let sessions = Arc::new(PluginRegistry::new());
        let skills = Arc::new(SkillRegistry::new(Arc::clone(&sessions)));

        let chat_store = self
            .chat_store
            .unwrap_or_else(|| Arc::new(MemoryChatStore::new()));
        let mut chat = ChatService::new(chat_store, Arc::clone(&skills), self.settings.clone());
        for provider in self.providers {
            chat = chat.with_provider(provider);
        }
        if let Some(name) = self.default_provider {
            chat = chat.with_default_provider(name);
        }

        let collaborators = Collaborators {
            storage: self
                .storage
                .unwrap_or_else(|| Arc::new(MemoryStorage::new())),
            plugin_config: self
                .plugin_config
                .unwrap_or_else(|| Arc::new(MemoryConfigStore::new())),
            chat: Arc::new(chat),
        };

        let shutdown = CancellationToken::new();
        let manager = Arc::new(ConnectionManager::new(
            self.settings.clone(),
            Arc::clone(&sessions),
            Arc::clone(&skills),
            Arc::clone(&bus),
            collaborators,
            shutdown.clone(),
        ));

        Kernel {
            settings: self.settings,
            bus,
            sessions,
            skills,
            manager,
            shutdown,
            listener: Mutex::new(None),
        }
    }
}

struct Listening {
    path: PathBuf,
    task: JoinHandle<()>,
}

/// The plugin host.
///
/// Owns every registry; nothing is process-global, so several kernels can
/// run side by side (tests do).
pub struct Kernel {
    settings: KernelSettings,
    bus: Arc<EventBus>,
    sessions: Arc<PluginRegistry>,
    skills: Arc<SkillRegistry>,
    manager: Arc<ConnectionManager>,
    shutdown: CancellationToken,
    listener: Mutex<Option<Listening>>,
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("settings", &self.settings)
            .field("bus", &self.bus)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Kernel {
    /// A kernel with in-memory collaborators and no LLM provider.
    #[must_use]
    pub fn new(settings: KernelSettings) -> Self {
        Self::builder(settings).build()
    }

    /// Start configuring a kernel.
    #[must_use]
    pub fn builder(settings: KernelSettings) -> KernelBuilder {
        KernelBuilder {
            settings,
            storage: None,
            plugin_config: None,
            chat_store: None,
            providers: Vec::new(),
            default_provider: None,
        }
    }

    /// A builder seeded from the host configuration, providers included.
    #[must_use]
    pub fn builder_from_config(config: &Config) -> KernelBuilder {
        let mut builder = Self::builder(KernelSettings::from(config));
        for provider in providers_from_config(&config.llm) {
            builder = builder.with_provider(provider);
        }
        if let Some(name) = config.llm.default_provider_name() {
            builder = builder.with_default_provider(name);
        }
        builder
    }

    /// Settings in effect.
    #[must_use]
    pub fn settings(&self) -> &KernelSettings {
        &self.settings
    }

    /// The event bus. In-process handlers may subscribe and publish here.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Live plugin sessions.
    #[must_use]
    pub fn sessions(&self) -> &Arc<PluginRegistry> {
        &self.sessions
    }

    /// The skill table.
    #[must_use]
    pub fn skills(&self) -> &Arc<SkillRegistry> {
        &self.skills
    }

    /// The connection manager.
    #[must_use]
    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Serve a plugin over an already-connected stream.
    pub fn connect<S>(&self, stream: S) -> JoinHandle<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        tokio::spawn(Arc::clone(&self.manager).handle_connection(stream))
    }

    /// Listen on the configured socket path.
    ///
    /// # Errors
    ///
    /// See [`listen`](Self::listen).
    pub fn listen_default(&self) -> KernelResult<()> {
        let path = self.settings.socket_path.clone();
        self.listen(path)
    }

    /// Accept plugin connections on a Unix socket at `path`.
    ///
    /// A stale socket file is replaced and missing parent directories are
    /// created. Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Io`] if the kernel is already listening, has
    /// been shut down, or the socket cannot be bound.
    pub fn listen(&self, path: impl Into<PathBuf>) -> KernelResult<()> {
        let path = path.into();
        let mut slot = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            let e = io::Error::new(io::ErrorKind::AddrInUse, "kernel is already listening");
            return Err(e.into());
        }
        if self.shutdown.is_cancelled() {
            let e = io::Error::new(io::ErrorKind::NotConnected, "kernel is shut down");
            return Err(e.into());
        }

        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(&path)?;
        restrict_permissions(&path);
        info!(path = %path.display(), "listening for plugins");

        let task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.manager),
            self.shutdown.clone(),
        ));
        *slot = Some(Listening { path, task });
        Ok(())
    }

    /// Path of the listening socket, if any.
    #[must_use]
    pub fn socket_path(&self) -> Option<PathBuf> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|l| l.path.clone())
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop accepting, disconnect every plugin and remove the socket file.
    ///
    /// Every in-flight skill call fails with `SessionClosed`. Calling this
    /// more than once is harmless.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let listening = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(listening) = listening {
            if let Err(e) = listening.task.await {
                warn!(error = %e, "accept loop ended abnormally");
            }
            remove_socket(&listening.path);
        }

        let sessions = self.sessions.all().await;
        let count = sessions.len();
        for session in sessions {
            self.manager.disconnect(&session).await;
        }
        info!(sessions = count, "kernel stopped");
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn accept_loop(
    listener: UnixListener,
    manager: Arc<ConnectionManager>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    tokio::spawn(Arc::clone(&manager).handle_connection(stream));
                },
                Err(e) => warn!(error = %e, "failed to accept plugin connection"),
            },
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        warn!(path = %path.display(), error = %e, "could not restrict socket permissions");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

fn remove_socket(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {},
        Err(e) if e.kind() == io::ErrorKind::NotFound => {},
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove socket file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_test::{RawPlugin, socket_path_in, test_dir};
    use tokio::net::UnixStream;

    #[tokio::test]
    async fn test_listen_and_shutdown() {
        let dir = test_dir();
        let path = socket_path_in(&dir);
        let kernel = Kernel::new(KernelSettings::default().with_socket_path(&path));

        kernel.listen_default().unwrap();
        assert_eq!(kernel.socket_path(), Some(path.clone()));
        assert!(matches!(kernel.listen(&path), Err(KernelError::Io(_))));

        let stream = UnixStream::connect(&path).await.unwrap();
        let mut plugin = RawPlugin::new(stream);
        plugin.register("mqtt").await;
        assert_eq!(kernel.sessions().len().await, 1);

        kernel.shutdown().await;
        assert!(kernel.is_shut_down());
        assert!(!path.exists());
        assert!(plugin.closed_by_host().await);
        assert!(kernel.sessions().is_empty().await);
        assert!(kernel.listen(&path).is_err());
    }

    #[tokio::test]
    async fn test_stale_socket_is_replaced() {
        let dir = test_dir();
        let path = dir.path().join("run").join("conduit.sock");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"stale").unwrap();

        let kernel = Kernel::new(KernelSettings::default());
        kernel.listen(&path).unwrap();
        UnixStream::connect(&path).await.unwrap();
        kernel.shutdown().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_kernels_are_independent() {
        let first = Kernel::new(KernelSettings::default());
        let second = Kernel::new(KernelSettings::default());

        let (host, plugin) = tokio::io::duplex(4096);
        first.connect(host);
        let mut plugin = RawPlugin::new(plugin);
        plugin.register("mqtt").await;

        assert_eq!(first.sessions().len().await, 1);
        assert!(second.sessions().is_empty().await);
        second.shutdown().await;
        assert_eq!(first.sessions().len().await, 1);
    }
}
