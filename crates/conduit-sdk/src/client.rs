//! Connection to the host.
//!
//! A [`PluginClient`] owns one transport. A background task is the sole
//! reader: responses settle pending calls, `skill_invoke` runs the matching
//! [`SkillHandler`] on its own task, and pushes are routed to subscriptions
//! and config listeners.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use conduit_core::{
    CorrelationId, Envelope, Message, RegisterRequest, SessionId, SkillDescriptor, SubscriptionId,
};
use conduit_ipc::{Correlator, Transport, TransportConfig, TransportReader};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixStream;
use tokio::sync::broadcast;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::error::{SdkError, SdkResult};
use crate::skill::SkillHandler;
use crate::subscription::{Subscription, SubscriptionTable};

/// Default deadline for ordinary requests.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for `chat_llm_request`. Longer than the host's own chat
/// deadline so the host's timeout error arrives first.
pub const DEFAULT_CHAT_TIMEOUT: Duration = Duration::from_secs(150);

/// Config changes buffered per listener.
const CONFIG_CHANGE_BUFFER: usize = 64;

/// Client tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Transport settings. Must agree with the host's frame limit.
    pub transport: TransportConfig,
    /// Deadline for every request except LLM replies.
    pub call_timeout: Duration,
    /// Deadline for LLM replies.
    pub chat_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            chat_timeout: DEFAULT_CHAT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Set the request deadline.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the LLM reply deadline.
    #[must_use]
    pub fn with_chat_timeout(mut self, timeout: Duration) -> Self {
        self.chat_timeout = timeout;
        self
    }

    /// Set transport settings.
    #[must_use]
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }
}

/// A `config_changed` push from the host.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigUpdate {
    /// Changed key.
    pub key: String,
    /// New value.
    pub value: Value,
}

/// A registered plugin connection.
///
/// Cheap to clone; clones share the connection. The connection closes when
/// [`close`](Self::close) is called, the host hangs up, or the last clone
/// is dropped.
#[derive(Clone)]
pub struct PluginClient {
    inner: Arc<Inner>,
    session_id: SessionId,
    _close_on_drop: Arc<DropGuard>,
}

impl fmt::Debug for PluginClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginClient")
            .field("name", &self.inner.name)
            .field("session_id", &self.session_id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

struct Inner {
    name: String,
    config: ClientConfig,
    correlator: Correlator,
    skills: RwLock<HashMap<String, Arc<dyn SkillHandler>>>,
    subscriptions: Mutex<SubscriptionTable>,
    config_changes: broadcast::Sender<ConfigUpdate>,
    closed: CancellationToken,
}

impl PluginClient {
    /// Connect to the host socket at `path` and register.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be reached or the host rejects
    /// the registration.
    pub async fn connect_unix(path: impl AsRef<Path>, request: RegisterRequest) -> SdkResult<Self> {
        Self::connect_unix_with(path, request, ClientConfig::default()).await
    }

    /// [`connect_unix`](Self::connect_unix) with explicit settings.
    ///
    /// # Errors
    ///
    /// As [`connect_unix`](Self::connect_unix).
    pub async fn connect_unix_with(
        path: impl AsRef<Path>,
        request: RegisterRequest,
        config: ClientConfig,
    ) -> SdkResult<Self> {
        let stream = UnixStream::connect(path.as_ref()).await?;
        Self::connect(stream, request, config).await
    }

    /// Register over an already connected stream.
    ///
    /// # Errors
    ///
    /// - [`SdkError::Host`] if the host rejects the registration
    /// - [`SdkError::Call`] if the host does not answer in time or hangs up
    pub async fn connect<S>(
        stream: S,
        request: RegisterRequest,
        config: ClientConfig,
    ) -> SdkResult<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (transport, reader) = Transport::split(stream, &config.transport);
        let (config_changes, _) = broadcast::channel(CONFIG_CHANGE_BUFFER);
        let inner = Arc::new(Inner {
            name: request.name.clone(),
            config,
            correlator: Correlator::new(transport),
            skills: RwLock::new(HashMap::new()),
            subscriptions: Mutex::new(SubscriptionTable::default()),
            config_changes,
            closed: CancellationToken::new(),
        });
        tokio::spawn(receive_loop(Arc::clone(&inner), reader));
        let guard = Arc::new(inner.closed.clone().drop_guard());

        let reply = inner.request(Message::Register(request), config.call_timeout).await;
        let session_id = match reply {
            Ok(Message::RegisterResponse { session_id }) => session_id,
            Ok(other) => {
                inner.shutdown();
                return Err(SdkError::UnexpectedReply {
                    expected: "register_response",
                    got: other.kind(),
                });
            },
            Err(e) => {
                inner.shutdown();
                return Err(e);
            },
        };

        info!(plugin = %inner.name, %session_id, "registered with host");
        Ok(Self {
            inner,
            session_id,
            _close_on_drop: guard,
        })
    }

    /// Session id assigned by the host.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Registered plugin name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Close the connection. Pending requests fail with a closed error.
    pub fn close(&self) {
        self.inner.shutdown();
    }

    /// Whether the connection is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Resolves once the connection is closed from either side.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await;
    }

    /// Offer a skill to the model.
    ///
    /// The handler is installed before the host is asked, so an invocation
    /// that races the confirmation still finds it. It is removed again if
    /// the host refuses.
    ///
    /// # Errors
    ///
    /// [`SdkError::Host`] with `duplicate_name` if another live plugin owns
    /// the name, or `invalid_request` if the descriptor is malformed.
    pub async fn register_skill(
        &self,
        descriptor: SkillDescriptor,
        handler: impl SkillHandler,
    ) -> SdkResult<()> {
        let name = descriptor.name.clone();
        let previous = self
            .inner
            .skills
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), Arc::new(handler));

        let result = match self.call(Message::SkillRegister(descriptor)).await {
            Ok(Message::SkillRegistered { .. }) => Ok(()),
            Ok(other) => Err(unexpected("skill_registered", &other)),
            Err(e) => Err(e),
        };

        if result.is_err() {
            let mut skills = self.inner.skills.write().unwrap_or_else(PoisonError::into_inner);
            match previous {
                Some(previous) => skills.insert(name, previous),
                None => skills.remove(&name),
            };
        }
        result
    }

    /// Subscribe to events matching any of `patterns`.
    ///
    /// # Errors
    ///
    /// [`SdkError::Host`] with `invalid_request` if a pattern is malformed.
    pub async fn subscribe<I>(&self, patterns: I) -> SdkResult<Subscription>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let patterns = patterns.into_iter().map(Into::into).collect();
        match self.call(Message::EventSubscribe { patterns }).await? {
            Message::Subscribed { subscription_id } => Ok(self
                .inner
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .attach(subscription_id)),
            other => Err(unexpected("subscribed", &other)),
        }
    }

    /// End a subscription. Its [`Subscription`] stops receiving.
    ///
    /// # Errors
    ///
    /// [`SdkError::Host`] with `invalid_request` if the id is not one of
    /// this plugin's subscriptions.
    pub async fn unsubscribe(&self, subscription_id: SubscriptionId) -> SdkResult<()> {
        self.inner
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .detach(subscription_id);
        self.expect_ack(Message::EventUnsubscribe { subscription_id }).await
    }

    /// Publish an event. Fire-and-forget; the host stamps this plugin as the
    /// source.
    ///
    /// # Errors
    ///
    /// [`SdkError::InvalidPayload`] unless `payload` is an object or null,
    /// or a transport error if the connection is gone.
    pub async fn emit(&self, event_type: impl Into<String>, payload: Value) -> SdkResult<()> {
        let payload = match payload {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            _ => return Err(SdkError::InvalidPayload),
        };
        let message = Message::EventEmit {
            event_type: event_type.into(),
            payload,
        };
        self.inner
            .correlator
            .transport()
            .send(&Envelope::push(message))
            .await?;
        Ok(())
    }

    /// Listen for `config_changed` pushes.
    ///
    /// Only changes made after this call are received.
    #[must_use]
    pub fn config_changes(&self) -> broadcast::Receiver<ConfigUpdate> {
        self.inner.config_changes.subscribe()
    }

    pub(crate) async fn call(&self, message: Message) -> SdkResult<Message> {
        self.inner.request(message, self.inner.config.call_timeout).await
    }

    pub(crate) async fn call_with_timeout(
        &self,
        message: Message,
        timeout: Duration,
    ) -> SdkResult<Message> {
        self.inner.request(message, timeout).await
    }

    pub(crate) fn client_config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub(crate) async fn expect_ack(&self, message: Message) -> SdkResult<()> {
        match self.call(message).await? {
            Message::Ack => Ok(()),
            other => Err(unexpected("ack", &other)),
        }
    }
}

pub(crate) fn unexpected(expected: &'static str, got: &Message) -> SdkError {
    SdkError::UnexpectedReply {
        expected,
        got: got.kind(),
    }
}

impl Inner {
    async fn request(&self, message: Message, timeout: Duration) -> SdkResult<Message> {
        match self.correlator.call(message, timeout).await? {
            Message::Error(payload) => Err(SdkError::Host {
                code: payload.code,
                message: payload.message,
            }),
            reply => Ok(reply),
        }
    }

    fn route(self: &Arc<Self>, envelope: Envelope) {
        let Envelope { id, message } = envelope;
        match message {
            Message::SkillInvoke { name, arguments } => {
                let Some(id) = id else {
                    warn!(skill = %name, "skill invocation without correlation id dropped");
                    return;
                };
                let inner = Arc::clone(self);
                tokio::spawn(async move { inner.run_skill(id, name, arguments).await });
            },
            Message::EventDispatch {
                subscription_id,
                event,
            } => {
                self.subscriptions
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .dispatch(subscription_id, event);
            },
            Message::ConfigChanged { key, value } => {
                // No listeners is fine.
                let _ = self.config_changes.send(ConfigUpdate { key, value });
            },
            message if message.is_response() => match id {
                Some(id) => {
                    if !self.correlator.resolve(id, message) {
                        debug!(%id, "response for an abandoned request discarded");
                    }
                },
                None => warn!(kind = message.kind(), "response without correlation id dropped"),
            },
            other => warn!(kind = other.kind(), "unexpected message from host"),
        }
    }

    async fn run_skill(&self, id: CorrelationId, name: String, arguments: Value) {
        let handler = self
            .skills
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
            .cloned();

        let reply = match handler {
            Some(handler) => match handler.call(arguments).await {
                Ok(output) => Message::SkillResult {
                    output,
                    error: None,
                },
                Err(error) => {
                    debug!(skill = %name, %error, "skill failed");
                    Message::SkillResult {
                        output: String::new(),
                        error: Some(error),
                    }
                },
            },
            None => Message::SkillResult {
                output: String::new(),
                error: Some(format!("skill '{name}' is not handled by this plugin")),
            },
        };

        if let Err(e) = self
            .correlator
            .transport()
            .send(&Envelope::with_id(id, reply))
            .await
        {
            debug!(skill = %name, error = %e, "skill result not delivered");
        }
    }

    fn shutdown(&self) {
        self.correlator.close();
        self.correlator.transport().close();
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.closed.cancel();
    }
}

async fn receive_loop<R>(inner: Arc<Inner>, mut reader: TransportReader<R>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let next = tokio::select! {
            () = inner.closed.cancelled() => break,
            next = reader.next() => next,
        };
        match next {
            Some(Ok(envelope)) => inner.route(envelope),
            Some(Err(e)) => {
                warn!(plugin = %inner.name, error = %e, "connection to host failed");
                break;
            },
            None => {
                debug!(plugin = %inner.name, "host closed the connection");
                break;
            },
        }
    }
    inner.shutdown();
}
