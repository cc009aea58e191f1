//! Connection Manager: handshake, demultiplexing and disconnect cleanup.
//!
//! Each accepted stream gets one task running [`ConnectionManager::handle_connection`].
//! That task is the only reader of the stream. Envelopes are handled in
//! arrival order except storage, config and chat requests, which run on
//! their own tasks so a slow backend never stalls skill results or events.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use conduit_config::{ConfigChange, ConfigWatcher, PluginConfigStore};
use conduit_core::{
    CorrelationId, Envelope, ErrorCode, Event, Message, RegisterRequest, SubscriptionId,
};
use conduit_events::{EventBus, EventError, EventResult, EventSink, SubscriptionTarget};
use conduit_ipc::{Transport, TransportHandle, TransportReader};
use conduit_storage::PluginStorage;
use serde_json::json;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chat::ChatService;
use crate::error::{KernelError, KernelResult};
use crate::registry::PluginRegistry;
use crate::session::PluginSession;
use crate::settings::KernelSettings;
use crate::skills::SkillRegistry;

/// Published after a plugin completes the handshake.
pub const PLUGIN_REGISTERED: &str = "plugin.registered";
/// Published after a plugin's cleanup finished.
pub const PLUGIN_DISCONNECTED: &str = "plugin.disconnected";

/// Accepts plugin connections and routes their traffic.
pub struct ConnectionManager {
    settings: KernelSettings,
    sessions: Arc<PluginRegistry>,
    skills: Arc<SkillRegistry>,
    bus: Arc<EventBus>,
    storage: Arc<dyn PluginStorage>,
    plugin_config: Arc<dyn PluginConfigStore>,
    chat: Arc<ChatService>,
    shutdown: CancellationToken,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("settings", &self.settings)
            .field("bus", &self.bus)
            .field("chat", &self.chat)
            .finish_non_exhaustive()
    }
}

/// Collaborators a [`ConnectionManager`] forwards requests to.
pub struct Collaborators {
    /// Row storage.
    pub storage: Arc<dyn PluginStorage>,
    /// Per-plugin settings.
    pub plugin_config: Arc<dyn PluginConfigStore>,
    /// Chat persistence and the LLM loop.
    pub chat: Arc<ChatService>,
}

impl ConnectionManager {
    /// Create a manager.
    #[must_use]
    pub fn new(
        settings: KernelSettings,
        sessions: Arc<PluginRegistry>,
        skills: Arc<SkillRegistry>,
        bus: Arc<EventBus>,
        collaborators: Collaborators,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            settings,
            sessions,
            skills,
            bus,
            storage: collaborators.storage,
            plugin_config: collaborators.plugin_config,
            chat: collaborators.chat,
            shutdown,
        }
    }

    /// Serve one plugin connection until it closes or the kernel shuts down.
    pub async fn handle_connection<S>(self: Arc<Self>, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (transport, mut reader) = Transport::split(stream, &self.settings.transport);

        let Some(session) = self.handshake(&transport, &mut reader).await else {
            transport.close();
            return;
        };

        loop {
            let next = tokio::select! {
                next = reader.next() => next,
                () = transport.closed() => break,
                () = self.shutdown.cancelled() => break,
            };
            match next {
                None => {
                    debug!(session_id = %session.id(), "plugin closed the connection");
                    break;
                },
                Some(Err(e)) => {
                    warn!(
                        session_id = %session.id(),
                        error = %e,
                        "dropping plugin after read error"
                    );
                    if e.is_protocol_violation() {
                        let report = Message::error(ErrorCode::ProtocolViolation, e.to_string());
                        let _ = transport.send(&Envelope::push(report)).await;
                    }
                    break;
                },
                Some(Ok(envelope)) => self.dispatch(&session, envelope).await,
            }
        }

        self.disconnect(&session).await;
    }

    /// Wait for the registration envelope and register the session.
    async fn handshake<R>(
        &self,
        transport: &TransportHandle,
        reader: &mut TransportReader<R>,
    ) -> Option<Arc<PluginSession>>
    where
        R: AsyncRead + Unpin,
    {
        let deadline = self.settings.handshake_timeout;
        let first = tokio::select! {
            () = self.shutdown.cancelled() => return None,
            first = tokio::time::timeout(deadline, reader.next()) => first,
        };

        let envelope = match first {
            Err(_) => {
                warn!(?deadline, "no registration before the handshake deadline");
                reject(transport, None, ErrorCode::Timeout, "registration deadline exceeded").await;
                return None;
            },
            Ok(None) => {
                debug!("connection closed before registering");
                return None;
            },
            Ok(Some(Err(e))) => {
                warn!(error = %e, "unreadable first frame");
                reject(transport, None, ErrorCode::ProtocolViolation, &e.to_string()).await;
                return None;
            },
            Ok(Some(Ok(envelope))) => envelope,
        };

        let request = match envelope.message {
            Message::Register(request) if !request.name.trim().is_empty() => request,
            Message::Register(_) => {
                warn!("registration without a plugin name");
                reject(
                    transport,
                    envelope.id,
                    ErrorCode::ProtocolViolation,
                    "plugin name must not be empty",
                )
                .await;
                return None;
            },
            other => {
                warn!(kind = other.kind(), "first message was not a registration");
                let detail = format!("expected register, got {}", other.kind());
                reject(transport, envelope.id, ErrorCode::ProtocolViolation, &detail).await;
                return None;
            },
        };

        self.register(transport, envelope.id, request).await
    }

    async fn register(
        &self,
        transport: &TransportHandle,
        id: Option<CorrelationId>,
        request: RegisterRequest,
    ) -> Option<Arc<PluginSession>> {
        let session = Arc::new(PluginSession::new(transport.clone()));
        if !session.promote(request) {
            return None;
        }
        self.sessions.insert(Arc::clone(&session)).await;

        let reply = Envelope {
            id,
            message: Message::RegisterResponse {
                session_id: session.id(),
            },
        };
        if let Err(e) = transport.send(&reply).await {
            warn!(session_id = %session.id(), error = %e, "failed to confirm registration");
            self.disconnect(&session).await;
            return None;
        }

        info!(
            session_id = %session.id(),
            plugin = session.name(),
            version = session.version(),
            "plugin registered"
        );
        self.bus.publish(Event::from_value(
            PLUGIN_REGISTERED,
            json!({
                "session_id": session.id(),
                "name": session.name(),
                "version": session.version(),
            }),
        ));
        Some(session)
    }

    async fn dispatch(self: &Arc<Self>, session: &Arc<PluginSession>, envelope: Envelope) {
        if !session.is_live() {
            reply(
                session,
                &envelope,
                Message::error(ErrorCode::NotRegistered, "session is not registered"),
            )
            .await;
            return;
        }
        if !envelope.message.is_plugin_to_host() {
            warn!(
                session_id = %session.id(),
                kind = envelope.message.kind(),
                "plugin sent a host-to-plugin message"
            );
            let detail = format!("'{}' cannot be sent by a plugin", envelope.message.kind());
            reply(session, &envelope, Message::error(ErrorCode::ProtocolViolation, detail)).await;
            return;
        }

        match envelope.message {
            Message::SkillResult { .. } | Message::Error(_) => {
                let kind = envelope.message.kind();
                match envelope.id {
                    Some(id) => {
                        session.correlator().resolve(id, envelope.message);
                    },
                    None => {
                        debug!(session_id = %session.id(), kind, "uncorrelated response ignored");
                    },
                }
            },
            Message::Register(_) => {
                let error = Message::error(ErrorCode::ProtocolViolation, "already registered");
                reply(session, &envelope, error).await;
            },
            Message::SkillRegister(ref descriptor) => {
                let name = descriptor.name.clone();
                let answer = match self.skills.register(session.id(), descriptor.clone()).await {
                    Ok(()) => Message::SkillRegistered { name },
                    Err(e) => e.to_message(),
                };
                reply(session, &envelope, answer).await;
            },
            Message::EventSubscribe { ref patterns } => {
                let answer = match self.subscribe(session, patterns.clone()) {
                    Ok(subscription_id) => Message::Subscribed { subscription_id },
                    Err(e) => e.to_message(),
                };
                reply(session, &envelope, answer).await;
            },
            Message::EventUnsubscribe { subscription_id } => {
                let answer = if self.bus.unsubscribe_owned(subscription_id, session.id()) {
                    Message::Ack
                } else {
                    Message::error(
                        ErrorCode::InvalidRequest,
                        format!("no subscription {subscription_id} for this plugin"),
                    )
                };
                reply(session, &envelope, answer).await;
            },
            Message::EventEmit {
                ref event_type,
                ref payload,
            } => {
                if event_type.is_empty() {
                    let error = Message::error(ErrorCode::InvalidRequest, "event type is empty");
                    reply(session, &envelope, error).await;
                    return;
                }
                let event =
                    Event::new(event_type.clone(), payload.clone()).with_source(session.name());
                let deliveries = self.bus.publish(event);
                debug!(session_id = %session.id(), %event_type, deliveries, "event emitted");
            },
            _ => self.spawn_request(session, envelope),
        }
    }

    fn subscribe(
        &self,
        session: &Arc<PluginSession>,
        patterns: Vec<String>,
    ) -> KernelResult<SubscriptionId> {
        let sink = Arc::new(TransportSink {
            transport: session.transport().clone(),
        });
        let target = SubscriptionTarget::plugin(session.id(), sink);
        Ok(self.bus.subscribe(patterns, target)?)
    }

    /// Run a collaborator request on its own task and send the answer.
    fn spawn_request(self: &Arc<Self>, session: &Arc<PluginSession>, envelope: Envelope) {
        let manager = Arc::clone(self);
        let session = Arc::clone(session);
        tokio::spawn(async move {
            let kind = envelope.message.kind();
            let answer = match manager.handle_request(&session, envelope.message.clone()).await {
                Ok(message) => message,
                Err(e) => {
                    debug!(session_id = %session.id(), kind, error = %e, "request failed");
                    e.to_message()
                },
            };
            reply(&session, &envelope, answer).await;
        });
    }

    async fn handle_request(
        &self,
        session: &Arc<PluginSession>,
        message: Message,
    ) -> KernelResult<Message> {
        let namespace = session.name();
        match message {
            Message::StorageRequest(operation) => {
                let rows = self.storage.execute(namespace, operation).await?;
                Ok(Message::StorageResult { rows })
            },
            Message::ConfigSchema(schema) => {
                let values = self.plugin_config.set_schema(namespace, schema).await?;
                self.watch_config(session);
                Ok(Message::ConfigValues { values })
            },
            Message::ConfigGet => {
                let values = self.plugin_config.get_all(namespace).await?;
                Ok(Message::ConfigValues { values })
            },
            Message::ConfigSet { key, value } => {
                self.plugin_config.set(namespace, &key, value).await?;
                Ok(Message::Ack)
            },
            Message::ChatGetOrCreate { external_id, title } => {
                let chat = self.chat.store().get_or_create_chat(&external_id, title).await?;
                Ok(Message::ChatInfo(chat))
            },
            Message::ChatAddMessage {
                chat_id,
                role,
                content,
            } => {
                let message = self.chat.store().add_message(&chat_id, role, content).await?;
                Ok(Message::ChatMessage(message))
            },
            Message::ChatGetMessages { chat_id, limit } => {
                let messages = self.chat.store().get_messages(&chat_id, limit).await?;
                Ok(Message::ChatMessages { messages })
            },
            Message::ChatLlmRequest { chat_id, provider } => {
                let content = self
                    .chat
                    .request_llm_reply(&chat_id, provider.as_deref())
                    .await?;
                Ok(Message::ChatLlmReply { content })
            },
            other => Err(KernelError::ProtocolViolation(format!(
                "unexpected {} request",
                other.kind()
            ))),
        }
    }

    /// Push `config_changed` to the session whenever its namespace changes.
    fn watch_config(&self, session: &Arc<PluginSession>) {
        if session.has_config_watch() {
            return;
        }
        let transport = session.transport().clone();
        let watcher: ConfigWatcher = Arc::new(move |change: &ConfigChange| {
            let push = Envelope::push(Message::ConfigChanged {
                key: change.key.clone(),
                value: change.value.clone(),
            });
            if let Err(e) = transport.try_send(&push) {
                debug!(namespace = %change.namespace, error = %e, "config change not delivered");
            }
        });
        let id = self.plugin_config.on_change(session.name(), watcher);
        if !session.set_config_watch(id) {
            // Lost a race with a concurrent schema declaration.
            self.plugin_config.remove_watch(id);
        }
    }

    /// Tear down everything owned by `session`. Runs once per session.
    ///
    /// In-flight calls fail with `SessionClosed` before the skills and
    /// subscriptions are removed, so no caller waits on a dead plugin.
    pub async fn disconnect(&self, session: &Arc<PluginSession>) {
        if !session.mark_disconnected() {
            return;
        }
        session.correlator().close();
        session.transport().close();

        let skills = self.skills.unregister_owner(session.id()).await;
        let subscriptions = self.bus.unsubscribe_session(session.id());
        if let Some(watch) = session.take_config_watch() {
            self.plugin_config.remove_watch(watch);
        }
        self.sessions.remove(session.id()).await;

        info!(
            session_id = %session.id(),
            plugin = session.name(),
            skills,
            subscriptions,
            "plugin disconnected"
        );
        self.bus.publish(Event::from_value(
            PLUGIN_DISCONNECTED,
            json!({
                "session_id": session.id(),
                "name": session.name(),
            }),
        ));
    }
}

/// Send `message` as the answer to `request`.
async fn reply(session: &PluginSession, request: &Envelope, message: Message) {
    if let Err(e) = session.transport().send(&request.reply(message)).await {
        debug!(session_id = %session.id(), error = %e, "reply not delivered");
    }
}

/// Report a failed handshake to the peer.
async fn reject(
    transport: &TransportHandle,
    id: Option<CorrelationId>,
    code: ErrorCode,
    detail: &str,
) {
    let envelope = Envelope {
        id,
        message: Message::error(code, detail),
    };
    let _ = transport.send(&envelope).await;
}

/// Delivers bus events to a plugin as `event_dispatch` pushes.
///
/// Never waits on the outbound queue; events for a plugin that stops
/// reading are dropped.
struct TransportSink {
    transport: TransportHandle,
}

#[async_trait]
impl EventSink for TransportSink {
    async fn deliver(&self, subscription: SubscriptionId, event: Arc<Event>) -> EventResult<()> {
        let push = Envelope::push(Message::EventDispatch {
            subscription_id: subscription,
            event: Event::clone(&event),
        });
        self.transport
            .try_send(&push)
            .map_err(|e| EventError::Delivery(e.to_string()))
    }
}
