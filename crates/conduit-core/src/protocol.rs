//! Wire protocol.
//!
//! Every frame on a plugin connection carries exactly one [`Envelope`]: an
//! optional correlation id plus a [`Message`] tagged by `kind`. Requests that
//! expect an answer carry an id; the answer echoes it. Pushes
//! (`event_emit`, `event_dispatch`, `config_changed`) carry none.
//!
//! ```json
//! {"id": 4, "message": {"kind": "skill_invoke", "payload": {"name": "mqtt_publish", "arguments": {"topic": "home/light"}}}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::chat::{ChatInfo, ChatMessage, ChatRole};
use crate::config::ConfigSchema;
use crate::event::Event;
use crate::ids::{CorrelationId, SessionId, SubscriptionId};
use crate::skill::SkillDescriptor;
use crate::storage::{Row, StorageOperation};

/// One framed wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation id for request/response pairs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CorrelationId>,
    /// The message.
    pub message: Message,
}

impl Envelope {
    /// An envelope with no correlation id.
    #[must_use]
    pub fn push(message: Message) -> Self {
        Self { id: None, message }
    }

    /// An envelope tagged with a correlation id.
    #[must_use]
    pub fn with_id(id: CorrelationId, message: Message) -> Self {
        Self {
            id: Some(id),
            message,
        }
    }

    /// Answer this envelope, echoing its correlation id.
    #[must_use]
    pub fn reply(&self, message: Message) -> Self {
        Self {
            id: self.id,
            message,
        }
    }
}

/// Registration request, the mandatory first message of every connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Plugin name.
    pub name: String,
    /// Plugin version.
    #[serde(default)]
    pub version: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
}

impl RegisterRequest {
    /// Create a registration request.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: String::new(),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Machine-readable error classification carried by [`Message::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed or out-of-order message.
    ProtocolViolation,
    /// Declaration or request sent before registration completed.
    NotRegistered,
    /// Skill name already owned by another live plugin.
    DuplicateName,
    /// No skill with that name is registered.
    UnknownSkill,
    /// The owning plugin is gone.
    SkillOwnerUnavailable,
    /// The call exceeded its deadline.
    Timeout,
    /// The session closed while the call was in flight.
    SessionClosed,
    /// A storage, config, chat or LLM backend failed.
    DownstreamError,
    /// The request was well-formed but its content was rejected.
    InvalidRequest,
}

impl ErrorCode {
    /// The wire name of this code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProtocolViolation => "protocol_violation",
            Self::NotRegistered => "not_registered",
            Self::DuplicateName => "duplicate_name",
            Self::UnknownSkill => "unknown_skill",
            Self::SkillOwnerUnavailable => "skill_owner_unavailable",
            Self::Timeout => "timeout",
            Self::SessionClosed => "session_closed",
            Self::DownstreamError => "downstream_error",
            Self::InvalidRequest => "invalid_request",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of an `error` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Classification.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}

/// Every message kind on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Message {
    // -- plugin -> host --------------------------------------------------
    /// Registration handshake.
    Register(RegisterRequest),
    /// Declare a skill.
    SkillRegister(SkillDescriptor),
    /// Answer to a [`Message::SkillInvoke`].
    SkillResult {
        /// Result text handed to the model.
        #[serde(default)]
        output: String,
        /// Set when the skill failed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Subscribe this plugin to events matching any of the patterns.
    EventSubscribe {
        /// Dot-segmented patterns.
        patterns: Vec<String>,
    },
    /// Drop a subscription.
    EventUnsubscribe {
        /// Subscription to remove.
        subscription_id: SubscriptionId,
    },
    /// Publish an event on the bus.
    EventEmit {
        /// Dot-segmented event type.
        event_type: String,
        /// Event payload.
        #[serde(default)]
        payload: Map<String, Value>,
    },
    /// Run a storage operation in the plugin's namespace.
    StorageRequest(StorageOperation),
    /// Declare the plugin's configuration schema.
    ConfigSchema(ConfigSchema),
    /// Fetch every config value in the plugin's namespace.
    ConfigGet,
    /// Set one config value.
    ConfigSet {
        /// Field key.
        key: String,
        /// New value.
        value: Value,
    },
    /// Find the chat for an external id, creating it if needed.
    ChatGetOrCreate {
        /// Platform identifier of the conversation.
        external_id: String,
        /// Title used when the chat is created.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    /// Append a message to a chat.
    ChatAddMessage {
        /// Target chat.
        chat_id: String,
        /// Author role.
        role: ChatRole,
        /// Message text.
        content: String,
    },
    /// Ask the LLM to reply in a chat, with skills available as tools.
    ChatLlmRequest {
        /// Target chat.
        chat_id: String,
        /// Provider name; the host default when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider: Option<String>,
    },
    /// Read a chat's history.
    ChatGetMessages {
        /// Target chat.
        chat_id: String,
        /// Only the most recent `limit` messages.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },

    // -- host -> plugin --------------------------------------------------
    /// Handshake accepted.
    RegisterResponse {
        /// Assigned session id.
        session_id: SessionId,
    },
    /// Skill declaration accepted.
    SkillRegistered {
        /// Skill name.
        name: String,
    },
    /// Invoke a skill owned by the receiving plugin.
    SkillInvoke {
        /// Skill name.
        name: String,
        /// Arguments chosen by the model.
        #[serde(default)]
        arguments: Value,
    },
    /// Subscription created.
    Subscribed {
        /// New subscription id.
        subscription_id: SubscriptionId,
    },
    /// Generic success with no payload.
    Ack,
    /// Event delivered to a subscribed plugin.
    EventDispatch {
        /// Subscription that matched.
        subscription_id: SubscriptionId,
        /// The event.
        event: Event,
    },
    /// Rows produced by a storage operation.
    StorageResult {
        /// Affected or selected rows.
        rows: Vec<Row>,
    },
    /// Current config values.
    ConfigValues {
        /// Key/value map.
        values: Map<String, Value>,
    },
    /// A config value changed.
    ConfigChanged {
        /// Field key.
        key: String,
        /// New value.
        value: Value,
    },
    /// Chat found or created.
    ChatInfo(ChatInfo),
    /// Message stored.
    ChatMessage(ChatMessage),
    /// Chat history, oldest first.
    ChatMessages {
        /// Messages.
        messages: Vec<ChatMessage>,
    },
    /// The assistant's reply to a [`Message::ChatLlmRequest`].
    ChatLlmReply {
        /// Reply text.
        content: String,
    },

    // -- either direction ------------------------------------------------
    /// Failure report.
    Error(ErrorPayload),
}

impl Message {
    /// Build an `error` message.
    #[must_use]
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            code,
            message: message.into(),
        })
    }

    /// Wire name of this message's kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register(_) => "register",
            Self::SkillRegister(_) => "skill_register",
            Self::SkillResult { .. } => "skill_result",
            Self::EventSubscribe { .. } => "event_subscribe",
            Self::EventUnsubscribe { .. } => "event_unsubscribe",
            Self::EventEmit { .. } => "event_emit",
            Self::StorageRequest(_) => "storage_request",
            Self::ConfigSchema(_) => "config_schema",
            Self::ConfigGet => "config_get",
            Self::ConfigSet { .. } => "config_set",
            Self::ChatGetOrCreate { .. } => "chat_get_or_create",
            Self::ChatAddMessage { .. } => "chat_add_message",
            Self::ChatLlmRequest { .. } => "chat_llm_request",
            Self::ChatGetMessages { .. } => "chat_get_messages",
            Self::RegisterResponse { .. } => "register_response",
            Self::SkillRegistered { .. } => "skill_registered",
            Self::SkillInvoke { .. } => "skill_invoke",
            Self::Subscribed { .. } => "subscribed",
            Self::Ack => "ack",
            Self::EventDispatch { .. } => "event_dispatch",
            Self::StorageResult { .. } => "storage_result",
            Self::ConfigValues { .. } => "config_values",
            Self::ConfigChanged { .. } => "config_changed",
            Self::ChatInfo(_) => "chat_info",
            Self::ChatMessage(_) => "chat_message",
            Self::ChatMessages { .. } => "chat_messages",
            Self::ChatLlmReply { .. } => "chat_llm_reply",
            Self::Error(_) => "error",
        }
    }

    /// Whether this kind answers an earlier request.
    ///
    /// An envelope carrying a correlation id and a response kind is routed to
    /// the receiver's correlator rather than handled as a new request.
    #[must_use]
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            Self::SkillResult { .. }
                | Self::RegisterResponse { .. }
                | Self::SkillRegistered { .. }
                | Self::Subscribed { .. }
                | Self::Ack
                | Self::StorageResult { .. }
                | Self::ConfigValues { .. }
                | Self::ChatInfo(_)
                | Self::ChatMessage(_)
                | Self::ChatMessages { .. }
                | Self::ChatLlmReply { .. }
                | Self::Error(_)
        )
    }

    /// Whether a plugin may send this kind to the host.
    #[must_use]
    pub fn is_plugin_to_host(&self) -> bool {
        matches!(
            self,
            Self::Register(_)
                | Self::SkillRegister(_)
                | Self::SkillResult { .. }
                | Self::EventSubscribe { .. }
                | Self::EventUnsubscribe { .. }
                | Self::EventEmit { .. }
                | Self::StorageRequest(_)
                | Self::ConfigSchema(_)
                | Self::ConfigGet
                | Self::ConfigSet { .. }
                | Self::ChatGetOrCreate { .. }
                | Self::ChatAddMessage { .. }
                | Self::ChatLlmRequest { .. }
                | Self::ChatGetMessages { .. }
                | Self::Error(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skill::{ParamType, SkillParameter};
    use serde_json::json;

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = Envelope::with_id(
            CorrelationId(4),
            Message::SkillInvoke {
                name: "mqtt_publish".into(),
                arguments: json!({"topic": "home/light"}),
            },
        );
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "id": 4,
                "message": {
                    "kind": "skill_invoke",
                    "payload": {"name": "mqtt_publish", "arguments": {"topic": "home/light"}}
                }
            })
        );
    }

    #[test]
    fn test_push_omits_id() {
        let envelope = Envelope::push(Message::Ack);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json, json!({"message": {"kind": "ack"}}));

        let parsed: Envelope = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.id, None);
        assert_eq!(parsed.message, Message::Ack);
    }

    #[test]
    fn test_parse_plugin_messages() {
        let register: Envelope = serde_json::from_value(json!({
            "message": {"kind": "register", "payload": {"name": "mqtt", "version": "1.0.0"}}
        }))
        .unwrap();
        assert_eq!(
            register.message,
            Message::Register(RegisterRequest::new("mqtt", "1.0.0"))
        );

        let skill: Envelope = serde_json::from_value(json!({
            "id": 1,
            "message": {"kind": "skill_register", "payload": {
                "name": "mqtt_publish",
                "description": "Publish",
                "parameters": [{"name": "topic", "type": "string", "required": true}]
            }}
        }))
        .unwrap();
        let Message::SkillRegister(descriptor) = skill.message else {
            panic!("expected skill_register");
        };
        assert_eq!(
            descriptor.parameters,
            vec![SkillParameter::required("topic", ParamType::String, "")]
        );

        let storage: Envelope = serde_json::from_value(json!({
            "id": 2,
            "message": {"kind": "storage_request", "payload": {"op": "create_table", "table": "notes"}}
        }))
        .unwrap();
        assert_eq!(storage.message.kind(), "storage_request");
    }

    #[test]
    fn test_error_code_wire_name() {
        let msg = Message::error(ErrorCode::DuplicateName, "taken");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            json!({"kind": "error", "payload": {"code": "duplicate_name", "message": "taken"}})
        );
        assert_eq!(ErrorCode::SkillOwnerUnavailable.to_string(), "skill_owner_unavailable");
    }

    #[test]
    fn test_kind_matches_serde_tag() {
        let samples = vec![
            Message::ConfigGet,
            Message::Ack,
            Message::SkillResult {
                output: "ok".into(),
                error: None,
            },
            Message::EventSubscribe {
                patterns: vec!["chat.*".into()],
            },
            Message::ChatLlmReply {
                content: "hello".into(),
            },
        ];
        for msg in samples {
            let json = serde_json::to_value(&msg).unwrap();
            assert_eq!(json["kind"], json!(msg.kind()));
        }
    }

    #[test]
    fn test_direction_classification() {
        let result = Message::SkillResult {
            output: String::new(),
            error: None,
        };
        assert!(result.is_response());
        assert!(result.is_plugin_to_host());

        let emit = Message::EventEmit {
            event_type: "a".into(),
            payload: Map::new(),
        };
        assert!(!emit.is_response());

        let invoke = Message::SkillInvoke {
            name: "a".into(),
            arguments: Value::Null,
        };
        assert!(!invoke.is_plugin_to_host());
        assert!(!Message::Ack.is_plugin_to_host());
    }

    #[test]
    fn test_reply_echoes_id() {
        let request = Envelope::with_id(CorrelationId(9), Message::ConfigGet);
        let reply = request.reply(Message::Ack);
        assert_eq!(reply.id, Some(CorrelationId(9)));
    }
}
