//! Chat payloads exchanged with the chat service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Message from a human.
    User,
    /// Message produced by the LLM.
    Assistant,
    /// Instruction injected by the host or plugin.
    System,
}

/// A persisted chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatInfo {
    /// Host-assigned chat identifier.
    pub id: String,
    /// Identifier on the plugin's platform (e.g. a Telegram chat id).
    pub external_id: String,
    /// Optional title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// One message in a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Chat this message belongs to.
    pub chat_id: String,
    /// Author role.
    pub role: ChatRole,
    /// Text content.
    pub content: String,
    /// When the message was stored.
    pub created_at: DateTime<Utc>,
}
