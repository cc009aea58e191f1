//! Host services: storage, plugin config and chats.
//!
//! Thin request/response wrappers. Each call is one correlated request; the
//! host scopes storage and config to this plugin's name.

use conduit_core::{ChatInfo, ChatMessage, ChatRole, ConfigSchema, Message, Row, StorageOperation};
use serde_json::{Map, Value};

use crate::client::{PluginClient, unexpected};
use crate::error::SdkResult;

impl PluginClient {
    /// Run a storage operation and return the affected or selected rows.
    ///
    /// # Errors
    ///
    /// [`SdkError::Host`](crate::SdkError::Host) with `invalid_request` for
    /// bad table names or unknown tables, `downstream_error` if the store
    /// failed.
    pub async fn storage(&self, operation: StorageOperation) -> SdkResult<Vec<Row>> {
        match self.call(Message::StorageRequest(operation)).await? {
            Message::StorageResult { rows } => Ok(rows),
            other => Err(unexpected("storage_result", &other)),
        }
    }

    /// Create `table` if it does not exist.
    ///
    /// # Errors
    ///
    /// As [`storage`](Self::storage).
    pub async fn create_table(&self, table: impl Into<String>) -> SdkResult<()> {
        self.storage(StorageOperation::CreateTable {
            table: table.into(),
        })
        .await
        .map(|_| ())
    }

    /// Insert `row` and return it as stored, `id` included.
    ///
    /// # Errors
    ///
    /// As [`storage`](Self::storage).
    pub async fn insert(&self, table: impl Into<String>, row: Row) -> SdkResult<Row> {
        let rows = self
            .storage(StorageOperation::Insert {
                table: table.into(),
                row,
            })
            .await?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    /// Rows of `table` matching every column in `filter`.
    ///
    /// # Errors
    ///
    /// As [`storage`](Self::storage).
    pub async fn query(
        &self,
        table: impl Into<String>,
        filter: Row,
        limit: Option<usize>,
    ) -> SdkResult<Vec<Row>> {
        self.storage(StorageOperation::Query {
            table: table.into(),
            filter,
            limit,
        })
        .await
    }

    /// Declare this plugin's config schema and get the current values.
    ///
    /// Subsequent changes arrive on [`config_changes`](Self::config_changes).
    ///
    /// # Errors
    ///
    /// [`SdkError::Host`](crate::SdkError::Host) with `invalid_request` if
    /// the schema is malformed.
    pub async fn declare_config(&self, schema: ConfigSchema) -> SdkResult<Map<String, Value>> {
        self.config_values(Message::ConfigSchema(schema)).await
    }

    /// Current config values.
    ///
    /// # Errors
    ///
    /// Returns an error if the host does not answer.
    pub async fn config(&self) -> SdkResult<Map<String, Value>> {
        self.config_values(Message::ConfigGet).await
    }

    /// Change one config value.
    ///
    /// # Errors
    ///
    /// [`SdkError::Host`](crate::SdkError::Host) with `invalid_request` for
    /// unknown keys or values of the wrong type.
    pub async fn set_config(&self, key: impl Into<String>, value: Value) -> SdkResult<()> {
        self.expect_ack(Message::ConfigSet {
            key: key.into(),
            value,
        })
        .await
    }

    async fn config_values(&self, message: Message) -> SdkResult<Map<String, Value>> {
        match self.call(message).await? {
            Message::ConfigValues { values } => Ok(values),
            other => Err(unexpected("config_values", &other)),
        }
    }

    /// Find the chat bound to `external_id`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the chat store failed.
    pub async fn get_or_create_chat(
        &self,
        external_id: impl Into<String>,
        title: Option<String>,
    ) -> SdkResult<ChatInfo> {
        let message = Message::ChatGetOrCreate {
            external_id: external_id.into(),
            title,
        };
        match self.call(message).await? {
            Message::ChatInfo(info) => Ok(info),
            other => Err(unexpected("chat_info", &other)),
        }
    }

    /// Append a message to a chat.
    ///
    /// # Errors
    ///
    /// [`SdkError::Host`](crate::SdkError::Host) with `invalid_request` if
    /// the chat does not exist.
    pub async fn add_chat_message(
        &self,
        chat_id: impl Into<String>,
        role: ChatRole,
        content: impl Into<String>,
    ) -> SdkResult<ChatMessage> {
        let message = Message::ChatAddMessage {
            chat_id: chat_id.into(),
            role,
            content: content.into(),
        };
        match self.call(message).await? {
            Message::ChatMessage(stored) => Ok(stored),
            other => Err(unexpected("chat_message", &other)),
        }
    }

    /// A chat's history, oldest first. `limit` keeps the latest messages.
    ///
    /// # Errors
    ///
    /// As [`add_chat_message`](Self::add_chat_message).
    pub async fn chat_messages(
        &self,
        chat_id: impl Into<String>,
        limit: Option<usize>,
    ) -> SdkResult<Vec<ChatMessage>> {
        let message = Message::ChatGetMessages {
            chat_id: chat_id.into(),
            limit,
        };
        match self.call(message).await? {
            Message::ChatMessages { messages } => Ok(messages),
            other => Err(unexpected("chat_messages", &other)),
        }
    }

    /// Ask the model to answer a chat. Skill calls the model makes along
    /// the way run before the final text is returned; the reply is also
    /// stored in the chat.
    ///
    /// `provider` picks a configured provider by name; `None` uses the
    /// host's default.
    ///
    /// # Errors
    ///
    /// [`SdkError::Host`](crate::SdkError::Host) with `timeout` or
    /// `downstream_error` if the provider failed.
    pub async fn request_llm_reply(
        &self,
        chat_id: impl Into<String>,
        provider: Option<String>,
    ) -> SdkResult<String> {
        let message = Message::ChatLlmRequest {
            chat_id: chat_id.into(),
            provider,
        };
        let timeout = self.client_config().chat_timeout;
        match self.call_with_timeout(message, timeout).await? {
            Message::ChatLlmReply { content } => Ok(content),
            other => Err(unexpected("chat_llm_reply", &other)),
        }
    }
}
