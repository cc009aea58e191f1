//! Chat persistence and the LLM function-calling loop.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use conduit_config::LlmSection;
use conduit_core::{ChatInfo, ChatMessage, ChatRole};
use conduit_llm::{
    LlmProvider, Message as LlmMessage, OpenAiCompatProvider, ToolCall, ToolCallResult,
};
use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{KernelError, KernelResult};
use crate::settings::KernelSettings;
use crate::skills::SkillRegistry;

/// Chat persistence consumed by the host.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Find the chat for `external_id`, creating it with `title` if needed.
    async fn get_or_create_chat(
        &self,
        external_id: &str,
        title: Option<String>,
    ) -> KernelResult<ChatInfo>;

    /// Append a message.
    ///
    /// # Errors
    ///
    /// [`KernelError::InvalidRequest`] for an unknown chat.
    async fn add_message(
        &self,
        chat_id: &str,
        role: ChatRole,
        content: String,
    ) -> KernelResult<ChatMessage>;

    /// History, oldest first. With `limit`, only the most recent messages.
    ///
    /// # Errors
    ///
    /// [`KernelError::InvalidRequest`] for an unknown chat.
    async fn get_messages(
        &self,
        chat_id: &str,
        limit: Option<usize>,
    ) -> KernelResult<Vec<ChatMessage>>;
}

#[derive(Debug, Default)]
struct ChatTables {
    chats: HashMap<String, ChatInfo>,
    by_external: HashMap<String, String>,
    messages: HashMap<String, Vec<ChatMessage>>,
}

/// In-memory [`ChatStore`].
#[derive(Debug, Default)]
pub struct MemoryChatStore {
    tables: RwLock<ChatTables>,
}

impl MemoryChatStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn get_or_create_chat(
        &self,
        external_id: &str,
        title: Option<String>,
    ) -> KernelResult<ChatInfo> {
        let mut tables = self.tables.write().await;
        if let Some(chat) = tables
            .by_external
            .get(external_id)
            .and_then(|id| tables.chats.get(id))
        {
            return Ok(chat.clone());
        }

        let chat = ChatInfo {
            id: Uuid::new_v4().to_string(),
            external_id: external_id.to_string(),
            title,
            created_at: Utc::now(),
        };
        tables
            .by_external
            .insert(external_id.to_string(), chat.id.clone());
        tables.messages.insert(chat.id.clone(), Vec::new());
        tables.chats.insert(chat.id.clone(), chat.clone());
        debug!(chat_id = %chat.id, external_id, "chat created");
        Ok(chat)
    }

    async fn add_message(
        &self,
        chat_id: &str,
        role: ChatRole,
        content: String,
    ) -> KernelResult<ChatMessage> {
        let mut tables = self.tables.write().await;
        let history = tables
            .messages
            .get_mut(chat_id)
            .ok_or_else(|| KernelError::InvalidRequest(format!("unknown chat '{chat_id}'")))?;
        let message = ChatMessage {
            chat_id: chat_id.to_string(),
            role,
            content,
            created_at: Utc::now(),
        };
        history.push(message.clone());
        Ok(message)
    }

    async fn get_messages(
        &self,
        chat_id: &str,
        limit: Option<usize>,
    ) -> KernelResult<Vec<ChatMessage>> {
        let tables = self.tables.read().await;
        let history = tables
            .messages
            .get(chat_id)
            .ok_or_else(|| KernelError::InvalidRequest(format!("unknown chat '{chat_id}'")))?;
        let skip = limit.map_or(0, |n| history.len().saturating_sub(n));
        Ok(history.iter().skip(skip).cloned().collect())
    }
}

/// Build providers from the `[llm]` section.
#[must_use]
pub fn providers_from_config(section: &LlmSection) -> Vec<Arc<dyn LlmProvider>> {
    section
        .providers
        .iter()
        .map(|p| {
            let mut provider = OpenAiCompatProvider::new(&p.name, &p.base_url, &p.model)
                .with_max_tokens(p.max_tokens)
                .with_temperature(p.temperature);
            if let Some(key) = &p.api_key {
                provider = provider.with_api_key(key);
            }
            Arc::new(provider) as Arc<dyn LlmProvider>
        })
        .collect()
}

/// Chat requests from plugins: persistence plus the tool loop.
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    default_provider: Option<String>,
    skills: Arc<SkillRegistry>,
    settings: KernelSettings,
}

impl fmt::Debug for ChatService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        providers.sort_unstable();
        f.debug_struct("ChatService")
            .field("providers", &providers)
            .field("default_provider", &self.default_provider)
            .finish_non_exhaustive()
    }
}

impl ChatService {
    /// Create a service with no providers.
    #[must_use]
    pub fn new(
        store: Arc<dyn ChatStore>,
        skills: Arc<SkillRegistry>,
        settings: KernelSettings,
    ) -> Self {
        Self {
            store,
            providers: HashMap::new(),
            default_provider: None,
            skills,
            settings,
        }
    }

    /// Add a provider. The first one added becomes the default unless
    /// [`with_default_provider`](Self::with_default_provider) says otherwise.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        let name = provider.name().to_string();
        if self.default_provider.is_none() {
            self.default_provider = Some(name.clone());
        }
        self.providers.insert(name, provider);
        self
    }

    /// Choose the default provider by name.
    #[must_use]
    pub fn with_default_provider(mut self, name: impl Into<String>) -> Self {
        self.default_provider = Some(name.into());
        self
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ChatStore> {
        &self.store
    }

    fn provider(&self, requested: Option<&str>) -> KernelResult<Arc<dyn LlmProvider>> {
        let name = requested
            .or(self.default_provider.as_deref())
            .ok_or_else(|| KernelError::InvalidRequest("no LLM provider configured".into()))?;
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| KernelError::InvalidRequest(format!("unknown LLM provider '{name}'")))
    }

    /// Produce and store the assistant's next message in `chat_id`.
    ///
    /// The model sees the chat history and every live skill as a tool. Tool
    /// calls in one round run concurrently and their results (or error
    /// descriptions) go back to the model, for at most `max_tool_rounds`
    /// rounds. The whole request is bounded by `chat_request_timeout`.
    ///
    /// # Errors
    ///
    /// - [`KernelError::InvalidRequest`] for an unknown chat or provider
    /// - [`KernelError::Timeout`] when the request budget runs out
    /// - [`KernelError::Downstream`] when the provider fails or the round
    ///   limit is reached
    pub async fn request_llm_reply(
        &self,
        chat_id: &str,
        provider: Option<&str>,
    ) -> KernelResult<String> {
        let provider = self.provider(provider)?;
        let budget = self.settings.chat_request_timeout;
        let reply = tokio::time::timeout(budget, self.run_tool_loop(chat_id, provider.as_ref()))
            .await
            .map_err(|_| KernelError::Timeout {
                operation: format!("chat request for '{chat_id}'"),
                after: budget,
            })??;

        self.store
            .add_message(chat_id, ChatRole::Assistant, reply.clone())
            .await?;
        Ok(reply)
    }

    async fn run_tool_loop(
        &self,
        chat_id: &str,
        provider: &dyn LlmProvider,
    ) -> KernelResult<String> {
        let history = self.store.get_messages(chat_id, None).await?;
        let mut transcript: Vec<LlmMessage> = history.iter().map(to_llm_message).collect();
        let tools = self.skills.tool_definitions().await;

        let mut round: u32 = 0;
        loop {
            let response = provider
                .complete(&transcript, &tools, &self.settings.system_prompt)
                .await?;

            let Some(calls) = response.message.tool_calls().filter(|c| !c.is_empty()) else {
                let text = response.message.text_content().unwrap_or_default().to_string();
                info!(chat_id, provider = provider.name(), rounds = round, "llm reply ready");
                return Ok(text);
            };

            if round >= self.settings.max_tool_rounds {
                warn!(chat_id, rounds = round, "tool round limit reached");
                return Err(KernelError::Downstream(format!(
                    "tool round limit of {} reached",
                    self.settings.max_tool_rounds
                )));
            }
            round = round.saturating_add(1);

            let calls = calls.to_vec();
            debug!(chat_id, round, calls = calls.len(), "running tool calls");
            let results = join_all(calls.iter().map(|call| self.run_tool(call))).await;

            transcript.push(LlmMessage::assistant_with_tools(calls));
            transcript.extend(results.into_iter().map(LlmMessage::tool_result));
        }
    }

    async fn run_tool(&self, call: &ToolCall) -> ToolCallResult {
        match self
            .skills
            .invoke(&call.name, call.arguments.clone(), self.settings.skill_call_timeout)
            .await
        {
            Ok(output) => ToolCallResult::success(&call.id, output),
            Err(e) => {
                debug!(skill = %call.name, error = %e, "tool call failed");
                ToolCallResult::error(&call.id, e.to_string())
            },
        }
    }
}

fn to_llm_message(message: &ChatMessage) -> LlmMessage {
    match message.role {
        ChatRole::User => LlmMessage::user(&message.content),
        ChatRole::Assistant => LlmMessage::assistant(&message.content),
        ChatRole::System => LlmMessage::system(&message.content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PluginRegistry;
    use conduit_llm::MessageContent;
    use conduit_test::{MockLlmProvider, MockLlmTurn, MockToolCall};
    use serde_json::json;
    use std::time::Duration;

    fn service_with(provider: Arc<MockLlmProvider>, settings: KernelSettings) -> ChatService {
        let skills = Arc::new(SkillRegistry::new(Arc::new(PluginRegistry::new())));
        ChatService::new(Arc::new(MemoryChatStore::new()), skills, settings)
            .with_provider(provider)
    }

    async fn new_chat(service: &ChatService) -> String {
        service
            .store()
            .get_or_create_chat("tg:1", None)
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = MemoryChatStore::new();
        let first = store
            .get_or_create_chat("tg:42", Some("Kitchen".into()))
            .await
            .unwrap();
        let second = store.get_or_create_chat("tg:42", None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second.title.as_deref(), Some("Kitchen"));

        let other = store.get_or_create_chat("tg:43", None).await.unwrap();
        assert_ne!(other.id, first.id);
    }

    #[tokio::test]
    async fn test_messages_limit_keeps_latest() {
        let store = MemoryChatStore::new();
        let chat = store.get_or_create_chat("tg:1", None).await.unwrap();
        for text in ["one", "two", "three"] {
            store
                .add_message(&chat.id, ChatRole::User, text.into())
                .await
                .unwrap();
        }
        let last_two: Vec<String> = store
            .get_messages(&chat.id, Some(2))
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(last_two, vec!["two", "three"]);
        assert_eq!(store.get_messages(&chat.id, None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_chat() {
        let store = MemoryChatStore::new();
        assert!(matches!(
            store.add_message("missing", ChatRole::User, "hi".into()).await,
            Err(KernelError::InvalidRequest(_))
        ));
        assert!(matches!(
            store.get_messages("missing", None).await,
            Err(KernelError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_plain_reply_is_stored() {
        let provider = Arc::new(MockLlmProvider::new(vec![MockLlmTurn::text("Hello!")]));
        let service = service_with(Arc::clone(&provider), KernelSettings::default());
        let chat_id = new_chat(&service).await;
        service
            .store()
            .add_message(&chat_id, ChatRole::User, "hi".into())
            .await
            .unwrap();

        let reply = service.request_llm_reply(&chat_id, None).await.unwrap();
        assert_eq!(reply, "Hello!");

        let history = service.store().get_messages(&chat_id, None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, ChatRole::Assistant);
        assert_eq!(history[1].content, "Hello!");
        assert_eq!(provider.captured_messages()[0], vec![LlmMessage::user("hi")]);
    }

    #[tokio::test]
    async fn test_failed_tool_is_reported_to_model() {
        let provider = Arc::new(MockLlmProvider::new(vec![
            MockLlmTurn::tool_calls(vec![MockToolCall::with_id(
                "call_1",
                "lights_on",
                json!({"room": "kitchen"}),
            )]),
            MockLlmTurn::text("Sorry, the lights skill is not available."),
        ]));
        let service = service_with(Arc::clone(&provider), KernelSettings::default());
        let chat_id = new_chat(&service).await;

        let reply = service.request_llm_reply(&chat_id, None).await.unwrap();
        assert_eq!(reply, "Sorry, the lights skill is not available.");

        // The second completion saw the call and its failure.
        let calls = provider.captured_messages();
        assert_eq!(calls.len(), 2);
        let MessageContent::ToolResult(result) = &calls[1].last().unwrap().content else {
            panic!("expected tool result");
        };
        assert_eq!(result.call_id, "call_1");
        assert!(result.is_error);
        assert!(result.content.contains("unknown skill 'lights_on'"));
    }

    #[tokio::test]
    async fn test_round_limit() {
        let looping = || MockLlmTurn::tool_calls(vec![MockToolCall::new("missing", json!({}))]);
        let provider = Arc::new(MockLlmProvider::new(vec![looping(), looping(), looping()]));
        let service = service_with(provider, KernelSettings::default().with_max_tool_rounds(2));
        let chat_id = new_chat(&service).await;

        let err = service.request_llm_reply(&chat_id, None).await.unwrap_err();
        assert!(matches!(err, KernelError::Downstream(_)));
        assert!(service.store().get_messages(&chat_id, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_error_is_downstream() {
        let provider = Arc::new(MockLlmProvider::new(vec![MockLlmTurn::error("502 bad gateway")]));
        let service = service_with(provider, KernelSettings::default());
        let chat_id = new_chat(&service).await;

        let err = service.request_llm_reply(&chat_id, None).await.unwrap_err();
        assert!(matches!(err, KernelError::Downstream(ref m) if m.contains("502")));
    }

    #[tokio::test]
    async fn test_request_budget() {
        let provider = Arc::new(
            MockLlmProvider::new(vec![MockLlmTurn::text("late")])
                .with_delay(Duration::from_millis(500)),
        );
        let settings =
            KernelSettings::default().with_chat_request_timeout(Duration::from_millis(50));
        let service = service_with(provider, settings);
        let chat_id = new_chat(&service).await;

        let err = service.request_llm_reply(&chat_id, None).await.unwrap_err();
        assert!(matches!(err, KernelError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_provider_selection() {
        let provider = Arc::new(MockLlmProvider::new(Vec::new()));
        let service = service_with(provider, KernelSettings::default());
        assert!(matches!(
            service.request_llm_reply("any", Some("nope")).await,
            Err(KernelError::InvalidRequest(_))
        ));

        let skills = Arc::new(SkillRegistry::new(Arc::new(PluginRegistry::new())));
        let bare = ChatService::new(
            Arc::new(MemoryChatStore::new()),
            skills,
            KernelSettings::default(),
        );
        assert!(matches!(
            bare.request_llm_reply("any", None).await,
            Err(KernelError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_providers_from_config() {
        let section: LlmSection = serde_json::from_value(json!({
            "default_provider": "local",
            "providers": [
                {"name": "local", "base_url": "http://127.0.0.1:11434/v1", "model": "llama3"}
            ]
        }))
        .unwrap();
        let providers = providers_from_config(&section);
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name(), "local");
        assert_eq!(providers[0].model(), "llama3");
    }
}
