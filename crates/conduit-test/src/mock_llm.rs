//! Scripted LLM provider.
//!
//! [`MockLlmProvider`] answers each completion with the next queued
//! [`MockLlmTurn`] and records what the chat loop sent it, so tests can
//! drive tool calling against real plugins without a model.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use conduit_llm::{
    LlmError, LlmProvider, LlmResponse, LlmResult, LlmToolDefinition, Message, ToolCall,
};

/// One scripted model answer.
#[derive(Debug, Clone)]
pub enum MockLlmTurn {
    /// Final text.
    Text(String),
    /// Ask for skills to be run.
    ToolCalls(Vec<MockToolCall>),
    /// Fail the completion.
    Error(String),
}

impl MockLlmTurn {
    /// Final text answer.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Tool-call answer.
    #[must_use]
    pub fn tool_calls(calls: Vec<MockToolCall>) -> Self {
        Self::ToolCalls(calls)
    }

    /// Provider failure.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    fn into_response(self) -> LlmResult<LlmResponse> {
        match self {
            Self::Text(text) => Ok(LlmResponse::text(text)),
            Self::ToolCalls(calls) => Ok(LlmResponse::tool_calls(
                calls.into_iter().map(MockToolCall::into_call).collect(),
            )),
            Self::Error(message) => Err(LlmError::ApiRequestFailed(message)),
        }
    }
}

/// A skill call requested by [`MockLlmTurn::ToolCalls`].
#[derive(Debug, Clone)]
pub struct MockToolCall {
    /// Call id echoed in the tool result.
    pub id: String,
    /// Skill name, e.g. `mqtt_publish`.
    pub name: String,
    /// Arguments object.
    pub arguments: Value,
}

impl MockToolCall {
    /// A call with a random id.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self::with_id(format!("call_{}", Uuid::new_v4().simple()), name, arguments)
    }

    /// A call with a fixed id, for asserting on tool results.
    #[must_use]
    pub fn with_id(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    fn into_call(self) -> ToolCall {
        ToolCall::new(self.id, self.name).with_arguments(self.arguments)
    }
}

/// What one completion was given.
#[derive(Debug, Clone)]
struct Recorded {
    messages: Vec<Message>,
    tools: Vec<LlmToolDefinition>,
}

#[derive(Debug, Default)]
struct Script {
    turns: VecDeque<MockLlmTurn>,
    calls: Vec<Recorded>,
}

/// [`LlmProvider`] named `mock` that replays a fixed script.
///
/// Running out of turns fails the completion.
#[derive(Debug)]
pub struct MockLlmProvider {
    script: Mutex<Script>,
    delay: Option<Duration>,
}

impl MockLlmProvider {
    /// A provider that answers with `turns` in order.
    #[must_use]
    pub fn new(turns: Vec<MockLlmTurn>) -> Self {
        Self {
            script: Mutex::new(Script {
                turns: turns.into(),
                calls: Vec::new(),
            }),
            delay: None,
        }
    }

    /// Wait `delay` before every answer.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Completions requested so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.script().calls.len()
    }

    /// Conversation sent on each completion, oldest first.
    #[must_use]
    pub fn captured_messages(&self) -> Vec<Vec<Message>> {
        self.script()
            .calls
            .iter()
            .map(|call| call.messages.clone())
            .collect()
    }

    /// Skills offered on each completion, oldest first.
    #[must_use]
    pub fn captured_tools(&self) -> Vec<Vec<LlmToolDefinition>> {
        self.script()
            .calls
            .iter()
            .map(|call| call.tools.clone())
            .collect()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[LlmToolDefinition],
        _system: &str,
    ) -> LlmResult<LlmResponse> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let turn = {
            let mut script = self.script();
            script.calls.push(Recorded {
                messages: messages.to_vec(),
                tools: tools.to_vec(),
            });
            script.turns.pop_front()
        };
        match turn {
            Some(turn) => turn.into_response(),
            None => Err(LlmError::ApiRequestFailed(
                "mock provider script exhausted".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_replays_script_then_fails() {
        let provider = MockLlmProvider::new(vec![
            MockLlmTurn::tool_calls(vec![MockToolCall::with_id(
                "call_1",
                "mqtt_publish",
                json!({"topic": "home/light"}),
            )]),
            MockLlmTurn::text("Light is on."),
        ]);
        let tools = [LlmToolDefinition::new("mqtt_publish")];

        let first = provider
            .complete(&[Message::user("light on")], &tools, "")
            .await
            .unwrap();
        let calls = first.message.tool_calls().unwrap();
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].arguments["topic"], "home/light");

        let second = provider.complete(&[], &[], "").await.unwrap();
        assert_eq!(second.message.text_content(), Some("Light is on."));

        assert!(provider.complete(&[], &[], "").await.is_err());
        assert_eq!(provider.call_count(), 3);
        assert_eq!(provider.captured_messages()[0].len(), 1);
        assert_eq!(provider.captured_tools()[0][0].name, "mqtt_publish");
    }

    #[tokio::test]
    async fn test_error_turn() {
        let provider = MockLlmProvider::new(vec![MockLlmTurn::error("rate limited")]);
        let err = provider.complete(&[], &[], "").await.unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn test_generated_call_ids_differ() {
        let a = MockToolCall::new("x", json!({}));
        let b = MockToolCall::new("x", json!({}));
        assert_ne!(a.id, b.id);
    }
}
