//! Conversation and tool types exchanged with providers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message in the conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message role.
    pub role: MessageRole,
    /// Message content.
    pub content: MessageContent,
}

impl Message {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(MessageRole::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(MessageRole::Assistant, content)
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(MessageRole::System, content)
    }

    fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create an assistant message that requests tool calls.
    #[must_use]
    pub fn assistant_with_tools(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: MessageContent::ToolCalls(tool_calls),
        }
    }

    /// Create a tool result message.
    #[must_use]
    pub fn tool_result(result: ToolCallResult) -> Self {
        Self {
            role: MessageRole::Tool,
            content: MessageContent::ToolResult(result),
        }
    }

    /// Text content, if this is a text message.
    #[must_use]
    pub fn text_content(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Requested tool calls, if any.
    #[must_use]
    pub fn tool_calls(&self) -> Option<&[ToolCall]> {
        match &self.content {
            MessageContent::ToolCalls(calls) => Some(calls),
            _ => None,
        }
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Instructions.
    System,
    /// End user.
    User,
    /// The model.
    Assistant,
    /// Output of a tool call.
    Tool,
}

impl MessageRole {
    /// Wire name used by chat-completions APIs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// Message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text.
    Text(String),
    /// Tool calls requested by the model.
    ToolCalls(Vec<ToolCall>),
    /// Result of one tool call.
    ToolResult(ToolCallResult),
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID assigned by the provider.
    pub id: String,
    /// Tool (skill) name.
    pub name: String,
    /// Arguments as a JSON object.
    pub arguments: Value,
}

impl ToolCall {
    /// Create a call with empty arguments.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: Value::Object(serde_json::Map::new()),
        }
    }

    /// Set arguments.
    #[must_use]
    pub fn with_arguments(mut self, args: Value) -> Self {
        self.arguments = args;
        self
    }
}

/// Result of a tool call, fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Call ID this answers.
    pub call_id: String,
    /// Output, or the failure description.
    pub content: String,
    /// Whether the call failed.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// A successful result.
    pub fn success(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// A failed result. The model sees `error` as the tool output.
    pub fn error(call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: error.into(),
            is_error: true,
        }
    }
}

/// Tool definition offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmToolDefinition {
    /// Tool name.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// JSON Schema for the arguments.
    pub input_schema: Value,
}

impl LlmToolDefinition {
    /// Create a definition with an empty object schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    /// Set description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set input schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }
}

/// A complete (non-streaming) model response.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The assistant message.
    pub message: Message,
    /// Why generation stopped.
    pub stop_reason: StopReason,
    /// Token usage.
    pub usage: Usage,
}

impl LlmResponse {
    /// A plain text answer.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            message: Message::assistant(content),
            stop_reason: StopReason::EndTurn,
            usage: Usage::default(),
        }
    }

    /// A response requesting tool calls.
    #[must_use]
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            message: Message::assistant_with_tools(calls),
            stop_reason: StopReason::ToolUse,
            usage: Usage::default(),
        }
    }

    /// Whether the model asked for at least one tool call.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        self.message.tool_calls().is_some_and(|c| !c.is_empty())
    }
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Natural end of response.
    EndTurn,
    /// Hit the token limit.
    MaxTokens,
    /// Tool use requested.
    ToolUse,
    /// Stopped by a content filter or stop sequence.
    StopSequence,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    /// Prompt tokens.
    pub input_tokens: usize,
    /// Completion tokens.
    pub output_tokens: usize,
}

impl Usage {
    /// Total tokens.
    #[must_use]
    pub fn total(&self) -> usize {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_accessors() {
        let user = Message::user("turn on the kitchen light");
        assert_eq!(user.role, MessageRole::User);
        assert_eq!(user.text_content(), Some("turn on the kitchen light"));
        assert!(user.tool_calls().is_none());

        let call = ToolCall::new("call_1", "mqtt_publish")
            .with_arguments(json!({"topic": "home/kitchen/light", "payload": "on"}));
        let assistant = Message::assistant_with_tools(vec![call.clone()]);
        assert_eq!(assistant.tool_calls(), Some(&[call][..]));
        assert!(assistant.text_content().is_none());
    }

    #[test]
    fn test_response_tool_detection() {
        assert!(!LlmResponse::text("done").has_tool_calls());
        assert!(!LlmResponse::tool_calls(Vec::new()).has_tool_calls());
        assert!(LlmResponse::tool_calls(vec![ToolCall::new("1", "x")]).has_tool_calls());
    }

    #[test]
    fn test_tool_result() {
        assert!(!ToolCallResult::success("1", "published").is_error);
        let failed = ToolCallResult::error("1", "skill 'mqtt_publish' timed out after 30s");
        assert!(failed.is_error);
        assert!(failed.content.contains("timed out"));
    }

    #[test]
    fn test_usage_total_saturates() {
        let usage = Usage {
            input_tokens: usize::MAX,
            output_tokens: 1,
        };
        assert_eq!(usage.total(), usize::MAX);
    }
}
