//! OpenAI-compatible chat-completions provider.
//!
//! Works with the `OpenAI` API and anything speaking the same protocol:
//! LM Studio, vLLM, Ollama and similar local servers.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{LlmError, LlmResult};
use crate::provider::LlmProvider;
use crate::types::{
    LlmResponse, LlmToolDefinition, Message, MessageContent, MessageRole, StopReason, ToolCall,
    Usage,
};

const COMPLETIONS_PATH: &str = "/chat/completions";

/// OpenAI-compatible provider.
pub struct OpenAiCompatProvider {
    client: Client,
    name: String,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f64,
}

impl OpenAiCompatProvider {
    /// Create a provider for `base_url` (e.g. `https://api.openai.com/v1`).
    /// A base URL that already ends in `/chat/completions` is used as is.
    #[must_use]
    pub fn new(name: impl Into<String>, base_url: &str, model: impl Into<String>) -> Self {
        let base = base_url.trim_end_matches('/');
        let endpoint = if base.ends_with(COMPLETIONS_PATH) {
            base.to_string()
        } else {
            format!("{base}{COMPLETIONS_PATH}")
        };
        Self {
            client: Client::new(),
            name: name.into(),
            endpoint,
            model: model.into(),
            api_key: None,
            max_tokens: 4096,
            temperature: 0.7,
        }
    }

    /// Set the bearer token.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set max tokens.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// The full chat-completions URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request(
        &self,
        messages: &[Message],
        tools: &[LlmToolDefinition],
        system: &str,
    ) -> Value {
        let mut wire_messages = Vec::with_capacity(messages.len().saturating_add(1));
        if !system.is_empty() {
            wire_messages.push(json!({"role": "system", "content": system}));
        }
        wire_messages.extend(messages.iter().map(convert_message));

        let mut request = json!({
            "model": self.model,
            "messages": wire_messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "stream": false,
        });

        if !tools.is_empty() {
            let wire_tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    // Strict servers reject function schemas without `properties`.
                    let mut parameters = t.input_schema.clone();
                    if let Some(obj) = parameters.as_object_mut() {
                        obj.entry("properties").or_insert_with(|| json!({}));
                    }
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": parameters,
                        }
                    })
                })
                .collect();
            request["tools"] = Value::Array(wire_tools);
        }

        request
    }
}

fn convert_message(msg: &Message) -> Value {
    match &msg.content {
        MessageContent::Text(text) => json!({"role": msg.role.as_str(), "content": text}),
        MessageContent::ToolCalls(calls) => {
            let tool_calls: Vec<Value> = calls
                .iter()
                .map(|tc| {
                    json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": tc.arguments.to_string(),
                        }
                    })
                })
                .collect();
            json!({"role": "assistant", "content": Value::Null, "tool_calls": tool_calls})
        },
        MessageContent::ToolResult(result) => json!({
            "role": "tool",
            "tool_call_id": result.call_id,
            "content": result.content,
        }),
    }
}

/// Local servers usually run without authentication.
fn is_local_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("localhost") || lower.contains("127.0.0.1") || lower.contains("[::1]")
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[LlmToolDefinition],
        system: &str,
    ) -> LlmResult<LlmResponse> {
        if self.api_key.as_ref().is_none_or(String::is_empty) && !is_local_url(&self.endpoint) {
            return Err(LlmError::ApiKeyNotConfigured {
                provider: self.name.clone(),
            });
        }

        let body = self.build_request(messages, tools, system);
        debug!(
            provider = %self.name,
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "requesting completion"
        );

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            let mut auth = reqwest::header::HeaderValue::try_from(format!("Bearer {api_key}"))
                .map_err(|e| {
                    LlmError::ApiRequestFailed(format!("Invalid API key characters: {e}"))
                })?;
            auth.set_sensitive(true);
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LlmError::ApiRequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status = %status, "completion request rejected");
            return Err(LlmError::InvalidResponse(format!(
                "HTTP {}: {body}",
                status.as_u16()
            )));
        }

        let response: WireResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        into_llm_response(response)
    }
}

fn into_llm_response(response: WireResponse) -> LlmResult<LlmResponse> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

    let content = match choice.message.tool_calls {
        Some(calls) if !calls.is_empty() => {
            let calls = calls
                .into_iter()
                .map(|tc| {
                    let arguments = if tc.function.arguments.trim().is_empty() {
                        json!({})
                    } else {
                        serde_json::from_str(&tc.function.arguments).map_err(|e| {
                            LlmError::InvalidResponse(format!("Invalid tool arguments JSON: {e}"))
                        })?
                    };
                    Ok(ToolCall {
                        id: tc.id,
                        name: tc.function.name,
                        arguments,
                    })
                })
                .collect::<LlmResult<Vec<_>>>()?;
            MessageContent::ToolCalls(calls)
        },
        _ => MessageContent::Text(choice.message.content.unwrap_or_default()),
    };

    let stop_reason = match choice.finish_reason.as_deref() {
        Some("length") => StopReason::MaxTokens,
        Some("tool_calls") => StopReason::ToolUse,
        Some("content_filter") => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    };

    let usage = response.usage.unwrap_or_default();
    Ok(LlmResponse {
        message: Message {
            role: MessageRole::Assistant,
            content,
        },
        stop_reason,
        usage: Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        },
    })
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("has_api_key", &self.api_key.is_some())
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunctionCall,
}

#[derive(Debug, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolCallResult;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer one HTTP request with `status` and `body`; yields the raw request.
    async fn serve_once(
        status: &'static str,
        body: String,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/v1", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if raw.len() >= end.saturating_add(4).saturating_add(length) {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).to_string()
        });
        (url, handle)
    }

    #[test]
    fn test_endpoint_resolution() {
        let p = OpenAiCompatProvider::new("openai", "https://api.openai.com/v1/", "gpt-4o");
        assert_eq!(p.endpoint(), "https://api.openai.com/v1/chat/completions");

        let p = OpenAiCompatProvider::new("lm", "http://localhost:1234/v1/chat/completions", "m");
        assert_eq!(p.endpoint(), "http://localhost:1234/v1/chat/completions");
    }

    #[test]
    fn test_build_request_with_tools() {
        let provider = OpenAiCompatProvider::new("local", "http://localhost:1234/v1", "qwen");
        let tools = vec![LlmToolDefinition::new("mqtt_publish").with_description("Publish")];
        let request = provider.build_request(&[Message::user("hi")], &tools, "Be brief");

        assert_eq!(request["model"], "qwen");
        let messages = request["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(request["tools"][0]["function"]["name"], "mqtt_publish");
        assert_eq!(request["tools"][0]["function"]["parameters"]["properties"], json!({}));
    }

    #[test]
    fn test_message_conversion() {
        let call = ToolCall::new("call_1", "mqtt_publish").with_arguments(json!({"topic": "t"}));
        let converted = convert_message(&Message::assistant_with_tools(vec![call]));
        assert_eq!(converted["tool_calls"][0]["function"]["arguments"], r#"{"topic":"t"}"#);

        let result = ToolCallResult::success("call_1", "ok");
        let converted = convert_message(&Message::tool_result(result));
        assert_eq!(converted["role"], "tool");
        assert_eq!(converted["tool_call_id"], "call_1");
    }

    #[tokio::test]
    async fn test_remote_endpoint_requires_key() {
        let provider = OpenAiCompatProvider::new("openai", "https://api.openai.com/v1", "gpt-4o");
        let err = provider.complete(&[], &[], "").await.unwrap_err();
        assert!(matches!(
            err,
            LlmError::ApiKeyNotConfigured { ref provider } if provider == "openai"
        ));
    }

    #[tokio::test]
    async fn test_invalid_api_key_characters() {
        let provider = OpenAiCompatProvider::new("local", "http://127.0.0.1:9/v1", "m")
            .with_api_key("bad\nkey");
        let err = provider.complete(&[], &[], "").await.unwrap_err();
        assert!(matches!(err, LlmError::ApiRequestFailed(ref m) if m.contains("Invalid API key")));
    }

    #[tokio::test]
    async fn test_complete_parses_tool_calls() {
        let body = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_7",
                        "type": "function",
                        "function": {"name": "mqtt_publish", "arguments": "{\"topic\":\"home/light\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5}
        })
        .to_string();
        let (url, server) = serve_once("200 OK", body).await;

        let provider = OpenAiCompatProvider::new("local", &url, "qwen").with_api_key("sk-test");
        let response = provider
            .complete(&[Message::user("light on")], &[], "")
            .await
            .unwrap();

        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert!(response.has_tool_calls());
        let calls = response.message.tool_calls().unwrap();
        assert_eq!(calls[0].name, "mqtt_publish");
        assert_eq!(calls[0].arguments, json!({"topic": "home/light"}));
        assert_eq!(response.usage.total(), 17);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/chat/completions"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer sk-test"));
    }

    #[tokio::test]
    async fn test_complete_surfaces_http_errors() {
        let (url, server) =
            serve_once("500 Internal Server Error", "{\"error\":\"boom\"}".into()).await;
        let provider = OpenAiCompatProvider::new("local", &url, "qwen");
        let err = provider.complete(&[Message::user("hi")], &[], "").await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(ref m) if m.starts_with("HTTP 500")));
        server.await.unwrap();
    }
}
