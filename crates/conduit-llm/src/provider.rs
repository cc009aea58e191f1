//! LLM provider trait.

use async_trait::async_trait;

use crate::error::LlmResult;
use crate::types::{LlmResponse, LlmToolDefinition, Message};

/// A chat-completions backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name, as referenced by chat requests.
    fn name(&self) -> &str;

    /// Model identifier.
    fn model(&self) -> &str;

    /// Run one completion over `messages`, offering `tools`.
    ///
    /// `system` is prepended as the system prompt when non-empty.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[LlmToolDefinition],
        system: &str,
    ) -> LlmResult<LlmResponse>;
}

