//! Prelude module - commonly used types for convenient import.
//!
//! Use `use conduit_llm::prelude::*;` to import all essential types.

// Errors
pub use crate::{LlmError, LlmResult};

// Providers
pub use crate::{LlmProvider, OpenAiCompatProvider};

// Conversation types
pub use crate::{LlmResponse, Message, MessageContent, MessageRole, StopReason, Usage};

// Tool types
pub use crate::{LlmToolDefinition, ToolCall, ToolCallResult};
