//! Conduit LLM - provider abstraction used to answer chat requests.
//!
//! The host builds one [`LlmProvider`] per configured endpoint and runs the
//! function-calling loop on top of [`LlmProvider::complete`]. Registered
//! skills reach the model as [`LlmToolDefinition`]s.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod openai_compat;
mod provider;
mod types;

pub use error::{LlmError, LlmResult};
pub use openai_compat::OpenAiCompatProvider;
pub use provider::LlmProvider;
pub use types::{
    LlmResponse, LlmToolDefinition, Message, MessageContent, MessageRole, StopReason, ToolCall,
    ToolCallResult, Usage,
};
