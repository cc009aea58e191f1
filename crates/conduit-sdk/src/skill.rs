//! Skill handlers.

use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;

/// Executes one skill when the host invokes it.
///
/// `Ok` output is handed to the model as the tool result. `Err` is reported
/// as a skill failure; the model sees the message.
///
/// Any `Fn(Value) -> impl Future<Output = Result<String, String>>` closure
/// is a handler:
///
/// ```rust
/// use conduit_sdk::SkillHandler;
/// use serde_json::Value;
///
/// fn assert_handler(_: impl SkillHandler) {}
/// assert_handler(|args: Value| async move {
///     let topic = args["topic"].as_str().ok_or("topic is required")?;
///     Ok::<_, String>(format!("published to {topic}"))
/// });
/// ```
#[async_trait]
pub trait SkillHandler: Send + Sync + 'static {
    /// Run the skill with the arguments chosen by the model.
    async fn call(&self, arguments: Value) -> Result<String, String>;
}

#[async_trait]
impl<F, Fut> SkillHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, String>> + Send,
{
    async fn call(&self, arguments: Value) -> Result<String, String> {
        self(arguments).await
    }
}
