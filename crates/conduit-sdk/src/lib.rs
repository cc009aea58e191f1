//! Conduit SDK - write plugins that talk to the Conduit host.
//!
//! A plugin connects to the host's Unix socket, registers under a unique
//! name and then:
//! - offers skills the model can call ([`PluginClient::register_skill`])
//! - subscribes to and emits events ([`PluginClient::subscribe`],
//!   [`PluginClient::emit`])
//! - uses host services: storage, plugin config and chats
//!
//! # Example
//!
//! ```rust,no_run
//! use conduit_core::{ParamType, RegisterRequest, SkillDescriptor, SkillParameter};
//! use conduit_sdk::PluginClient;
//! use serde_json::{Value, json};
//!
//! # async fn example() -> conduit_sdk::SdkResult<()> {
//! let request = RegisterRequest::new("mqtt", "0.1.0").with_description("MQTT bridge");
//! let client = PluginClient::connect_unix("/run/conduit/conduit.sock", request).await?;
//!
//! let publish = SkillDescriptor::new("mqtt_publish", "Publish to an MQTT topic")
//!     .with_parameter(SkillParameter::required("topic", ParamType::String, "Topic"));
//! client
//!     .register_skill(publish, |args: Value| async move {
//!         let topic = args["topic"].as_str().unwrap_or_default().to_string();
//!         Ok::<_, String>(format!("published to {topic}"))
//!     })
//!     .await?;
//!
//! let mut chats = client.subscribe(["chat.message.*"]).await?;
//! while let Some(event) = chats.recv().await {
//!     client.emit("mqtt.seen", json!({"type": event.event_type})).await?;
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod client;
mod error;
mod services;
mod skill;
mod subscription;

pub use client::{
    ClientConfig, ConfigUpdate, DEFAULT_CALL_TIMEOUT, DEFAULT_CHAT_TIMEOUT, PluginClient,
};
pub use error::{SdkError, SdkResult};
pub use skill::SkillHandler;
pub use subscription::{SUBSCRIPTION_BUFFER, Subscription};
