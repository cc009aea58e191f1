//! Test fixtures.

use conduit_core::{ConfigField, ConfigSchema, Event, ParamType, SkillDescriptor, SkillParameter};
use serde_json::json;

/// The `mqtt_publish` skill: `topic` (required) and `payload`.
#[must_use]
pub fn mqtt_publish_skill() -> SkillDescriptor {
    SkillDescriptor::new("mqtt_publish", "Publish a message to an MQTT topic")
        .with_parameter(SkillParameter::required(
            "topic",
            ParamType::String,
            "Topic to publish to",
        ))
        .with_parameter(SkillParameter::optional(
            "payload",
            ParamType::String,
            "Message body",
        ))
}

/// A parameterless skill with the given name.
#[must_use]
pub fn simple_skill(name: &str) -> SkillDescriptor {
    SkillDescriptor::new(name, format!("Test skill {name}"))
}

/// Config schema of the MQTT plugin: `broker`, `port` and `username`.
#[must_use]
pub fn mqtt_config_schema() -> ConfigSchema {
    ConfigSchema::default()
        .with_field(
            ConfigField::new("broker", ParamType::String, "Broker host").with_default("localhost"),
        )
        .with_field(ConfigField::new("port", ParamType::Integer, "Broker port").with_default(1883))
        .with_field(ConfigField::new("username", ParamType::String, "Login"))
}

/// A `chat.message.received` event carrying `text`.
#[must_use]
pub fn chat_message_event(chat_id: &str, text: &str) -> Event {
    Event::from_value(
        "chat.message.received",
        json!({"chat_id": chat_id, "text": text}),
    )
}
