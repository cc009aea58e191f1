//! Events carried by the event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Metadata stamped on every event at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Who emitted it: a plugin name, or `host` for kernel lifecycle events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl EventMetadata {
    /// Fresh metadata with no source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: None,
        }
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// A typed, dot-segmented notification.
///
/// Events are immutable once published; the bus shares them between
/// deliveries behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Dot-segmented type, e.g. `chat.message.received`.
    pub event_type: String,
    /// Opaque key/value payload.
    #[serde(default)]
    pub payload: Map<String, Value>,
    /// Event metadata.
    #[serde(default)]
    pub metadata: EventMetadata,
}

impl Event {
    /// Create an event with fresh metadata.
    #[must_use]
    pub fn new(event_type: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            metadata: EventMetadata::new(),
        }
    }

    /// Create an event from a JSON value; non-object values become an empty payload.
    #[must_use]
    pub fn from_value(event_type: impl Into<String>, payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(event_type, payload)
    }

    /// Set the event source.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata.source = Some(source.into());
        self
    }

    /// Source of the event, if known.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.metadata.source.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value() {
        let event = Event::from_value("chat.message.received", json!({"text": "hi"}))
            .with_source("telegram");
        assert_eq!(event.payload.get("text"), Some(&json!("hi")));
        assert_eq!(event.source(), Some("telegram"));

        let event = Event::from_value("mqtt.connected", json!("not an object"));
        assert!(event.payload.is_empty());
    }

    #[test]
    fn test_metadata_defaults_when_absent() {
        let event: Event = serde_json::from_value(json!({"event_type": "a.b"})).unwrap();
        assert_eq!(event.event_type, "a.b");
        assert!(event.payload.is_empty());
        assert!(event.source().is_none());
    }
}
