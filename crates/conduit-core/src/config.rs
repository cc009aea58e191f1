//! Plugin configuration schema payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::skill::ParamType;

/// One configurable field declared by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigField {
    /// Field key, unique within the plugin's namespace.
    pub key: String,
    /// Value type.
    #[serde(rename = "type", default)]
    pub field_type: ParamType,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Value used until one is set explicitly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ConfigField {
    /// Create a field without a default.
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        field_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            field_type,
            description: description.into(),
            default: None,
        }
    }

    /// Set the default value.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// The full set of fields a plugin exposes for configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSchema {
    /// Declared fields.
    #[serde(default)]
    pub fields: Vec<ConfigField>,
}

impl ConfigSchema {
    /// Append a field.
    #[must_use]
    pub fn with_field(mut self, field: ConfigField) -> Self {
        self.fields.push(field);
        self
    }

    /// Look up a field by key.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&ConfigField> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Check for empty or duplicate keys and defaults of the wrong type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSchema`] describing the first problem found.
    pub fn validate(&self) -> CoreResult<()> {
        for (i, field) in self.fields.iter().enumerate() {
            if field.key.is_empty() {
                return Err(CoreError::InvalidSchema("field key is empty".into()));
            }
            if self.fields[..i].iter().any(|f| f.key == field.key) {
                return Err(CoreError::InvalidSchema(format!(
                    "duplicate field '{}'",
                    field.key
                )));
            }
            if let Some(default) = &field.default
                && !field.field_type.accepts(default)
            {
                return Err(CoreError::InvalidSchema(format!(
                    "default for '{}' is not a {}",
                    field.key,
                    field.field_type.as_str()
                )));
            }
        }
        Ok(())
    }
}
