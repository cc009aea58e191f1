//! Skill descriptors.
//!
//! A skill is a named function a plugin exposes to the LLM function-calling
//! loop. The descriptor is what the plugin declares; the host renders it as a
//! JSON Schema object when building the tool list for the model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};

/// Maximum length of a skill name. Most providers cap tool names at 64.
pub const MAX_SKILL_NAME_LEN: usize = 64;

/// JSON Schema primitive type of a parameter or config field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// UTF-8 string.
    #[default]
    String,
    /// Any JSON number.
    Number,
    /// Integral JSON number.
    Integer,
    /// `true` or `false`.
    Boolean,
    /// JSON object.
    Object,
    /// JSON array.
    Array,
}

impl ParamType {
    /// The JSON Schema name of this type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    /// Whether `value` is an instance of this type.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

/// One declared parameter of a skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillParameter {
    /// Parameter name.
    pub name: String,
    /// Parameter type.
    #[serde(rename = "type", default)]
    pub param_type: ParamType,
    /// Description shown to the model.
    #[serde(default)]
    pub description: String,
    /// Whether the model must supply it.
    #[serde(default)]
    pub required: bool,
}

impl SkillParameter {
    /// A required parameter.
    #[must_use]
    pub fn required(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
        }
    }

    /// An optional parameter.
    #[must_use]
    pub fn optional(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }
}

/// A skill as declared by its owning plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillDescriptor {
    /// Globally unique skill name.
    pub name: String,
    /// Description sent to the LLM.
    #[serde(default)]
    pub description: String,
    /// Ordered parameter list.
    #[serde(default)]
    pub parameters: Vec<SkillParameter>,
}

impl SkillDescriptor {
    /// Create a descriptor with no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Append a parameter.
    #[must_use]
    pub fn with_parameter(mut self, parameter: SkillParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Check the name and parameter list.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSkill`] if the name is empty, too long or
    /// contains characters outside `[A-Za-z0-9_-]`, or if two parameters share
    /// a name.
    pub fn validate(&self) -> CoreResult<()> {
        let invalid = |reason: &str| CoreError::InvalidSkill {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.is_empty() {
            return Err(invalid("name is empty"));
        }
        if self.name.len() > MAX_SKILL_NAME_LEN {
            return Err(invalid("name is too long"));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(invalid("name may only contain letters, digits, '_' and '-'"));
        }

        for (i, param) in self.parameters.iter().enumerate() {
            if param.name.is_empty() {
                return Err(invalid("parameter name is empty"));
            }
            if self.parameters[..i].iter().any(|p| p.name == param.name) {
                return Err(invalid(&format!("duplicate parameter '{}'", param.name)));
            }
        }

        Ok(())
    }

    /// Render the parameter list as a JSON Schema object.
    #[must_use]
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            let mut prop = Map::new();
            prop.insert("type".into(), Value::from(param.param_type.as_str()));
            if !param.description.is_empty() {
                prop.insert("description".into(), Value::from(param.description.clone()));
            }
            properties.insert(param.name.clone(), Value::Object(prop));
            if param.required {
                required.push(Value::from(param.name.clone()));
            }
        }

        let mut schema = Map::new();
        schema.insert("type".into(), Value::from("object"));
        schema.insert("properties".into(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".into(), Value::Array(required));
        }
        Value::Object(schema)
    }
}
