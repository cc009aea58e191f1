//! Prelude module - commonly used types for convenient import.
//!
//! Use `use conduit_sdk::prelude::*;` to import all essential types.

pub use crate::{
    ClientConfig, ConfigUpdate, PluginClient, SdkError, SdkResult, SkillHandler, Subscription,
};

pub use conduit_core::{
    ChatRole, ConfigField, ConfigSchema, Event, ParamType, RegisterRequest, SkillDescriptor,
    SkillParameter,
};
