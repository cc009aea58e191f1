//! Prelude module - commonly used types for convenient import.
//!
//! Use `use conduit_core::prelude::*;` to import all essential types.

pub use crate::{
    ChatInfo, ChatMessage, ChatRole, ConfigField, ConfigSchema, CoreError, CoreResult,
    CorrelationId, Envelope, ErrorCode, ErrorPayload, Event, EventMetadata, Message, ParamType,
    RegisterRequest, Row, SessionId, SkillDescriptor, SkillParameter, StorageOperation,
    SubscriptionId,
};
