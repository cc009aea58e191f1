//! Conduit Core - identifiers and wire protocol shared by the host and plugins.
//!
//! This crate provides:
//! - Typed identifiers (`SessionId`, `CorrelationId`, `SubscriptionId`)
//! - The framed wire message (`Envelope`) and every message kind (`Message`)
//! - Skill descriptors and their JSON Schema rendering
//! - Event, storage, config and chat payload types
//!
//! Nothing here depends on an async runtime, so plugin authors can share
//! these types without pulling in the host.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod chat;
pub mod config;
pub mod error;
pub mod event;
pub mod ids;
pub mod protocol;
pub mod skill;
pub mod storage;

pub use chat::{ChatInfo, ChatMessage, ChatRole};
pub use config::{ConfigField, ConfigSchema};
pub use error::{CoreError, CoreResult};
pub use event::{Event, EventMetadata};
pub use ids::{CorrelationId, SessionId, SubscriptionId};
pub use protocol::{Envelope, ErrorCode, ErrorPayload, Message, RegisterRequest};
pub use skill::{ParamType, SkillDescriptor, SkillParameter};
pub use storage::{Row, StorageOperation};
