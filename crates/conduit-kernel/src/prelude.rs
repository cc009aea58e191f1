//! Prelude module - commonly used types for convenient import.
//!
//! Use `use conduit_kernel::prelude::*;` to import all essential types.

pub use crate::{
    ChatService, ChatStore, ConnectionManager, Kernel, KernelBuilder, KernelError, KernelResult,
    KernelSettings, MemoryChatStore, PluginRegistry, PluginSession, SessionState,
    SkillDefinition, SkillRegistry,
};
