//! Skill registry: which plugin owns which skill, and how to call it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use conduit_core::{Message, SessionId, SkillDescriptor, SkillParameter};
use conduit_ipc::CallError;
use conduit_llm::LlmToolDefinition;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{KernelError, KernelResult};
use crate::registry::PluginRegistry;

#[derive(Debug, Clone)]
struct SkillEntry {
    descriptor: SkillDescriptor,
    owner: SessionId,
}

/// A registered skill as offered to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillDefinition {
    /// Skill name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Declared parameters.
    pub parameters: Vec<SkillParameter>,
}

impl From<&SkillDescriptor> for SkillDefinition {
    fn from(descriptor: &SkillDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            parameters: descriptor.parameters.clone(),
        }
    }
}

/// Global skill table.
///
/// Names are unique across live plugins. A name owned by a session that is
/// no longer live can be claimed by anyone; the stale entry is replaced.
/// When both locks are needed the skill table is taken before the session
/// registry.
#[derive(Debug)]
pub struct SkillRegistry {
    skills: RwLock<HashMap<String, SkillEntry>>,
    sessions: Arc<PluginRegistry>,
}

impl SkillRegistry {
    /// Create an empty table resolving owners through `sessions`.
    #[must_use]
    pub fn new(sessions: Arc<PluginRegistry>) -> Self {
        Self {
            skills: RwLock::new(HashMap::new()),
            sessions,
        }
    }

    /// Register `descriptor` for `owner`.
    ///
    /// Re-registering a name the same session already owns replaces the
    /// descriptor.
    ///
    /// # Errors
    ///
    /// - [`KernelError::InvalidRequest`] if the descriptor is malformed
    /// - [`KernelError::DuplicateName`] if another live session owns the name
    /// - [`KernelError::SkillOwnerUnavailable`] if `owner` is no longer live
    pub async fn register(
        &self,
        owner: SessionId,
        descriptor: SkillDescriptor,
    ) -> KernelResult<()> {
        descriptor
            .validate()
            .map_err(|e| KernelError::InvalidRequest(e.to_string()))?;

        let mut skills = self.skills.write().await;
        // Disconnect marks the owner dead before it purges under this lock.
        if !self.sessions.is_live(owner).await {
            return Err(KernelError::SkillOwnerUnavailable(format!(
                "session {owner} is not live"
            )));
        }
        if let Some(existing) = skills.get(&descriptor.name)
            && existing.owner != owner
        {
            if let Some(holder) = self.sessions.get(existing.owner).await
                && holder.is_live()
            {
                return Err(KernelError::DuplicateName {
                    name: descriptor.name,
                    owner: holder.name().to_string(),
                });
            }
            debug!(
                skill = %descriptor.name,
                stale_owner = %existing.owner,
                "replacing stale skill"
            );
        }

        info!(skill = %descriptor.name, %owner, "skill registered");
        skills.insert(descriptor.name.clone(), SkillEntry { descriptor, owner });
        Ok(())
    }

    /// Remove every skill owned by `owner`. Returns how many were removed.
    pub async fn unregister_owner(&self, owner: SessionId) -> usize {
        let mut skills = self.skills.write().await;
        let before = skills.len();
        skills.retain(|_, entry| entry.owner != owner);
        let removed = before.saturating_sub(skills.len());
        if removed > 0 {
            debug!(%owner, removed, "skills unregistered");
        }
        removed
    }

    /// Session that owns `name`.
    pub async fn owner(&self, name: &str) -> Option<SessionId> {
        self.skills.read().await.get(name).map(|e| e.owner)
    }

    /// Number of entries, stale ones included.
    pub async fn len(&self) -> usize {
        self.skills.read().await.len()
    }

    /// Whether the table is empty.
    pub async fn is_empty(&self) -> bool {
        self.skills.read().await.is_empty()
    }

    /// Invoke `name` on its owner and wait for the result text.
    ///
    /// No lock is held while waiting for the plugin.
    ///
    /// # Errors
    ///
    /// - [`KernelError::UnknownSkill`] if nothing is registered under `name`
    /// - [`KernelError::SkillOwnerUnavailable`] if the owner is gone
    /// - [`KernelError::Timeout`] if the owner does not answer in time
    /// - [`KernelError::SessionClosed`] if the owner disconnects mid-call
    /// - [`KernelError::SkillFailed`] if the skill reports an error
    /// - [`KernelError::ProtocolViolation`] if the owner answers with an
    ///   unrelated message
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> KernelResult<String> {
        let owner = self
            .owner(name)
            .await
            .ok_or_else(|| KernelError::UnknownSkill(name.to_string()))?;
        let session = match self.sessions.get(owner).await {
            Some(session) if session.is_live() => session,
            _ => return Err(KernelError::SkillOwnerUnavailable(name.to_string())),
        };

        debug!(skill = name, plugin = session.name(), "invoking skill");
        let request = Message::SkillInvoke {
            name: name.to_string(),
            arguments,
        };
        let reply = session.call(request, timeout).await.map_err(|e| match e {
            CallError::Timeout(after) => KernelError::Timeout {
                operation: format!("skill '{name}'"),
                after,
            },
            CallError::SessionClosed | CallError::Transport(_) => KernelError::SessionClosed,
        })?;

        match reply {
            Message::SkillResult { output, error: None } => Ok(output),
            Message::SkillResult {
                error: Some(message),
                ..
            } => Err(KernelError::SkillFailed {
                name: name.to_string(),
                message,
            }),
            Message::Error(payload) => Err(KernelError::SkillFailed {
                name: name.to_string(),
                message: payload.message,
            }),
            other => {
                warn!(skill = name, kind = other.kind(), "unexpected reply to skill_invoke");
                Err(KernelError::ProtocolViolation(format!(
                    "expected skill_result, got {}",
                    other.kind()
                )))
            },
        }
    }

    /// Skills whose owners are live, sorted by name.
    pub async fn snapshot(&self) -> Vec<SkillDefinition> {
        let entries: Vec<SkillEntry> = self.skills.read().await.values().cloned().collect();
        let mut live = Vec::with_capacity(entries.len());
        for entry in entries {
            if self.sessions.is_live(entry.owner).await {
                live.push(SkillDefinition::from(&entry.descriptor));
            }
        }
        live.sort_by(|a, b| a.name.cmp(&b.name));
        live
    }

    /// Live skills rendered as LLM tool definitions.
    pub async fn tool_definitions(&self) -> Vec<LlmToolDefinition> {
        let entries: Vec<SkillEntry> = self.skills.read().await.values().cloned().collect();
        let mut tools = Vec::with_capacity(entries.len());
        for entry in entries {
            if !self.sessions.is_live(entry.owner).await {
                continue;
            }
            let descriptor = &entry.descriptor;
            let mut tool = LlmToolDefinition::new(descriptor.name.clone())
                .with_schema(descriptor.input_schema());
            if !descriptor.description.is_empty() {
                tool = tool.with_description(descriptor.description.clone());
            }
            tools.push(tool);
        }
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }
}
