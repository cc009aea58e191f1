//! Configuration types for the Conduit host.
//!
//! Every struct implements [`Default`] with the same values as the embedded
//! `defaults.toml`, so a bare `[section]` header produces a working setup.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// File name of the listening socket inside the Conduit home directory.
pub const DEFAULT_SOCKET_NAME: &str = "conduit.sock";

/// Root configuration for the Conduit host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener and framing settings.
    pub server: ServerSection,
    /// Timeout budgets.
    pub timeouts: TimeoutsSection,
    /// LLM providers and the function-calling loop.
    pub llm: LlmSection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
}

/// Listener and framing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Unix socket plugins connect to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,
    /// Maximum encoded envelope size.
    pub max_frame_bytes: usize,
    /// Outbound frames buffered per plugin before senders wait.
    pub outbound_queue: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            socket_path: None,
            max_frame_bytes: 10 * 1024 * 1024,
            outbound_queue: 256,
        }
    }
}

impl ServerSection {
    /// The configured socket path, or `conduit.sock` relative to the
    /// working directory when none was resolved.
    #[must_use]
    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_NAME))
    }
}

/// Timeout budgets, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsSection {
    /// Time a new connection has to send its registration.
    pub handshake_secs: u64,
    /// Time a plugin has to answer one skill invocation.
    pub skill_call_secs: u64,
    /// Overall deadline for one LLM chat reply, tool calls included.
    pub chat_request_secs: u64,
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            handshake_secs: 10,
            skill_call_secs: 30,
            chat_request_secs: 120,
        }
    }
}

impl TimeoutsSection {
    /// Handshake deadline.
    #[must_use]
    pub fn handshake(&self) -> Duration {
        Duration::from_secs(self.handshake_secs)
    }

    /// Per-skill-call deadline.
    #[must_use]
    pub fn skill_call(&self) -> Duration {
        Duration::from_secs(self.skill_call_secs)
    }

    /// Whole-chat-reply deadline.
    #[must_use]
    pub fn chat_request(&self) -> Duration {
        Duration::from_secs(self.chat_request_secs)
    }
}

/// LLM settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// Provider used when a chat request names none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<String>,
    /// Upper bound on model/tool round trips per reply.
    pub max_tool_rounds: u32,
    /// System prompt prepended to every conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Configured providers.
    pub providers: Vec<ProviderSection>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            default_provider: None,
            max_tool_rounds: 8,
            system_prompt: None,
            providers: Vec::new(),
        }
    }
}

impl LlmSection {
    /// Look up a provider by name.
    #[must_use]
    pub fn provider(&self, name: &str) -> Option<&ProviderSection> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Name of the provider to use when none is requested: the configured
    /// default, else the first provider.
    #[must_use]
    pub fn default_provider_name(&self) -> Option<&str> {
        self.default_provider
            .as_deref()
            .or_else(|| self.providers.first().map(|p| p.name.as_str()))
    }
}

/// One OpenAI-compatible chat-completions endpoint.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    /// Name chat requests refer to.
    pub name: String,
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// API key. Never serialized back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Maximum tokens per completion.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_url: String::new(),
            model: String::new(),
            api_key: None,
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

impl fmt::Debug for ProviderSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSection")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Level filter (e.g. `info`, `debug`).
    pub level: String,
    /// One of `pretty`, `compact`, `json`, `full`.
    pub format: String,
    /// Per-crate directives, e.g. `conduit_kernel=debug`.
    pub directives: Vec<String>,
    /// Write rolling log files here instead of stderr.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            directives: Vec::new(),
            directory: None,
        }
    }
}
