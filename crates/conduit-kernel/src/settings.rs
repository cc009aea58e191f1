//! Runtime settings for the kernel.

use std::path::PathBuf;
use std::time::Duration;

use conduit_config::Config;
use conduit_ipc::TransportConfig;

/// Settings the kernel runs with, resolved from [`Config`].
#[derive(Debug, Clone)]
pub struct KernelSettings {
    /// Socket path used by [`Kernel::listen_default`](crate::Kernel::listen_default).
    pub socket_path: PathBuf,
    /// Framing limits for every plugin connection.
    pub transport: TransportConfig,
    /// Time a new connection has to register.
    pub handshake_timeout: Duration,
    /// Time a plugin has to answer one skill invocation.
    pub skill_call_timeout: Duration,
    /// Budget for a whole `chat_llm_request`, tool rounds included.
    pub chat_request_timeout: Duration,
    /// Upper bound on model/tool round trips per reply.
    pub max_tool_rounds: u32,
    /// System prompt prepended to every conversation.
    pub system_prompt: String,
}

impl Default for KernelSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for KernelSettings {
    fn from(config: &Config) -> Self {
        Self {
            socket_path: config.server.socket_path(),
            transport: TransportConfig::default()
                .with_max_frame_bytes(config.server.max_frame_bytes)
                .with_outbound_queue(config.server.outbound_queue),
            handshake_timeout: config.timeouts.handshake(),
            skill_call_timeout: config.timeouts.skill_call(),
            chat_request_timeout: config.timeouts.chat_request(),
            max_tool_rounds: config.llm.max_tool_rounds,
            system_prompt: config.llm.system_prompt.clone().unwrap_or_default(),
        }
    }
}

impl KernelSettings {
    /// Set the socket path.
    #[must_use]
    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = path.into();
        self
    }

    /// Set the handshake timeout.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the per-invocation skill timeout.
    #[must_use]
    pub fn with_skill_call_timeout(mut self, timeout: Duration) -> Self {
        self.skill_call_timeout = timeout;
        self
    }

    /// Set the chat request budget.
    #[must_use]
    pub fn with_chat_request_timeout(mut self, timeout: Duration) -> Self {
        self.chat_request_timeout = timeout;
        self
    }

    /// Set the tool round limit.
    #[must_use]
    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    /// Set the system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Set the transport limits.
    #[must_use]
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.timeouts.skill_call_secs = 5;
        config.llm.max_tool_rounds = 3;
        config.llm.system_prompt = Some("You control a house.".into());
        config.server.max_frame_bytes = 4096;

        let settings = KernelSettings::from(&config);
        assert_eq!(settings.skill_call_timeout, Duration::from_secs(5));
        assert_eq!(settings.max_tool_rounds, 3);
        assert_eq!(settings.system_prompt, "You control a house.");
        assert_eq!(settings.transport.max_frame_bytes, 4096);
    }

    #[test]
    fn test_builders() {
        let settings = KernelSettings::default()
            .with_socket_path("/tmp/conduit-test.sock")
            .with_handshake_timeout(Duration::from_millis(50))
            .with_skill_call_timeout(Duration::from_millis(100));
        assert_eq!(settings.socket_path, PathBuf::from("/tmp/conduit-test.sock"));
        assert_eq!(settings.handshake_timeout, Duration::from_millis(50));
        assert_eq!(settings.skill_call_timeout, Duration::from_millis(100));
        assert!(settings.system_prompt.is_empty());
    }
}
