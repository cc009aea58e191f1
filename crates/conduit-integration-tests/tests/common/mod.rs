//! Shared harness: a kernel listening on a socket in a temp directory, with
//! a scripted LLM provider.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use conduit_core::RegisterRequest;
use conduit_kernel::{Kernel, KernelSettings};
use conduit_llm::{MessageContent, ToolCallResult};
use conduit_sdk::{ClientConfig, PluginClient};
use conduit_test::{MockLlmProvider, MockLlmTurn, RawPlugin, socket_path_in, test_dir};
use tempfile::TempDir;
use tokio::net::UnixStream;

/// A listening kernel plus everything needed to attach plugins to it.
#[allow(dead_code)]
pub struct TestHost {
    /// The host.
    pub kernel: Kernel,
    /// Scripted provider behind every chat request.
    pub provider: Arc<MockLlmProvider>,
    /// Socket plugins connect to.
    pub socket: PathBuf,
    _dir: TempDir,
}

#[allow(dead_code)]
impl TestHost {
    /// Start a host whose model answers with `turns`.
    pub fn start(turns: Vec<MockLlmTurn>) -> Self {
        Self::start_with(turns, |settings| settings)
    }

    /// Start a host with adjusted settings.
    pub fn start_with(
        turns: Vec<MockLlmTurn>,
        configure: impl FnOnce(KernelSettings) -> KernelSettings,
    ) -> Self {
        conduit_test::setup_test_logging_default();
        let dir = test_dir();
        let socket = socket_path_in(&dir);
        let settings = configure(
            KernelSettings::default()
                .with_socket_path(&socket)
                .with_handshake_timeout(Duration::from_secs(2))
                .with_skill_call_timeout(Duration::from_secs(2)),
        );

        let provider = Arc::new(MockLlmProvider::new(turns));
        let kernel = Kernel::builder(settings)
            .with_provider(Arc::clone(&provider) as Arc<dyn conduit_llm::LlmProvider>)
            .build();
        kernel.listen_default().expect("kernel failed to listen");

        Self {
            kernel,
            provider,
            socket,
            _dir: dir,
        }
    }

    /// Connect and register a plugin through the SDK.
    pub async fn plugin(&self, name: &str) -> PluginClient {
        let config = ClientConfig::default()
            .with_call_timeout(Duration::from_secs(5))
            .with_chat_timeout(Duration::from_secs(10));
        PluginClient::connect_unix_with(&self.socket, RegisterRequest::new(name, "0.1.0"), config)
            .await
            .expect("plugin failed to register")
    }

    /// Open an unregistered raw connection.
    pub async fn raw(&self) -> RawPlugin<UnixStream> {
        let stream = UnixStream::connect(&self.socket)
            .await
            .expect("failed to connect to host socket");
        RawPlugin::new(stream)
    }
}

/// Tool results the model was shown on its `call`-th completion.
#[allow(dead_code)]
pub fn tool_results_seen(provider: &MockLlmProvider, call: usize) -> Vec<ToolCallResult> {
    provider
        .captured_messages()
        .get(call)
        .map(|messages| {
            messages
                .iter()
                .filter_map(|m| match &m.content {
                    MessageContent::ToolResult(result) => Some(result.clone()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}
