//! Seam between the connection manager and the transport.
//!
//! The manager never spawns processes or opens sockets itself; it asks an
//! [`McpConnector`] for a live, handshaken connection. Tests substitute an
//! in-memory one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use toolchat_core::{McpConnection, McpError, McpServerConfig, McpTransport};

use crate::client::{DEFAULT_REQUEST_TIMEOUT, McpClient};
use crate::commands::CommandAliases;
use crate::env::{EnvProvider, SystemEnv};
use crate::launch::LaunchSpec;

/// Opens connections to MCP servers.
#[async_trait]
pub trait McpConnector: Send + Sync {
    /// Launch or reach the server described by `config` and complete the handshake.
    async fn connect(&self, config: &McpServerConfig) -> Result<Arc<dyn McpConnection>, McpError>;
}

/// Connector picking the wire from each entry's `transport`.
pub struct TransportConnector {
    aliases: CommandAliases,
    env: Arc<dyn EnvProvider>,
    request_timeout: Duration,
}

impl TransportConnector {
    pub fn new(aliases: CommandAliases) -> Self {
        Self {
            aliases,
            env: Arc::new(SystemEnv),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    #[must_use]
    pub fn with_env_provider(mut self, env: Arc<dyn EnvProvider>) -> Self {
        self.env = env;
        self
    }

    async fn spawn(&self, config: &McpServerConfig) -> Result<McpClient, McpError> {
        let launch = LaunchSpec::prepare(config, &self.aliases, self.env.as_ref())?;

        tracing::debug!(
            server_name = %config.name,
            program = %launch.program,
            args = ?launch.args,
            "Spawning MCP server"
        );

        Ok(McpClient::spawn(&config.name, &launch, self.request_timeout).await?)
    }

    /// Start the launcher command of an SSE entry.
    ///
    /// A launcher that fails is logged and skipped; the HTTP connection is
    /// still attempted, since the server may already be running.
    async fn launcher(&self, config: &McpServerConfig) -> Option<McpClient> {
        if config.command.is_empty() {
            return None;
        }
        match self.spawn(config).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(server_name = %config.name, error = %e, "SSE launcher failed, connecting anyway");
                None
            }
        }
    }
}

#[async_trait]
impl McpConnector for TransportConnector {
    async fn connect(&self, config: &McpServerConfig) -> Result<Arc<dyn McpConnection>, McpError> {
        config.validate().map_err(McpError::InvalidConfig)?;

        let client = match config.transport {
            McpTransport::Stdio => self.spawn(config).await?,
            McpTransport::Sse | McpTransport::WebSocket => {
                let url = config.url.as_deref().unwrap_or_default().trim();
                tracing::debug!(server_name = %config.name, transport = %config.transport, url, "Connecting to remote MCP server");

                if config.transport == McpTransport::Sse {
                    let launcher = self.launcher(config).await;
                    McpClient::connect_sse(&config.name, url, launcher, self.request_timeout).await?
                } else {
                    McpClient::connect_websocket(&config.name, url, self.request_timeout).await?
                }
            }
        };

        Ok(Arc::new(client))
    }
}
