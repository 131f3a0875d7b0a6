//! CLI bootstrap, the composition root.
//!
//! The only place where the MCP transport, the manager and the model
//! configuration are wired together.

use std::sync::Arc;

use anyhow::Result;
use toolchat_core::{McpErrorInfo, ModelConfig};
use toolchat_mcp::{McpManager, McpRegistry, TransportConnector, load_registry};
use tracing::{info, warn};

use crate::config::{CliConfig, load_model_config};

/// Composed context for command handlers.
pub struct CliContext {
    pub manager: McpManager,
    pub registry: McpRegistry,
    pub model_config: ModelConfig,
    /// Servers that failed to connect at startup.
    pub connect_errors: Vec<McpErrorInfo>,
}

/// Load both config files and connect every enabled server.
///
/// Registry warnings and connect failures are logged, never fatal.
pub async fn bootstrap(config: &CliConfig) -> Result<CliContext> {
    let model_config = load_model_config(&config.model_config).await?;

    let registry = load_registry(&config.mcp_config).await;
    for warning in &registry.warnings {
        warn!(path = %config.mcp_config.display(), "{warning}");
    }

    let connector = TransportConnector::new(registry.commands.clone());
    let manager = McpManager::new(Arc::new(connector));
    let connect_errors = manager.initialize(&registry).await;
    for error in &connect_errors {
        warn!(server_name = %error.server_name, category = ?error.category, "{}", error.message);
    }

    info!(
        servers = registry.len(),
        connected = manager.connected_servers().await.len(),
        "Bootstrap complete"
    );

    Ok(CliContext {
        manager,
        registry,
        model_config,
        connect_errors,
    })
}

impl CliContext {
    /// Close every server process.
    pub async fn shutdown(&self) {
        self.manager.disconnect_all().await;
    }
}
