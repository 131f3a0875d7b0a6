//! Tool catalog: the merged tool surface of all live connections.
//!
//! A catalog is an immutable snapshot. The manager rebuilds it from scratch
//! after every mutation and swaps it in whole, so a reader holding an
//! `Arc<ToolCatalog>` always sees a consistent tool list, routing index and
//! info projection.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use toolchat_core::{
    McpCapabilities, McpConnection, McpServerConfig, McpServerToolInfo, McpTool, ToolDefinition,
    ToolIndex, ToolSummary,
};

/// A live connection and the snapshot taken when it connected.
#[derive(Clone)]
pub struct ServerConnection {
    pub config: McpServerConfig,
    pub connection: Arc<dyn McpConnection>,
    pub tools: Vec<McpTool>,
    pub capabilities: McpCapabilities,
}

impl std::fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConnection")
            .field("name", &self.config.name)
            .field("enabled", &self.config.enabled)
            .field("tools", &self.tools.len())
            .finish_non_exhaustive()
    }
}

/// Immutable snapshot of the callable tool surface.
#[derive(Default)]
pub struct ToolCatalog {
    tools: Vec<ToolDefinition>,
    index: ToolIndex,
    infos: Vec<McpServerToolInfo>,
}

impl ToolCatalog {
    /// Build a catalog from connections, visited in name order.
    ///
    /// Only enabled connections contribute tools. When two servers expose
    /// the same tool name, the first one in name order owns it.
    pub fn build(connections: &BTreeMap<String, ServerConnection>) -> Self {
        let mut tools = Vec::new();
        let mut index = ToolIndex::new();
        let mut infos = Vec::with_capacity(connections.len());
        let mut seen = HashSet::new();

        for (name, server) in connections {
            infos.push(McpServerToolInfo {
                server_name: name.clone(),
                description: server.capabilities.description.clone(),
                icon: server.capabilities.icon.clone(),
                enabled: server.config.enabled,
                tools: server
                    .tools
                    .iter()
                    .map(|tool| ToolSummary {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                    })
                    .collect(),
            });

            if !server.config.enabled {
                continue;
            }

            for tool in &server.tools {
                if !seen.insert(tool.name.clone()) {
                    tracing::warn!(
                        server_name = %name,
                        tool_name = %tool.name,
                        "Duplicate MCP tool name, keeping the first server's tool"
                    );
                    continue;
                }
                tools.push(ToolDefinition::from_mcp_tool(tool));
                index.insert(tool.name.clone(), Arc::clone(&server.connection));
            }
        }

        Self {
            tools,
            index,
            infos,
        }
    }

    /// Model-facing tool definitions with strict parameter schemas.
    pub fn available_tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Tool name → owning connection.
    pub const fn tool_index(&self) -> &ToolIndex {
        &self.index
    }

    /// Per-server projection for display.
    pub fn tool_infos(&self) -> &[McpServerToolInfo] {
        &self.infos
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty() && self.infos.is_empty()
    }
}

impl std::fmt::Debug for ToolCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCatalog")
            .field("tools", &self.tools.iter().map(ToolDefinition::name).collect::<Vec<_>>())
            .field("servers", &self.infos.len())
            .finish()
    }
}
