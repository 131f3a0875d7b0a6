//! Port for a live connection to one MCP server.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::McpError;
use crate::domain::{McpCapabilities, McpTool, McpToolResult};

/// A connected MCP server.
///
/// Implementations must fail with [`McpError::NotConnected`] once closed;
/// a call on a closed connection never silently succeeds.
#[async_trait]
pub trait McpConnection: Send + Sync {
    /// List the tools the server exposes.
    async fn list_tools(&self) -> Result<Vec<McpTool>, McpError>;

    /// Display metadata reported by the server.
    async fn capabilities(&self) -> Result<McpCapabilities, McpError>;

    /// Invoke a tool. A tool-level failure is an `Ok` result with `success: false`.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpToolResult, McpError>;

    /// Close the transport. Idempotent.
    async fn close(&self) -> Result<(), McpError>;
}

/// Tool name → connection that owns the tool.
pub type ToolIndex = HashMap<String, Arc<dyn McpConnection>>;
