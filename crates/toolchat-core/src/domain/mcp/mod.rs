//! MCP (Model Context Protocol) server domain types.
//!
//! These types represent MCP servers in the system, independent of any
//! infrastructure concerns (config files, process management, etc.).
//!
//! # Design
//!
//! - `McpServerConfig` - Declarative entry for one named server
//! - `McpTransport` - stdio, SSE or WebSocket
//! - `McpConnectionStatus` - Per-name lifecycle state
//! - `McpTool` - Tool exposed by an MCP server
//! - `McpToolResult` - Result of a tool invocation
//! - `McpCapabilities` - Display metadata reported at connect time
//! - `McpServerToolInfo` - Read-only projection of a server and its tools for UI listing

mod types;

pub use types::{
    DEFAULT_SERVER_ENABLED, McpCapabilities, McpConnectionStatus, McpServerConfig, McpTransport,
    McpServerToolInfo, McpTool, McpToolResult, ToolSummary,
};
