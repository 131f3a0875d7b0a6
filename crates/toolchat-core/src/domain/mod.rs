//! Domain types, independent of any transport or provider.

pub mod chat;
pub mod mcp;
pub mod tool;

pub use chat::{
    ChatMessage, ContentPart, ImageUrl, MessageContent, QueryAttachments, QueryInput,
    StoredMessage, StoredRole, ToolCallRequest,
};
pub use mcp::{
    DEFAULT_SERVER_ENABLED, McpCapabilities, McpConnectionStatus, McpServerConfig, McpTransport,
    McpServerToolInfo, McpTool, McpToolResult, ToolSummary,
};
pub use tool::{FunctionDefinition, ToolDefinition, ToolKind, strict_parameters, to_gemini_tools};
