#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod events;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    ChatMessage, ContentPart, DEFAULT_SERVER_ENABLED, FunctionDefinition, ImageUrl,
    McpCapabilities, McpConnectionStatus, McpServerConfig, McpServerToolInfo, McpTool,
    McpToolResult, McpTransport, MessageContent, QueryAttachments, QueryInput, StoredMessage, StoredRole,
    ToolCallRequest, ToolDefinition, ToolKind, ToolSummary, strict_parameters, to_gemini_tools,
};
pub use events::{ChatInfo, ChatStreamEvent, MessageInfo, ToolCallInfo, ToolResultInfo};
pub use ports::{
    ChannelSink, ChatEventSink, ChatModel, McpConnection, McpError, McpErrorCategory,
    McpErrorInfo, McpServiceError, ModelChunk, ModelError, ModelStream, NoopSink, ToolCallChunk,
    ToolIndex,
};
pub use settings::{
    AgentSettings, DEFAULT_MAX_TOOL_ITERATIONS, ModelConfig, ModelEndpoint, ModelSettings,
    SettingsError,
};
