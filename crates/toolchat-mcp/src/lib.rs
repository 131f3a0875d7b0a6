#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

pub mod catalog;
pub(crate) mod client;
pub mod commands;
pub mod connector;
pub mod env;
pub mod launch;
pub mod manager;
pub(crate) mod path;
pub mod registry;
mod transport;

// Re-export domain types from core for convenience
pub use toolchat_core::{
    McpCapabilities, McpConnection, McpConnectionStatus, McpError, McpErrorCategory, McpErrorInfo,
    McpServerConfig, McpServerToolInfo, McpServiceError, McpTool, McpToolResult, McpTransport,
    ToolIndex,
};

// Re-export this crate's public types
pub use catalog::{ServerConnection, ToolCatalog};
pub use client::{DEFAULT_REQUEST_TIMEOUT, McpClient, McpClientError, PROTOCOL_VERSION};
pub use commands::CommandAliases;
pub use connector::{McpConnector, TransportConnector};
pub use env::{EnvProvider, SystemEnv};
pub use launch::{DEFAULT_INHERITED_ENV_VARS, LaunchSpec, default_environment};
pub use manager::McpManager;
pub use registry::{McpRegistry, RegistryWarning, load_registry};
