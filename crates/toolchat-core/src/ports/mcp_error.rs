//! MCP error types.
//!
//! [`McpError`] describes a failure of one connection (transport or
//! protocol). [`McpServiceError`] describes a failure of a manager
//! operation and wraps the former where a connection was involved.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single MCP connection.
#[derive(Debug, Error)]
pub enum McpError {
    /// The server process could not be started.
    #[error("Failed to spawn MCP server: {0}")]
    Spawn(String),

    /// A remote server could not be reached, or its HTTP/WebSocket channel failed.
    #[error("MCP transport failed: {0}")]
    Transport(String),

    /// The `initialize` exchange failed.
    #[error("MCP handshake failed: {0}")]
    Handshake(String),

    /// Malformed or unexpected JSON-RPC traffic.
    #[error("MCP protocol error: {0}")]
    Protocol(String),

    /// No response within the request timeout.
    #[error("MCP request '{method}' timed out after {seconds}s")]
    Timeout { method: String, seconds: u64 },

    /// The server answered with a JSON-RPC error object.
    #[error("MCP server error {code}: {message}")]
    Server { code: i64, message: String },

    /// The connection is closed.
    #[error("MCP connection is not connected")]
    NotConnected,

    /// The launch configuration is unusable.
    #[error("Invalid MCP configuration: {0}")]
    InvalidConfig(String),
}

/// Failure of a manager operation.
#[derive(Debug, Error)]
pub enum McpServiceError {
    /// A live connection already exists under this name.
    #[error("MCP server '{0}' is already connected")]
    AlreadyConnected(String),

    /// No live connection under this name.
    #[error("MCP server '{0}' is not connected")]
    NotConnected(String),

    /// Spawn, handshake or tool listing failed.
    #[error("Failed to connect MCP server '{server_name}': {source}")]
    ConnectFailed {
        server_name: String,
        #[source]
        source: McpError,
    },

    /// The registry entry was rejected before launch.
    #[error("Invalid MCP configuration for '{server_name}': {message}")]
    InvalidConfig {
        server_name: String,
        message: String,
    },
}

impl McpServiceError {
    /// Name of the server the error concerns.
    pub fn server_name(&self) -> &str {
        match self {
            Self::AlreadyConnected(name) | Self::NotConnected(name) => name,
            Self::ConnectFailed { server_name, .. } | Self::InvalidConfig { server_name, .. } => {
                server_name
            }
        }
    }
}

/// User-safe error report for one server, as returned by bulk operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpErrorInfo {
    pub server_name: String,
    pub message: String,
    pub category: McpErrorCategory,
}

/// Categories of MCP errors for UI handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpErrorCategory {
    /// Server process lifecycle error.
    Process,
    /// Protocol communication error.
    Protocol,
    /// Configuration error.
    Configuration,
    /// State conflict (already connected, not connected).
    State,
}

impl From<&McpError> for McpErrorCategory {
    fn from(error: &McpError) -> Self {
        match error {
            McpError::Spawn(_) | McpError::Transport(_) | McpError::NotConnected => Self::Process,
            McpError::Handshake(_)
            | McpError::Protocol(_)
            | McpError::Timeout { .. }
            | McpError::Server { .. } => Self::Protocol,
            McpError::InvalidConfig(_) => Self::Configuration,
        }
    }
}

impl From<&McpServiceError> for McpErrorCategory {
    fn from(error: &McpServiceError) -> Self {
        match error {
            McpServiceError::AlreadyConnected(_) | McpServiceError::NotConnected(_) => Self::State,
            McpServiceError::ConnectFailed { source, .. } => Self::from(source),
            McpServiceError::InvalidConfig { .. } => Self::Configuration,
        }
    }
}

impl From<&McpServiceError> for McpErrorInfo {
    fn from(error: &McpServiceError) -> Self {
        Self {
            server_name: error.server_name().to_string(),
            message: error.to_string(),
            category: McpErrorCategory::from(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_failure_categorized_by_source() {
        let error = McpServiceError::ConnectFailed {
            server_name: "fs".to_string(),
            source: McpError::Spawn("No such file or directory".to_string()),
        };
        let info = McpErrorInfo::from(&error);
        assert_eq!(info.server_name, "fs");
        assert_eq!(info.category, McpErrorCategory::Process);
        assert!(info.message.contains("No such file"));
    }

    #[test]
    fn test_error_info_wire_shape() {
        let info = McpErrorInfo::from(&McpServiceError::AlreadyConnected("fs".to_string()));
        let value = serde_json::to_value(info).unwrap();
        assert_eq!(value["serverName"], "fs");
        assert_eq!(value["category"], "state");
    }
}
