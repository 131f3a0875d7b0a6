//! MCP server domain types.
//!
//! These types are shared between the Rust backend and the UI layer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value of `enabled` for a config entry that omits the flag.
///
/// Applied once, when entries are deserialized. No other code path
/// decides a default.
pub const DEFAULT_SERVER_ENABLED: bool = true;

const fn default_enabled() -> bool {
    DEFAULT_SERVER_ENABLED
}

/// Lifecycle state of a named MCP server inside the connection manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpConnectionStatus {
    /// Never connected (or unknown name)
    #[default]
    Unconnected,
    /// Transport spawned, handshake or tool discovery in progress
    Connecting,
    /// Live connection registered in the manager
    Connected,
    /// Was connected, has since been closed
    Disconnected,
}

/// How the client reaches an MCP server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum McpTransport {
    /// Child process speaking JSON-RPC over stdin/stdout.
    #[default]
    #[serde(rename = "command", alias = "stdio")]
    Stdio,
    /// Server-sent events for server messages, HTTP POST for client messages.
    #[serde(rename = "sse")]
    Sse,
    /// One JSON-RPC message per WebSocket text frame.
    #[serde(rename = "websocket", alias = "ws")]
    WebSocket,
}

impl McpTransport {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "command",
            Self::Sse => "sse",
            Self::WebSocket => "websocket",
        }
    }

    /// URL schemes accepted for a remote transport. Empty for stdio.
    pub const fn url_schemes(self) -> &'static [&'static str] {
        match self {
            Self::Stdio => &[],
            Self::Sse => &["http://", "https://"],
            Self::WebSocket => &["ws://", "wss://"],
        }
    }
}

impl std::fmt::Display for McpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for one named MCP server.
///
/// The registry key is the identity. `name` is filled from that key when the
/// registry loads, which is why it never appears in the serialized entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Registry key of the server.
    #[serde(default, skip_serializing)]
    pub name: String,

    /// Transport used to reach the server.
    #[serde(default)]
    pub transport: McpTransport,

    /// Endpoint of a remote (`sse` or `websocket`) server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Command to execute (e.g., "npx", "node", or an absolute path).
    /// Logical names may be remapped by the command alias table.
    ///
    /// Required for stdio. For an `sse` server it is an optional launcher
    /// started before the HTTP connection is opened.
    #[serde(default)]
    pub command: String,

    /// Arguments to pass to the executable.
    #[serde(default)]
    pub args: Vec<String>,

    /// Server-specific environment variables, merged over the default environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Whether tools from this server are included in the model's catalog.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Working directory for the process (must be absolute if specified).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

impl McpServerConfig {
    /// Create a stdio server configuration with no arguments.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: McpTransport::Stdio,
            url: None,
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            enabled: DEFAULT_SERVER_ENABLED,
            cwd: None,
        }
    }

    /// Create a remote server configuration reached at `url`.
    pub fn remote(
        name: impl Into<String>,
        transport: McpTransport,
        url: impl Into<String>,
    ) -> Self {
        let mut config = Self::new(name, "");
        config.transport = transport;
        config.url = Some(url.into());
        config
    }

    /// Set the command.
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Set the arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set enabled status.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Validate the entry's structure.
    ///
    /// - stdio: `command` must be non-empty and contain no whitespace (flags go in `args`)
    /// - `sse`/`websocket`: `url` must use the transport's scheme; a launcher
    ///   `command`, if given, follows the stdio rules
    /// - `cwd` must be absolute if specified
    pub fn validate(&self) -> Result<(), String> {
        match self.transport {
            McpTransport::Stdio => self.validate_command()?,
            McpTransport::Sse | McpTransport::WebSocket => {
                let url = self
                    .url
                    .as_deref()
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .ok_or_else(|| format!("The {} transport requires a 'url'", self.transport))?;
                let schemes = self.transport.url_schemes();
                if !schemes.iter().any(|scheme| url.starts_with(scheme)) {
                    return Err(format!(
                        "URL for the {} transport must start with {}: {url}",
                        self.transport,
                        schemes.join(" or ")
                    ));
                }
                if !self.command.is_empty() {
                    self.validate_command()?;
                }
            }
        }

        if let Some(ref cwd) = self.cwd {
            if !cwd.is_empty() && !std::path::Path::new(cwd).is_absolute() {
                return Err(format!("Server cwd must be absolute: {cwd}"));
            }
        }

        Ok(())
    }

    fn validate_command(&self) -> Result<(), String> {
        if self.command.trim().is_empty() {
            return Err("Server command cannot be empty".to_string());
        }

        if self.command.contains(char::is_whitespace) {
            return Err(
                "Command must be an executable name/path only (e.g., 'npx'). \
                 Put flags and arguments in the 'args' field."
                    .to_string(),
            );
        }

        Ok(())
    }

    /// Whether `other` would launch a different process than `self`.
    ///
    /// Only `enabled` is excluded: flipping it never requires a restart.
    pub fn launch_differs(&self, other: &Self) -> bool {
        self.transport != other.transport
            || self.url != other.url
            || self.command != other.command
            || self.args != other.args
            || self.env != other.env
            || self.cwd != other.cwd
    }
}

/// Tool definition from an MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpTool {
    /// Tool name (function name). Unique across all connected servers.
    pub name: String,

    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for input parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
}

impl McpTool {
    /// Create a new tool definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: None,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = Some(schema);
        self
    }
}

/// Result of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpToolResult {
    /// Whether the call succeeded.
    pub success: bool,

    /// Result content (if success).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Error message (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl McpToolResult {
    /// Create a success result.
    #[must_use]
    pub const fn success(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Display metadata a server reports at connect time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpCapabilities {
    /// Free-form description of the server.
    #[serde(default)]
    pub description: String,
    /// Icon reference (URL or data URI).
    #[serde(default)]
    pub icon: String,
}

/// Name and description of one tool, for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One connected server and its tools, as shown to the user.
///
/// A projection of manager state, never authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerToolInfo {
    pub server_name: String,
    pub description: String,
    pub icon: String,
    pub enabled: bool,
    pub tools: Vec<ToolSummary>,
}
