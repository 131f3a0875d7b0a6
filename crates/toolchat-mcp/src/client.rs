//! MCP JSON-RPC client for communicating with MCP servers.
//!
//! Implements the MCP protocol (JSON-RPC 2.0) independently of the wire.
//! Reference: <https://spec.modelcontextprotocol.io/>
//!
//! A transport (see [`crate::transport`]) supplies an [`Outbound`] half for
//! sending and a background reader that hands every incoming message to an
//! [`Inbound`]. The inbound side routes each response to the request waiting
//! on its id, so concurrent calls on one server are safe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use toolchat_core::{McpCapabilities, McpConnection, McpError, McpTool, McpToolResult};

/// MCP protocol revision sent in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Default time to wait for any single response (npx cold starts are slow).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur during MCP client operations.
#[derive(Debug, Error)]
pub enum McpClientError {
    #[error("Failed to spawn MCP server process: {0}")]
    SpawnFailed(String),

    #[error("Failed to communicate with MCP server: {0}")]
    IoError(#[from] std::io::Error),

    #[error("MCP transport error: {0}")]
    Transport(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("MCP protocol error: {0}")]
    ProtocolError(String),

    #[error("Timeout waiting for MCP server response to '{method}'")]
    Timeout { method: String, seconds: u64 },

    #[error("MCP server returned error: code={code}, message={message}")]
    ServerError { code: i64, message: String },

    #[error("Server not connected")]
    NotConnected,
}

impl From<McpClientError> for McpError {
    fn from(error: McpClientError) -> Self {
        match error {
            McpClientError::SpawnFailed(msg) => Self::Spawn(msg),
            McpClientError::IoError(e) => Self::Protocol(e.to_string()),
            McpClientError::Transport(msg) => Self::Transport(msg),
            McpClientError::JsonError(e) => Self::Protocol(e.to_string()),
            McpClientError::ProtocolError(msg) => Self::Protocol(msg),
            McpClientError::Timeout { method, seconds } => Self::Timeout { method, seconds },
            McpClientError::ServerError { code, message } => Self::Server { code, message },
            McpClientError::NotConnected => Self::NotConnected,
        }
    }
}

/// JSON-RPC 2.0 request.
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

/// JSON-RPC 2.0 response, or a server-initiated message.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// MCP initialize result.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(rename = "serverInfo", default)]
    pub server_info: Option<ServerInfo>,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
}

/// Server information from initialize.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Server capabilities. Display metadata (`description`, `icon`) is read
/// from the same object.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerCapabilities {
    #[serde(default)]
    pub tools: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// MCP tool from tools/list.
#[derive(Debug, Deserialize)]
struct McpToolSchema {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    input_schema: Option<Value>,
}

type PendingMap = HashMap<u64, oneshot::Sender<JsonRpcResponse>>;

/// Sending half of a transport.
#[async_trait]
pub(crate) trait Outbound: Send + Sync {
    /// Send one serialized JSON-RPC message.
    async fn send(&self, message: String) -> Result<(), McpClientError>;

    /// Release the transport. Called at most once.
    async fn close(&self);
}

/// Receiving half shared between a client and its transport reader.
#[derive(Clone)]
pub(crate) struct Inbound {
    server_name: Arc<str>,
    pending: Arc<StdMutex<PendingMap>>,
    closed: Arc<AtomicBool>,
}

impl Inbound {
    pub(crate) fn new(server_name: &str) -> Self {
        Self {
            server_name: Arc::from(server_name),
            pending: Arc::new(StdMutex::new(PendingMap::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Route one raw message. Anything that is not JSON-RPC is skipped.
    pub(crate) fn deliver(&self, raw: &str) {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return;
        }
        let Ok(message) = serde_json::from_str::<JsonRpcResponse>(trimmed) else {
            tracing::debug!(server_name = %self.server_name, line = trimmed, "Skipping non-JSON-RPC output");
            return;
        };
        dispatch_message(&self.server_name, message, &self.pending);
    }

    /// The peer is gone: mark the connection closed and fail every waiter.
    pub(crate) fn finish(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.pending().clear();
    }

    pub(crate) fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn pending(&self) -> MutexGuard<'_, PendingMap> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Client for one MCP server, over any transport.
pub struct McpClient {
    server_name: String,
    outbound: Box<dyn Outbound>,
    inbound: Inbound,
    shut_down: AtomicBool,
    request_id: AtomicU64,
    request_timeout: Duration,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
    initialize: Option<InitializeResult>,
}

impl McpClient {
    /// Complete the MCP handshake over an opened transport.
    ///
    /// `tasks` are the transport's background readers; they are aborted when
    /// the client shuts down or is dropped.
    pub(crate) async fn start(
        outbound: Box<dyn Outbound>,
        inbound: Inbound,
        tasks: Vec<JoinHandle<()>>,
        request_timeout: Duration,
    ) -> Result<Self, McpClientError> {
        let mut client = Self {
            server_name: inbound.server_name().to_string(),
            outbound,
            inbound,
            shut_down: AtomicBool::new(false),
            request_id: AtomicU64::new(1),
            request_timeout,
            tasks: StdMutex::new(tasks),
            initialize: None,
        };

        if let Err(e) = client.handshake().await {
            client.shutdown().await;
            return Err(e);
        }

        Ok(client)
    }

    /// Send `initialize`, then the `initialized` notification.
    async fn handshake(&mut self) -> Result<(), McpClientError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": "toolchat",
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {}
        });

        let result: InitializeResult = self.request("initialize", Some(params)).await?;
        tracing::debug!(
            server_name = %self.server_name,
            protocol_version = %result.protocol_version,
            server_info = ?result.server_info.as_ref().map(|info| &info.name),
            "MCP handshake complete"
        );
        self.initialize = Some(result);

        self.notify("notifications/initialized", None).await
    }

    /// Server info reported during the handshake.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.initialize.as_ref()?.server_info.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.inbound.is_open() && !self.shut_down.load(Ordering::SeqCst)
    }

    /// List available tools. Servers without a `tools` capability have none.
    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpClientError> {
        if !self.is_connected() {
            return Err(McpClientError::NotConnected);
        }
        let supports_tools = self
            .initialize
            .as_ref()
            .is_some_and(|init| init.capabilities.tools.is_some());
        if !supports_tools {
            return Ok(Vec::new());
        }

        let result: Value = self.request("tools/list", None).await?;

        let tools_value = result.get("tools").cloned().unwrap_or_else(|| json!([]));
        let mcp_tools: Vec<McpToolSchema> = serde_json::from_value(tools_value)?;

        Ok(mcp_tools
            .into_iter()
            .map(|t| McpTool {
                name: t.name,
                description: t.description,
                input_schema: t.input_schema,
            })
            .collect())
    }

    /// Call a tool. `isError` results become error-marked [`McpToolResult`]s.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<McpToolResult, McpClientError> {
        let params = json!({
            "name": name,
            "arguments": arguments
        });

        let result: Value = self.request("tools/call", Some(params)).await?;
        Ok(tool_result_from_value(&result))
    }

    /// Send a JSON-RPC request and wait for its response.
    async fn request<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, McpClientError> {
        if !self.is_connected() {
            return Err(McpClientError::NotConnected);
        }

        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        let message = serde_json::to_string(&request)?;

        let (tx, rx) = oneshot::channel();
        self.inbound.pending().insert(id, tx);

        if let Err(e) = self.outbound.send(message).await {
            self.inbound.pending().remove(&id);
            return Err(e);
        }

        let response = match timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(if self.is_connected() {
                    McpClientError::ProtocolError("Server closed connection".to_string())
                } else {
                    McpClientError::NotConnected
                });
            }
            Err(_) => {
                self.inbound.pending().remove(&id);
                return Err(McpClientError::Timeout {
                    method: method.to_string(),
                    seconds: self.request_timeout.as_secs(),
                });
            }
        };

        if let Some(err) = response.error {
            return Err(McpClientError::ServerError {
                code: err.code,
                message: err.message,
            });
        }

        let result = response.result.ok_or_else(|| {
            McpClientError::ProtocolError("Missing result in response".to_string())
        })?;

        serde_json::from_value(result).map_err(Into::into)
    }

    /// Send a JSON-RPC notification (no response expected).
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpClientError> {
        let notification = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params.unwrap_or_else(|| json!({}))
        });
        self.outbound.send(serde_json::to_string(&notification)?).await
    }

    /// Release the transport, stop the readers and fail every outstanding request.
    pub(crate) async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        self.outbound.close().await;
        self.abort_tasks();
        self.inbound.finish();
        tracing::debug!(server_name = %self.server_name, "MCP client closed");
    }

    fn abort_tasks(&self) {
        for task in self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        self.inbound.finish();
        self.abort_tasks();
    }
}

#[async_trait]
impl McpConnection for McpClient {
    async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        Ok(Self::list_tools(self).await?)
    }

    async fn capabilities(&self) -> Result<McpCapabilities, McpError> {
        if !self.is_connected() {
            return Err(McpError::NotConnected);
        }
        let capabilities = self
            .initialize
            .as_ref()
            .map(|init| &init.capabilities)
            .ok_or_else(|| McpError::Handshake("initialize did not complete".to_string()))?;
        Ok(McpCapabilities {
            description: capabilities.description.clone().unwrap_or_default(),
            icon: capabilities.icon.clone().unwrap_or_default(),
        })
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpToolResult, McpError> {
        Ok(Self::call_tool(self, name, arguments).await?)
    }

    async fn close(&self) -> Result<(), McpError> {
        self.shutdown().await;
        Ok(())
    }
}

/// Map a `tools/call` result object onto [`McpToolResult`].
fn tool_result_from_value(result: &Value) -> McpToolResult {
    let content = result.get("content").cloned().unwrap_or_else(|| json!([]));
    let is_error = result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if is_error {
        let error_msg = content
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|item| item.get("text"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string();
        McpToolResult::error(error_msg)
    } else {
        McpToolResult::success(content)
    }
}

fn dispatch_message(server_name: &str, message: JsonRpcResponse, pending: &StdMutex<PendingMap>) {
    if let Some(method) = &message.method {
        tracing::debug!(server_name = %server_name, method = %method, "Ignoring server-initiated message");
        return;
    }
    let Some(id) = message.id else {
        tracing::debug!(server_name = %server_name, "Ignoring response without id");
        return;
    };
    let waiter = pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id);
    match waiter {
        Some(tx) => {
            let _ = tx.send(message);
        }
        None => tracing::debug!(server_name = %server_name, id, "Response for unknown request id"),
    }
}
