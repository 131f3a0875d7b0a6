//! MCP connection lifecycle management.
//!
//! `McpManager` owns every live connection, keyed by server name, and the
//! [`ToolCatalog`] derived from them. It never spawns processes itself: the
//! injected [`McpConnector`] does.
//!
//! Mutations (`connect`, `disconnect`, `sync`, `set_enabled`, ...) are
//! serialized by an operation lock. Slow I/O happens outside the state lock,
//! and each mutation publishes its result with a single catalog swap.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::{Mutex, RwLock};
use toolchat_core::{
    McpCapabilities, McpConnection, McpConnectionStatus, McpError, McpErrorInfo, McpServerConfig,
    McpServerToolInfo, McpServiceError, McpTool, ToolDefinition, ToolIndex,
};

use crate::catalog::{ServerConnection, ToolCatalog};
use crate::connector::McpConnector;
use crate::registry::McpRegistry;

#[derive(Default)]
struct ManagerState {
    connections: BTreeMap<String, ServerConnection>,
    catalog: Arc<ToolCatalog>,
    connecting: HashSet<String>,
    disconnected: HashSet<String>,
}

impl ManagerState {
    fn rebuild_catalog(&mut self) {
        self.catalog = Arc::new(ToolCatalog::build(&self.connections));
    }

    fn register(&mut self, server: ServerConnection) {
        let name = server.config.name.clone();
        self.connecting.remove(&name);
        self.disconnected.remove(&name);
        self.connections.insert(name, server);
    }

    fn unregister(&mut self, name: &str) -> Option<ServerConnection> {
        let server = self.connections.remove(name)?;
        self.disconnected.insert(name.to_string());
        Some(server)
    }
}

/// Manager for MCP server connections and the merged tool catalog.
///
/// Construct one explicitly and share it (`Arc<McpManager>`); there is no
/// global instance.
pub struct McpManager {
    connector: Arc<dyn McpConnector>,
    ops: Mutex<()>,
    state: RwLock<ManagerState>,
}

impl McpManager {
    pub fn new(connector: Arc<dyn McpConnector>) -> Self {
        Self {
            connector,
            ops: Mutex::new(()),
            state: RwLock::new(ManagerState::default()),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Replace all state with connections to the registry's enabled servers.
    pub async fn initialize(&self, registry: &McpRegistry) -> Vec<McpErrorInfo> {
        let _guard = self.ops.lock().await;
        self.disconnect_all_locked().await;
        let configs: Vec<McpServerConfig> = registry.enabled().cloned().collect();
        self.connect_many_locked(configs).await
    }

    /// Connect one server and return its tools.
    ///
    /// On any failure nothing is registered and a spawned transport is closed.
    pub async fn connect(&self, config: McpServerConfig) -> Result<Vec<McpTool>, McpServiceError> {
        let _guard = self.ops.lock().await;
        let name = config.name.clone();
        if self.state.read().await.connections.contains_key(&name) {
            return Err(McpServiceError::AlreadyConnected(name));
        }

        self.state.write().await.connecting.insert(name.clone());
        let opened = self.open(config).await;

        let mut state = self.state.write().await;
        state.connecting.remove(&name);
        let server = opened?;
        let tools = server.tools.clone();
        state.register(server);
        state.rebuild_catalog();
        drop(state);

        tracing::info!(server_name = %name, tool_count = tools.len(), "MCP server connected");
        Ok(tools)
    }

    /// Connect every listed server concurrently.
    ///
    /// Failures are isolated: each one is reported in the returned list and
    /// does not affect the others.
    pub async fn connect_all(&self, configs: &[McpServerConfig]) -> Vec<McpErrorInfo> {
        let _guard = self.ops.lock().await;
        self.connect_many_locked(configs.to_vec()).await
    }

    /// Disconnect one server.
    ///
    /// Its records are removed even when closing the transport fails.
    pub async fn disconnect(&self, name: &str) -> Result<(), McpServiceError> {
        let _guard = self.ops.lock().await;
        let server = self
            .state
            .read()
            .await
            .connections
            .get(name)
            .cloned()
            .ok_or_else(|| McpServiceError::NotConnected(name.to_string()))?;

        retire(&server).await;

        {
            let mut state = self.state.write().await;
            state.unregister(name);
            state.rebuild_catalog();
        }

        close_connection(name, server.connection.as_ref()).await;
        tracing::info!(server_name = %name, "MCP server disconnected");
        Ok(())
    }

    /// Close every connection and clear all derived state.
    ///
    /// Readers see either the full catalog or an empty one, never a partial one.
    pub async fn disconnect_all(&self) {
        let _guard = self.ops.lock().await;
        self.disconnect_all_locked().await;
    }

    /// Reconcile live connections with a new registry.
    ///
    /// - names missing from `registry` are disconnected
    /// - new enabled names are connected
    /// - a changed launch (command, args, env, cwd) reconnects
    /// - a change of `enabled` alone only toggles catalog membership
    pub async fn sync(&self, registry: &McpRegistry) -> Vec<McpErrorInfo> {
        let _guard = self.ops.lock().await;

        let current: BTreeMap<String, ServerConnection> =
            self.state.read().await.connections.clone();

        let mut retired = Vec::new();
        let mut toggles = Vec::new();
        let mut to_connect = Vec::new();

        for (name, server) in &current {
            match registry.get(name) {
                None => retired.push(server.clone()),
                Some(next) if server.config.launch_differs(next) => {
                    retired.push(server.clone());
                    if next.enabled {
                        to_connect.push(next.clone());
                    }
                }
                Some(next) if server.config.enabled != next.enabled => {
                    toggles.push((name.clone(), next.enabled));
                }
                Some(_) => {}
            }
        }

        to_connect.extend(
            registry
                .enabled()
                .filter(|config| !current.contains_key(&config.name))
                .cloned(),
        );

        tracing::debug!(
            removed = retired.len(),
            toggled = toggles.len(),
            connecting = to_connect.len(),
            "Syncing MCP servers"
        );

        for server in &retired {
            retire(server).await;
        }

        let (opened, errors) = self.open_many(to_connect).await;

        {
            let mut state = self.state.write().await;
            for server in &retired {
                state.unregister(&server.config.name);
            }
            for (name, enabled) in toggles {
                if let Some(server) = state.connections.get_mut(&name) {
                    server.config.enabled = enabled;
                }
            }
            for server in opened {
                state.register(server);
            }
            state.rebuild_catalog();
        }

        for server in &retired {
            close_connection(&server.config.name, server.connection.as_ref()).await;
        }

        errors
    }

    /// Include or exclude a connected server's tools from the catalog.
    ///
    /// Never reconnects. Setting the current value again is a no-op.
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), McpServiceError> {
        let _guard = self.ops.lock().await;
        let mut state = self.state.write().await;
        let server = state
            .connections
            .get_mut(name)
            .ok_or_else(|| McpServiceError::NotConnected(name.to_string()))?;

        if server.config.enabled == enabled {
            return Ok(());
        }
        server.config.enabled = enabled;
        state.rebuild_catalog();
        drop(state);

        tracing::info!(server_name = %name, enabled, "MCP server catalog membership changed");
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Lifecycle state of `name`.
    pub async fn status(&self, name: &str) -> McpConnectionStatus {
        let state = self.state.read().await;
        if state.connecting.contains(name) {
            McpConnectionStatus::Connecting
        } else if state.connections.contains_key(name) {
            McpConnectionStatus::Connected
        } else if state.disconnected.contains(name) {
            McpConnectionStatus::Disconnected
        } else {
            McpConnectionStatus::Unconnected
        }
    }

    /// Current catalog snapshot.
    pub async fn catalog(&self) -> Arc<ToolCatalog> {
        Arc::clone(&self.state.read().await.catalog)
    }

    /// Tool definitions of enabled connections.
    pub async fn available_tools(&self) -> Vec<ToolDefinition> {
        self.catalog().await.available_tools().to_vec()
    }

    /// Tool name → owning connection, for enabled connections.
    pub async fn tool_to_server(&self) -> ToolIndex {
        self.catalog().await.tool_index().clone()
    }

    /// Per-server projection of every live connection.
    pub async fn tool_infos(&self) -> Vec<McpServerToolInfo> {
        self.catalog().await.tool_infos().to_vec()
    }

    /// Names of live connections, in name order.
    pub async fn connected_servers(&self) -> Vec<String> {
        self.state.read().await.connections.keys().cloned().collect()
    }

    // =========================================================================
    // Internals (callers hold `ops`)
    // =========================================================================

    async fn disconnect_all_locked(&self) {
        let drained = {
            let mut state = self.state.write().await;
            let drained = std::mem::take(&mut state.connections);
            state.disconnected.extend(drained.keys().cloned());
            state.connecting.clear();
            state.catalog = Arc::new(ToolCatalog::default());
            drained
        };

        if drained.is_empty() {
            return;
        }

        join_all(
            drained
                .iter()
                .map(|(name, server)| close_connection(name, server.connection.as_ref())),
        )
        .await;

        tracing::info!(server_count = drained.len(), "All MCP servers disconnected");
    }

    async fn connect_many_locked(&self, configs: Vec<McpServerConfig>) -> Vec<McpErrorInfo> {
        let mut errors = Vec::new();
        let mut pending = Vec::new();
        {
            let state = self.state.read().await;
            let mut seen = HashSet::new();
            for config in configs {
                if state.connections.contains_key(&config.name) || !seen.insert(config.name.clone()) {
                    errors.push(McpErrorInfo::from(&McpServiceError::AlreadyConnected(
                        config.name,
                    )));
                } else {
                    pending.push(config);
                }
            }
        }

        let (opened, open_errors) = self.open_many(pending).await;
        errors.extend(open_errors);

        if !opened.is_empty() {
            let mut state = self.state.write().await;
            for server in opened {
                tracing::info!(
                    server_name = %server.config.name,
                    tool_count = server.tools.len(),
                    "MCP server connected"
                );
                state.register(server);
            }
            state.rebuild_catalog();
        }

        errors
    }

    /// Open connections concurrently. Successes are returned unregistered.
    async fn open_many(
        &self,
        configs: Vec<McpServerConfig>,
    ) -> (Vec<ServerConnection>, Vec<McpErrorInfo>) {
        if configs.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let names: Vec<String> = configs.iter().map(|c| c.name.clone()).collect();
        self.state.write().await.connecting.extend(names.iter().cloned());

        let results = join_all(configs.into_iter().map(|config| self.open(config))).await;

        {
            let mut state = self.state.write().await;
            for name in &names {
                state.connecting.remove(name);
            }
        }

        let mut opened = Vec::new();
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(server) => opened.push(server),
                Err(e) => {
                    tracing::warn!(server_name = %e.server_name(), error = %e, "Failed to connect MCP server");
                    errors.push(McpErrorInfo::from(&e));
                }
            }
        }
        (opened, errors)
    }

    /// Spawn, handshake and snapshot one server. Rolls back on failure.
    async fn open(&self, config: McpServerConfig) -> Result<ServerConnection, McpServiceError> {
        let name = config.name.clone();
        config
            .validate()
            .map_err(|message| McpServiceError::InvalidConfig {
                server_name: name.clone(),
                message,
            })?;

        let connection = self
            .connector
            .connect(&config)
            .await
            .map_err(|source| McpServiceError::ConnectFailed {
                server_name: name.clone(),
                source,
            })?;

        match snapshot(connection.as_ref()).await {
            Ok((tools, capabilities)) => Ok(ServerConnection {
                config,
                connection,
                tools,
                capabilities,
            }),
            Err(source) => {
                close_connection(&name, connection.as_ref()).await;
                Err(McpServiceError::ConnectFailed {
                    server_name: name,
                    source,
                })
            }
        }
    }
}

async fn snapshot(
    connection: &dyn McpConnection,
) -> Result<(Vec<McpTool>, McpCapabilities), McpError> {
    let tools = connection.list_tools().await?;
    let capabilities = connection.capabilities().await?;
    Ok((tools, capabilities))
}

/// Tools a server gained and lost since its connect-time snapshot.
#[derive(Debug, Default, PartialEq, Eq)]
struct ToolDrift {
    added: Vec<String>,
    removed: Vec<String>,
}

impl ToolDrift {
    fn between(snapshot: &[McpTool], live: &[McpTool]) -> Self {
        let known: HashSet<&str> = snapshot.iter().map(|t| t.name.as_str()).collect();
        let current: HashSet<&str> = live.iter().map(|t| t.name.as_str()).collect();
        Self {
            added: live
                .iter()
                .filter(|t| !known.contains(t.name.as_str()))
                .map(|t| t.name.clone())
                .collect(),
            removed: snapshot
                .iter()
                .filter(|t| !current.contains(t.name.as_str()))
                .map(|t| t.name.clone())
                .collect(),
        }
    }

    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// First phase of a disconnect: re-read the live tool list and report how
/// it drifted from the connect-time snapshot.
///
/// The catalog is rebuilt from the registered snapshots either way, so this
/// read is diagnostic only. A failed read is logged and yields `None`.
async fn retire(server: &ServerConnection) -> Option<ToolDrift> {
    let name = &server.config.name;
    let live = match server.connection.list_tools().await {
        Ok(tools) => tools,
        Err(e) => {
            tracing::warn!(server_name = %name, error = %e, "Could not list tools before disconnect");
            return None;
        }
    };

    let drift = ToolDrift::between(&server.tools, &live);
    if drift.is_empty() {
        tracing::debug!(server_name = %name, tools = live.len(), "Retiring MCP server tools");
    } else {
        tracing::info!(
            server_name = %name,
            added = ?drift.added,
            removed = ?drift.removed,
            "MCP server tools changed since connect"
        );
    }
    Some(drift)
}

async fn close_connection(name: &str, connection: &dyn McpConnection) {
    if let Err(e) = connection.close().await {
        tracing::warn!(server_name = %name, error = %e, "Failed to close MCP connection");
    }
}

impl std::fmt::Debug for McpManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpManager").finish_non_exhaustive()
    }
}
