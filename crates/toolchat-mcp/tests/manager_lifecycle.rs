//! Connection manager lifecycle tests against an in-memory connector.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::{Barrier, Notify};
use toolchat_mcp::{
    McpCapabilities, McpConnection, McpConnectionStatus, McpConnector, McpError,
    McpErrorCategory, McpManager, McpRegistry, McpServerConfig, McpServiceError, McpTool,
    McpToolResult,
};

// =============================================================================
// Fakes
// =============================================================================

struct FakeConnection {
    name: String,
    tools: Vec<McpTool>,
    fail_list_tools: bool,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl FakeConnection {
    fn ensure_open(&self) -> Result<(), McpError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(McpError::NotConnected)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl McpConnection for FakeConnection {
    async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        self.ensure_open()?;
        if self.fail_list_tools {
            return Err(McpError::Protocol("tools/list exploded".to_string()));
        }
        Ok(self.tools.clone())
    }

    async fn capabilities(&self) -> Result<McpCapabilities, McpError> {
        self.ensure_open()?;
        Ok(McpCapabilities {
            description: format!("{} server", self.name),
            icon: String::new(),
        })
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpToolResult, McpError> {
        self.ensure_open()?;
        Ok(McpToolResult::success(json!({"tool": name, "args": arguments})))
    }

    async fn close(&self) -> Result<(), McpError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct FakeConnector {
    tools: HashMap<String, Vec<&'static str>>,
    refuse: HashSet<String>,
    broken_listing: HashSet<String>,
    gate: Option<Arc<Notify>>,
    rendezvous: Option<Arc<Barrier>>,
    connects: AtomicUsize,
    opened: Mutex<Vec<Arc<FakeConnection>>>,
}

impl FakeConnector {
    fn new() -> Self {
        Self::default()
    }

    fn with_server(mut self, name: &str, tools: &[&'static str]) -> Self {
        self.tools.insert(name.to_string(), tools.to_vec());
        self
    }

    fn refusing(mut self, name: &str) -> Self {
        self.refuse.insert(name.to_string());
        self
    }

    fn with_broken_listing(mut self, name: &str) -> Self {
        self.broken_listing.insert(name.to_string());
        self
    }

    /// Every connect waits until `barrier` is full.
    fn meeting_at(mut self, barrier: Arc<Barrier>) -> Self {
        self.rendezvous = Some(barrier);
        self
    }

    fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn opened(&self, name: &str) -> Vec<Arc<FakeConnection>> {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.name == name)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl McpConnector for FakeConnector {
    async fn connect(&self, config: &McpServerConfig) -> Result<Arc<dyn McpConnection>, McpError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(barrier) = &self.rendezvous {
            barrier.wait().await;
        }
        if self.refuse.contains(&config.name) {
            return Err(McpError::Spawn(format!("{}: command not found", config.command)));
        }

        let tools = self
            .tools
            .get(&config.name)
            .map(|names| {
                names
                    .iter()
                    .map(|n| {
                        McpTool::new(*n).with_input_schema(json!({
                            "type": "object",
                            "properties": {"q": {"type": "string"}}
                        }))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let connection = Arc::new(FakeConnection {
            name: config.name.clone(),
            tools,
            fail_list_tools: self.broken_listing.contains(&config.name),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        });
        self.opened.lock().unwrap().push(Arc::clone(&connection));
        Ok(connection)
    }
}

fn server(name: &str) -> McpServerConfig {
    McpServerConfig::new(name, "npx").with_args([format!("{name}-mcp")])
}

async fn tool_names(manager: &McpManager) -> Vec<String> {
    manager
        .available_tools()
        .await
        .iter()
        .map(|t| t.name().to_string())
        .collect()
}

// =============================================================================
// Connect / disconnect
// =============================================================================

#[tokio::test]
async fn connect_registers_tools_and_routes() {
    let connector = Arc::new(FakeConnector::new().with_server("weather", &["get_weather"]));
    let manager = McpManager::new(connector.clone());

    let tools = manager.connect(server("weather")).await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(manager.status("weather").await, McpConnectionStatus::Connected);

    let index = manager.tool_to_server().await;
    let result = index["get_weather"]
        .call_tool("get_weather", json!({"q": "Paris"}))
        .await
        .unwrap();
    assert!(result.success);

    let infos = manager.tool_infos().await;
    assert_eq!(infos[0].server_name, "weather");
    assert_eq!(infos[0].description, "weather server");
}

#[tokio::test]
async fn connect_twice_is_rejected() {
    let connector = Arc::new(FakeConnector::new().with_server("fs", &["read_file"]));
    let manager = McpManager::new(connector.clone());

    manager.connect(server("fs")).await.unwrap();
    let err = manager.connect(server("fs")).await.unwrap_err();
    assert!(matches!(err, McpServiceError::AlreadyConnected(_)));
    assert_eq!(connector.connects(), 1);
}

#[tokio::test]
async fn failed_tool_listing_rolls_back_and_closes() {
    let connector = Arc::new(
        FakeConnector::new()
            .with_server("fs", &["read_file"])
            .with_broken_listing("fs"),
    );
    let manager = McpManager::new(connector.clone());

    let err = manager.connect(server("fs")).await.unwrap_err();
    assert!(matches!(err, McpServiceError::ConnectFailed { .. }));
    assert!(manager.connected_servers().await.is_empty());
    assert!(manager.available_tools().await.is_empty());

    let opened = connector.opened("fs");
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].close_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn connect_all_isolates_failures() {
    let connector = Arc::new(
        FakeConnector::new()
            .with_server("alpha", &["a_tool"])
            .with_server("gamma", &["g_tool"])
            .refusing("beta"),
    );
    let manager = McpManager::new(connector.clone());

    let errors = manager
        .connect_all(&[server("alpha"), server("beta"), server("gamma")])
        .await;

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].server_name, "beta");
    assert_eq!(errors[0].category, McpErrorCategory::Process);
    assert_eq!(manager.connected_servers().await, vec!["alpha", "gamma"]);
    assert_eq!(tool_names(&manager).await, vec!["a_tool", "g_tool"]);
    assert_eq!(manager.status("beta").await, McpConnectionStatus::Unconnected);
}

#[tokio::test]
async fn connect_all_opens_servers_concurrently() {
    // Each connect blocks until all three are in flight at once.
    let connector = Arc::new(
        FakeConnector::new()
            .with_server("alpha", &["a_tool"])
            .with_server("beta", &["b_tool"])
            .with_server("gamma", &["g_tool"])
            .meeting_at(Arc::new(Barrier::new(3))),
    );
    let manager = McpManager::new(connector.clone());

    let errors = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        manager.connect_all(&[server("alpha"), server("beta"), server("gamma")]),
    )
    .await
    .expect("connect_all must not open servers one at a time");

    assert!(errors.is_empty());
    assert_eq!(manager.connected_servers().await, vec!["alpha", "beta", "gamma"]);
}

#[tokio::test]
async fn catalog_empty_after_disconnect_all() {
    let connector = Arc::new(
        FakeConnector::new()
            .with_server("alpha", &["a_tool"])
            .with_server("beta", &["b_tool"]),
    );
    let manager = McpManager::new(connector.clone());
    manager.connect_all(&[server("alpha"), server("beta")]).await;
    let before = manager.catalog().await;

    manager.disconnect_all().await;

    assert!(manager.available_tools().await.is_empty());
    assert!(manager.tool_to_server().await.is_empty());
    assert!(manager.tool_infos().await.is_empty());
    assert_eq!(manager.status("alpha").await, McpConnectionStatus::Disconnected);
    for name in ["alpha", "beta"] {
        assert_eq!(connector.opened(name)[0].close_calls.load(Ordering::SeqCst), 1);
    }

    // A snapshot taken before the teardown is still complete.
    assert_eq!(before.available_tools().len(), 2);
}

#[tokio::test]
async fn routing_after_disconnect_fails_explicitly() {
    let connector = Arc::new(FakeConnector::new().with_server("fs", &["read_file"]));
    let manager = McpManager::new(connector.clone());
    manager.connect(server("fs")).await.unwrap();
    let stale_index = manager.tool_to_server().await;

    manager.disconnect("fs").await.unwrap();

    assert!(!manager.tool_to_server().await.contains_key("read_file"));
    let err = stale_index["read_file"]
        .call_tool("read_file", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::NotConnected));
    assert_eq!(manager.status("fs").await, McpConnectionStatus::Disconnected);
}

#[tokio::test]
async fn status_reports_connecting_while_handshaking() {
    let gate = Arc::new(Notify::new());
    let connector = Arc::new(
        FakeConnector::new()
            .with_server("slow", &["slow_tool"])
            .gated(Arc::clone(&gate)),
    );
    let manager = Arc::new(McpManager::new(connector.clone()));

    let task = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.connect(server("slow")).await }
    });

    while connector.connects() == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(manager.status("slow").await, McpConnectionStatus::Connecting);
    assert!(manager.available_tools().await.is_empty());

    gate.notify_one();
    task.await.unwrap().unwrap();
    assert_eq!(manager.status("slow").await, McpConnectionStatus::Connected);
}

// =============================================================================
// Enable / disable
// =============================================================================

#[tokio::test]
async fn enable_disable_is_idempotent() {
    let connector = Arc::new(
        FakeConnector::new()
            .with_server("alpha", &["a_tool"])
            .with_server("beta", &["b_tool"]),
    );
    let manager = McpManager::new(connector.clone());
    manager.connect_all(&[server("alpha"), server("beta")]).await;

    manager.set_enabled("beta", false).await.unwrap();
    let once = tool_names(&manager).await;
    manager.set_enabled("beta", false).await.unwrap();
    let twice = tool_names(&manager).await;
    assert_eq!(once, vec!["a_tool"]);
    assert_eq!(once, twice);

    // Disabled connections stay alive and visible in the info projection.
    assert_eq!(manager.status("beta").await, McpConnectionStatus::Connected);
    let infos = manager.tool_infos().await;
    assert!(!infos.iter().find(|i| i.server_name == "beta").unwrap().enabled);

    manager.set_enabled("beta", true).await.unwrap();
    manager.set_enabled("beta", true).await.unwrap();
    assert_eq!(tool_names(&manager).await, vec!["a_tool", "b_tool"]);
    assert_eq!(connector.connects(), 2);
}

// =============================================================================
// Sync
// =============================================================================

#[tokio::test]
async fn sync_removing_server_closes_transport_once() {
    let connector = Arc::new(
        FakeConnector::new()
            .with_server("alpha", &["a_tool"])
            .with_server("beta", &["b_tool"]),
    );
    let manager = McpManager::new(connector.clone());
    manager
        .initialize(&McpRegistry::from_servers([server("alpha"), server("beta")]))
        .await;

    let errors = manager.sync(&McpRegistry::from_servers([server("alpha")])).await;
    assert!(errors.is_empty());
    assert_eq!(manager.connected_servers().await, vec!["alpha"]);
    assert_eq!(tool_names(&manager).await, vec!["a_tool"]);

    let beta = connector.opened("beta");
    assert_eq!(beta.len(), 1);
    assert_eq!(beta[0].close_calls.load(Ordering::SeqCst), 1);
    assert_eq!(connector.opened("alpha")[0].close_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn sync_enabled_flip_does_not_reconnect() {
    let connector = Arc::new(FakeConnector::new().with_server("alpha", &["a_tool"]));
    let manager = McpManager::new(connector.clone());
    manager
        .initialize(&McpRegistry::from_servers([server("alpha")]))
        .await;

    manager
        .sync(&McpRegistry::from_servers([server("alpha").with_enabled(false)]))
        .await;
    assert!(manager.available_tools().await.is_empty());
    assert_eq!(manager.status("alpha").await, McpConnectionStatus::Connected);

    manager.sync(&McpRegistry::from_servers([server("alpha")])).await;
    assert_eq!(tool_names(&manager).await, vec!["a_tool"]);
    assert_eq!(connector.connects(), 1);
}

#[tokio::test]
async fn sync_changed_launch_reconnects() {
    let connector = Arc::new(FakeConnector::new().with_server("alpha", &["a_tool"]));
    let manager = McpManager::new(connector.clone());
    manager
        .initialize(&McpRegistry::from_servers([server("alpha")]))
        .await;

    let changed = server("alpha").with_env("API_KEY", "new");
    manager.sync(&McpRegistry::from_servers([changed])).await;

    let opened = connector.opened("alpha");
    assert_eq!(opened.len(), 2);
    assert_eq!(opened[0].close_calls.load(Ordering::SeqCst), 1);
    assert_eq!(opened[1].close_calls.load(Ordering::SeqCst), 0);
    assert_eq!(tool_names(&manager).await, vec!["a_tool"]);
}

#[tokio::test]
async fn sync_adds_new_servers_and_reports_failures() {
    let connector = Arc::new(
        FakeConnector::new()
            .with_server("alpha", &["a_tool"])
            .with_server("gamma", &["g_tool"])
            .refusing("beta"),
    );
    let manager = McpManager::new(connector.clone());
    manager.sync(&McpRegistry::from_servers([server("alpha")])).await;

    let errors = manager
        .sync(&McpRegistry::from_servers([
            server("alpha"),
            server("beta"),
            server("gamma"),
            server("delta").with_enabled(false),
        ]))
        .await;

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].server_name, "beta");
    assert_eq!(manager.connected_servers().await, vec!["alpha", "gamma"]);
    assert_eq!(manager.status("delta").await, McpConnectionStatus::Unconnected);
    assert_eq!(connector.connects(), 3);
}

#[tokio::test]
async fn initialize_skips_disabled_and_replaces_state() {
    let connector = Arc::new(
        FakeConnector::new()
            .with_server("alpha", &["a_tool"])
            .with_server("beta", &["b_tool"]),
    );
    let manager = McpManager::new(connector.clone());

    manager
        .initialize(&McpRegistry::from_servers([
            server("alpha"),
            server("beta").with_enabled(false),
        ]))
        .await;
    assert_eq!(manager.connected_servers().await, vec!["alpha"]);

    manager
        .initialize(&McpRegistry::from_servers([server("beta")]))
        .await;
    assert_eq!(manager.connected_servers().await, vec!["beta"]);
    assert_eq!(connector.opened("alpha")[0].close_calls.load(Ordering::SeqCst), 1);
}
