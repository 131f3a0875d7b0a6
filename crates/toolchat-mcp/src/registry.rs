//! Server registry: the declarative map of named MCP servers.
//!
//! Two file shapes are accepted:
//!
//! ```json
//! {"mcpServers": {"fs": {"command": "npx", "args": ["-y", "server-fs"]}},
//!  "commands": {"node": "/opt/app/bin/node"}}
//! ```
//!
//! or the bare `{"fs": {...}}` map. Loading never fails: a missing file is an
//! empty registry and every problem is reported as a [`RegistryWarning`].

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Map, Value};
use thiserror::Error;
use toolchat_core::McpServerConfig;

use crate::commands::CommandAliases;

const SERVERS_KEY: &str = "mcpServers";
const COMMANDS_KEY: &str = "commands";

/// A problem found while loading the registry. Data, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryWarning {
    #[error("Could not read MCP config '{path}': {message}")]
    Unreadable { path: String, message: String },

    #[error("MCP config is not a JSON object: {0}")]
    InvalidDocument(String),

    #[error("Invalid MCP server entry '{name}': {message}")]
    InvalidEntry { name: String, message: String },

    #[error("Invalid command alias table: {0}")]
    InvalidCommands(String),
}

/// Named server configurations plus the command alias table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct McpRegistry {
    pub servers: BTreeMap<String, McpServerConfig>,
    pub commands: CommandAliases,
    pub warnings: Vec<RegistryWarning>,
}

impl McpRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configs, keyed by their `name`.
    pub fn from_servers<I>(servers: I) -> Self
    where
        I: IntoIterator<Item = McpServerConfig>,
    {
        Self {
            servers: servers
                .into_iter()
                .map(|config| (config.name.clone(), config))
                .collect(),
            ..Self::default()
        }
    }

    /// Parse registry JSON. Malformed entries are skipped with a warning.
    pub fn from_json_str(json: &str) -> Self {
        let document: Value = match serde_json::from_str(json) {
            Ok(value) => value,
            Err(e) => {
                return Self {
                    warnings: vec![RegistryWarning::InvalidDocument(e.to_string())],
                    ..Self::default()
                };
            }
        };

        let Value::Object(mut root) = document else {
            return Self {
                warnings: vec![RegistryWarning::InvalidDocument(
                    "expected an object at the top level".to_string(),
                )],
                ..Self::default()
            };
        };

        let mut registry = Self::default();

        let entries = if root.contains_key(SERVERS_KEY) {
            if let Some(commands) = root.remove(COMMANDS_KEY) {
                match serde_json::from_value::<CommandAliases>(commands) {
                    Ok(aliases) => registry.commands = aliases,
                    Err(e) => registry
                        .warnings
                        .push(RegistryWarning::InvalidCommands(e.to_string())),
                }
            }
            match root.remove(SERVERS_KEY) {
                Some(Value::Object(servers)) => servers,
                Some(Value::Null) => Map::new(),
                Some(_) => {
                    registry.warnings.push(RegistryWarning::InvalidDocument(format!(
                        "'{SERVERS_KEY}' must be an object"
                    )));
                    Map::new()
                }
                None => Map::new(),
            }
        } else {
            root
        };

        for (name, entry) in entries {
            match parse_entry(&name, entry) {
                Ok(config) => {
                    registry.servers.insert(name, config);
                }
                Err(message) => {
                    tracing::warn!(server_name = %name, error = %message, "Skipping invalid MCP server entry");
                    registry
                        .warnings
                        .push(RegistryWarning::InvalidEntry { name, message });
                }
            }
        }

        registry
    }

    pub fn get(&self, name: &str) -> Option<&McpServerConfig> {
        self.servers.get(name)
    }

    /// Enabled entries, in name order.
    pub fn enabled(&self) -> impl Iterator<Item = &McpServerConfig> {
        self.servers.values().filter(|config| config.enabled)
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }
}

fn parse_entry(name: &str, entry: Value) -> Result<McpServerConfig, String> {
    let mut config: McpServerConfig =
        serde_json::from_value(entry).map_err(|e| e.to_string())?;
    config.name = name.to_string();
    config.validate()?;
    Ok(config)
}

/// Load the registry file at `path`.
///
/// A missing file yields an empty registry without warnings; an unreadable
/// one yields an empty registry with a warning.
pub async fn load_registry(path: impl AsRef<Path>) -> McpRegistry {
    let path = path.as_ref();
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            let registry = McpRegistry::from_json_str(&contents);
            tracing::debug!(
                path = %path.display(),
                server_count = registry.len(),
                warning_count = registry.warnings.len(),
                "Loaded MCP registry"
            );
            registry
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No MCP registry file, using empty registry");
            McpRegistry::default()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read MCP registry");
            McpRegistry {
                warnings: vec![RegistryWarning::Unreadable {
                    path: path.display().to_string(),
                    message: e.to_string(),
                }],
                ..McpRegistry::default()
            }
        }
    }
}
