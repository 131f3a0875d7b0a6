//! Launch preparation: turn a registry entry into a concrete process launch.
//!
//! Child processes never inherit the full parent environment. They get a
//! small allow-list of variables, an enriched PATH, then the entry's own
//! `env` on top.

use std::collections::BTreeMap;
use std::path::PathBuf;

use toolchat_core::{McpError, McpServerConfig};

use crate::commands::CommandAliases;
use crate::env::EnvProvider;
use crate::path::{build_effective_path, validate_working_dir};

/// Variables inherited from the parent environment.
#[cfg(windows)]
pub const DEFAULT_INHERITED_ENV_VARS: &[&str] = &[
    "APPDATA",
    "HOMEDRIVE",
    "HOMEPATH",
    "LOCALAPPDATA",
    "PATH",
    "PROCESSOR_ARCHITECTURE",
    "SYSTEMDRIVE",
    "SYSTEMROOT",
    "TEMP",
    "USERNAME",
    "USERPROFILE",
];

/// Variables inherited from the parent environment.
#[cfg(not(windows))]
pub const DEFAULT_INHERITED_ENV_VARS: &[&str] = &["HOME", "LOGNAME", "PATH", "SHELL", "TERM", "USER"];

/// A fully resolved process launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Complete child environment; nothing else is inherited.
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl LaunchSpec {
    /// Validate `config` and resolve it into a launch.
    pub fn prepare(
        config: &McpServerConfig,
        aliases: &CommandAliases,
        env: &dyn EnvProvider,
    ) -> Result<Self, McpError> {
        config.validate().map_err(McpError::InvalidConfig)?;

        let cwd = match config.cwd.as_deref() {
            Some(cwd) if !cwd.is_empty() => {
                validate_working_dir(cwd).map_err(McpError::InvalidConfig)?;
                Some(PathBuf::from(cwd))
            }
            _ => None,
        };

        let program = aliases.resolve(&config.command).to_string();

        let mut child_env = default_environment(env);
        child_env.insert("PATH".to_string(), build_effective_path(&program, env));
        child_env.extend(config.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        if cfg!(windows) {
            child_env.insert("PYTHONIOENCODING".to_string(), "utf-8".to_string());
        }

        Ok(Self {
            program,
            args: config.args.clone(),
            env: child_env,
            cwd,
        })
    }
}

/// Allow-listed variables from the parent environment.
///
/// Values that look like exported shell functions (`()...`) are skipped.
pub fn default_environment(env: &dyn EnvProvider) -> BTreeMap<String, String> {
    DEFAULT_INHERITED_ENV_VARS
        .iter()
        .filter_map(|key| {
            let value = env.get(key)?.into_string().ok()?;
            if value.starts_with("()") {
                return None;
            }
            Some(((*key).to_string(), value))
        })
        .collect()
}
