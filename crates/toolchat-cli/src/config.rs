//! Config file locations and loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use toolchat_core::ModelConfig;

use crate::parser::Cli;

/// Directory name under the platform config dir.
pub const CONFIG_DIR_NAME: &str = "toolchat";
pub const MCP_CONFIG_FILE: &str = "mcp_config.json";
pub const MODEL_CONFIG_FILE: &str = "model_config.json";

/// Resolved config file paths for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    pub mcp_config: PathBuf,
    pub model_config: PathBuf,
}

impl CliConfig {
    /// Flags (or their environment variables) first, then the default directory.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        Ok(Self {
            mcp_config: match &cli.mcp_config {
                Some(path) => path.clone(),
                None => default_config_dir()?.join(MCP_CONFIG_FILE),
            },
            model_config: match &cli.model_config {
                Some(path) => path.clone(),
                None => default_config_dir()?.join(MODEL_CONFIG_FILE),
            },
        })
    }
}

/// `<platform config dir>/toolchat`.
pub fn default_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME))
        .context("Cannot determine the platform config directory; pass --mcp-config and --model-config")
}

/// Load `.env` from the working directory, if present.
///
/// Returns the error of a `.env` file that exists but could not be loaded.
pub fn load_dotenv() -> Option<dotenvy::Error> {
    dotenvy::dotenv().err().filter(|e| !e.not_found())
}

/// Load the model config. A missing file means no model is configured.
pub async fn load_model_config(path: &Path) -> Result<ModelConfig> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No model config file");
            return Ok(ModelConfig::default());
        }
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to read model config {}", path.display()));
        }
    };

    serde_json::from_str(&contents)
        .with_context(|| format!("Invalid model config {}", path.display()))
}
