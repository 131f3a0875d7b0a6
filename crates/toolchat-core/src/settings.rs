//! Settings domain types and validation.
//!
//! Model settings are a closed core schema plus an open extension map; keys
//! the core does not know are carried verbatim in [`ModelSettings::extra`] and
//! passed through to the provider request.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default cap on model turns per query.
pub const DEFAULT_MAX_TOOL_ITERATIONS: u32 = 25;

/// Provider endpoint overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEndpoint {
    #[serde(rename = "baseURL", default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Settings for one model provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSettings {
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_provider: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<ModelEndpoint>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Provider-specific keys, forwarded untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Base URL override, if any.
    pub fn base_url(&self) -> Option<&str> {
        self.configuration
            .as_ref()
            .and_then(|endpoint| endpoint.base_url.as_deref())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.model.trim().is_empty() {
            return Err(SettingsError::EmptyModel);
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(SettingsError::InvalidTemperature(temperature));
            }
        }

        if let Some(top_p) = self.top_p {
            if !(0.0..=1.0).contains(&top_p) {
                return Err(SettingsError::InvalidTopP(top_p));
            }
        }

        if self.max_tokens == Some(0) {
            return Err(SettingsError::InvalidMaxTokens);
        }

        Ok(())
    }
}

const fn default_enable_tools() -> bool {
    true
}

/// Provider selection plus per-provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    #[serde(default)]
    pub active_provider: Option<String>,

    #[serde(default = "default_enable_tools")]
    pub enable_tools: bool,

    #[serde(default)]
    pub configs: BTreeMap<String, ModelSettings>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            active_provider: None,
            enable_tools: default_enable_tools(),
            configs: BTreeMap::new(),
        }
    }
}

impl ModelConfig {
    /// Settings of the active provider, validated.
    pub fn active_settings(&self) -> Result<&ModelSettings, SettingsError> {
        let provider = self
            .active_provider
            .as_deref()
            .ok_or(SettingsError::NoActiveProvider)?;
        let settings = self
            .configs
            .get(provider)
            .ok_or_else(|| SettingsError::UnknownProvider(provider.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

/// Conversation engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Maximum model turns per query. `None` is unbounded.
    pub max_tool_iterations: Option<u32>,
}

impl AgentSettings {
    #[must_use]
    pub const fn with_defaults() -> Self {
        Self {
            max_tool_iterations: Some(DEFAULT_MAX_TOOL_ITERATIONS),
        }
    }

    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            max_tool_iterations: None,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Settings validation error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("No active model provider configured")]
    NoActiveProvider,

    #[error("Active provider '{0}' has no settings")]
    UnknownProvider(String),

    #[error("Model name cannot be empty")]
    EmptyModel,

    #[error("Temperature must be between 0 and 2, got {0}")]
    InvalidTemperature(f64),

    #[error("topP must be between 0 and 1, got {0}")]
    InvalidTopP(f64),

    #[error("maxTokens must be greater than 0")]
    InvalidMaxTokens,
}
