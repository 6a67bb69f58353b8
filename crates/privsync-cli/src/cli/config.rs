use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use privsync_core::CoreConfig;
use serde::{Deserialize, Serialize};

/// CLI configuration that can be loaded from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    /// Base URL of the settings API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,

    /// Bearer token of the logged-in session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Whether the account holds a premium subscription
    #[serde(default)]
    pub premium: bool,

    /// Server app config, used to decide which settings are available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_config: Option<serde_json::Value>,
}

/// `<config dir>/privsync/config.json`, if the platform has a config dir
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("privsync").join("config.json"))
}

impl CliConfig {
    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: CliConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn to_core_config(&self) -> CoreConfig {
        let mut core = match &self.api_base {
            Some(api_base) => CoreConfig::new(api_base.clone()),
            None => CoreConfig::default(),
        };
        core.auth_token = self.auth_token.clone();
        if let Some(timeout) = self.timeout_secs {
            core.request_timeout_secs = timeout;
        }
        core.premium = self.premium;
        core
    }
}
