pub mod bridge_config;

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::bridge_config::{BridgeConfig, LoggingConfig, load_json, save_json};
use crate::utils::app_config_dir;

const CONFIG_FILE_NAME: &str = "bridge_config.json";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bridge: BridgeConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Default location of the config file
    pub fn default_path() -> Result<PathBuf> {
        Ok(app_config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Loads the config from a configuration file.
    pub async fn load_config(path: &Path) -> Result<Self> {
        load_json(path).await
    }

    /// Saves the current config to a configuration file.
    pub async fn save_config(&self, path: &Path) -> Result<()> {
        save_json(self, path).await
    }

    /// Path of the saved peer list, next to the config file
    pub fn peer_store_path(&self, config_path: &Path) -> PathBuf {
        config_path
            .parent()
            .map(|dir| dir.join(&self.bridge.peer_store_file))
            .unwrap_or_else(|| PathBuf::from(&self.bridge.peer_store_file))
    }
}
