use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::core::bluetooth::constants::{
    BLUETOOTH_OPERATION_TIMEOUT_SECS, CONNECT_TIMEOUT_SECS, DEFAULT_SCAN_WINDOWS_SECS, DEVICE_KEY,
    DEVICE_NAME,
};
use crate::core::session::permission::PermissionPolicy;
use crate::utils::ensure_directory_exists;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Advertised name a discovered device must match exactly.
    pub device_name: String,

    /// Key prefixed to keyed command frames; must match the peripheral's.
    pub device_key: String,

    /// Discovery windows in seconds, run back to back until the device is found.
    pub scan_windows_secs: Vec<u64>,

    /// Report the same device more than once per scan.
    pub allow_duplicates: bool,

    /// How long a connect may take before the device is treated as not found.
    pub connect_timeout_secs: u64,

    /// Bound for every other Bluetooth call (services, subscribe, read, write).
    pub operation_timeout_secs: u64,

    /// How permission statuses are reduced.
    pub permission_policy: PermissionPolicy,

    /// File name of the saved peer list, relative to the config directory.
    pub peer_store_file: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            device_name: DEVICE_NAME.to_string(),
            device_key: DEVICE_KEY.to_string(),
            scan_windows_secs: DEFAULT_SCAN_WINDOWS_SECS.to_vec(),
            allow_duplicates: true,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            operation_timeout_secs: BLUETOOTH_OPERATION_TIMEOUT_SECS,
            permission_policy: PermissionPolicy::default(),
            peer_store_file: "peers.json".to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn scan_windows(&self) -> Vec<Duration> {
        self.scan_windows_secs
            .iter()
            .map(|secs| Duration::from_secs(*secs))
            .collect()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of error, warn, info, debug, trace.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn level(&self) -> log::Level {
        self.level.parse().unwrap_or_else(|_| {
            warn!("Unknown log level {:?}, using info", self.level);
            log::Level::Info
        })
    }
}

/// Loads a config file, falling back to defaults when it does not exist.
pub async fn load_json<T>(file_path: &Path) -> Result<T>
where
    T: Default + for<'de> Deserialize<'de>,
{
    if !file_path.exists() {
        warn!("Config file not found at {:?}, using default.", file_path);
        return Ok(T::default());
    }

    let config_json = fs::read_to_string(file_path).await?;
    let config: T = serde_json::from_str(&config_json)?;

    info!("Config loaded from {:?}", file_path);
    Ok(config)
}

/// Saves a config file, creating its directory if needed.
pub async fn save_json<T: Serialize>(value: &T, file_path: &Path) -> Result<()> {
    if let Some(dir) = file_path.parent() {
        ensure_directory_exists(dir).await?;
    }

    let config_json = match serde_json::to_string_pretty(value) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize config to JSON: {}", e);
            return Err(e.into());
        }
    };

    fs::write(file_path, config_json).await?;

    info!("Config saved to {:?}.", file_path);
    Ok(())
}
