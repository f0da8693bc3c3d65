use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use log::info;
use regex::Regex;
use tokio::fs;

const APP_DIR_NAME: &str = "pi-companion-bridge";

/// Asynchronously ensures that a directory exists, creating it if it does not.
/// This function is idempotent.
pub async fn ensure_directory_exists<P: AsRef<Path>>(path: P) -> io::Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path).await?;
        info!("Created directory at: {:?}", path);
    }
    Ok(())
}

/// Per-user configuration directory of the bridge
pub fn app_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| anyhow!("No configuration directory on this platform"))
}

/// Pulls a MAC address out of a platform device id, when it contains one
pub fn extract_mac_address(device_id: &str) -> Option<String> {
    let re = Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").ok()?;
    re.find_iter(device_id)
        .last()
        .map(|m| m.as_str().to_uppercase())
}
