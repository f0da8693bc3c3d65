//! Application state management
//! This module wires the transport, permission gate and peer store into one
//! session controller shared by every command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use log::info;

use crate::config::AppConfig;
use crate::core::BluetoothManager;
use crate::core::bluetooth::Transport;
use crate::core::session::{
    HostPermissionGate, JsonPeerStore, PeerStore, PermissionGate, SessionController,
};

/// Global application state
pub struct AppState {
    pub controller: Arc<SessionController>,
    pub config: AppConfig,
    pub config_path: PathBuf,
}

impl AppState {
    /// Builds the state around the bluest transport and the saved peer list
    pub fn new(config: AppConfig, config_path: &Path) -> Result<Self> {
        let peer_path = config.peer_store_path(config_path);
        info!("Saved devices are kept in {:?}", peer_path);

        Ok(Self::with_parts(
            config,
            config_path.to_path_buf(),
            Arc::new(BluetoothManager::new()),
            Arc::new(HostPermissionGate),
            Arc::new(JsonPeerStore::new(peer_path)),
        ))
    }

    pub fn with_parts(
        config: AppConfig,
        config_path: PathBuf,
        transport: Arc<dyn Transport>,
        permissions: Arc<dyn PermissionGate>,
        peers: Arc<dyn PeerStore>,
    ) -> Self {
        let controller = SessionController::new(transport, permissions, peers, config.bridge.clone());
        Self {
            controller: Arc::new(controller),
            config,
            config_path,
        }
    }
}
