//! Persistence of discovered peers
//!
//! The store holds the most recently discovered peers, newest first. The
//! session treats index 0 as the active peer.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use log::{info, warn};
use thiserror::Error;
use tokio::fs;

use crate::core::bluetooth::types::PeerIdentity;
use crate::utils::ensure_directory_exists;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[async_trait]
pub trait PeerStore: Send + Sync {
    async fn load(&self) -> Result<Vec<PeerIdentity>, StoreError>;

    async fn save(&self, peers: &[PeerIdentity]) -> Result<(), StoreError>;

    /// The peer commands are sent to
    async fn active(&self) -> Result<Option<PeerIdentity>, StoreError> {
        Ok(self.load().await?.into_iter().next())
    }

    /// Moves `peer` to the front of the list, dropping older entries with the same address
    async fn remember(&self, peer: PeerIdentity) -> Result<(), StoreError> {
        let mut peers = self.load().await?;
        peers.retain(|p| p.address != peer.address);
        peers.insert(0, peer);
        self.save(&peers).await
    }
}

/// In-process store, forgotten when the process exits
#[derive(Debug, Default)]
pub struct MemoryPeerStore {
    peers: Mutex<Vec<PeerIdentity>>,
}

impl MemoryPeerStore {
    pub fn with_peers(peers: Vec<PeerIdentity>) -> Self {
        Self {
            peers: Mutex::new(peers),
        }
    }
}

#[async_trait]
impl PeerStore for MemoryPeerStore {
    async fn load(&self) -> Result<Vec<PeerIdentity>, StoreError> {
        Ok(self.peers.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn save(&self, peers: &[PeerIdentity]) -> Result<(), StoreError> {
        *self.peers.lock().unwrap_or_else(|e| e.into_inner()) = peers.to_vec();
        Ok(())
    }
}

/// Store backed by a JSON file
#[derive(Debug, Clone)]
pub struct JsonPeerStore {
    path: PathBuf,
}

impl JsonPeerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl PeerStore for JsonPeerStore {
    async fn load(&self) -> Result<Vec<PeerIdentity>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let json = fs::read_to_string(&self.path).await?;
        match serde_json::from_str(&json) {
            Ok(peers) => Ok(peers),
            Err(e) => {
                warn!("Ignoring unreadable peer file {:?}: {}", self.path, e);
                Ok(Vec::new())
            }
        }
    }

    async fn save(&self, peers: &[PeerIdentity]) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            ensure_directory_exists(dir).await?;
        }
        let json = serde_json::to_string_pretty(peers)?;
        fs::write(&self.path, json).await?;
        info!("Saved {} peer(s) to {:?}", peers.len(), self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remember_keeps_newest_first_without_duplicates() {
        let store = MemoryPeerStore::default();
        store.remember(PeerIdentity::new("AA", "raspberrypi")).await.unwrap();
        store.remember(PeerIdentity::new("BB", "raspberrypi")).await.unwrap();
        store.remember(PeerIdentity::new("AA", "raspberrypi")).await.unwrap();

        let peers = store.load().await.unwrap();
        assert_eq!(
            peers,
            vec![
                PeerIdentity::new("AA", "raspberrypi"),
                PeerIdentity::new("BB", "raspberrypi"),
            ]
        );
        assert_eq!(store.active().await.unwrap().unwrap().address, "AA");
    }

    #[tokio::test]
    async fn json_store_survives_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("peers.json");

        let store = JsonPeerStore::new(&path);
        assert!(store.active().await.unwrap().is_none());
        store.remember(PeerIdentity::new("DC:A6:32:00:00:01", "raspberrypi")).await.unwrap();

        let reopened = JsonPeerStore::new(&path);
        let active = reopened.active().await.unwrap().unwrap();
        assert_eq!(active.address, "DC:A6:32:00:00:01");
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peers.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonPeerStore::new(&path);
        assert!(store.load().await.unwrap().is_empty());
    }
}
