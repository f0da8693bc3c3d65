//! The Bluetooth surface the session drives.
//!
//! Every call may fail, hang, or settle long after the caller stopped
//! waiting, so the session never calls these directly: each call goes
//! through the operation pipeline.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::core::bluetooth::types::{ChannelList, TransportEvent};

/// Errors reported by a transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Bluetooth adapter not available")]
    AdapterNotAvailable,

    #[error("Transport has not been initialized")]
    NotInitialized,

    #[error("Peer not found: {peer}")]
    PeerUnknown { peer: String },

    #[error("Characteristic not found: {service}/{characteristic}")]
    CharacteristicNotFound { service: Uuid, characteristic: Uuid },

    #[error("Notification stream ended before it started")]
    NotificationStreamClosed,

    #[error(transparent)]
    Bluetooth(#[from] bluest::Error),

    #[error("{0}")]
    Other(String),
}

/// A platform Bluetooth central
#[async_trait]
pub trait Transport: Send + Sync {
    /// Brings up the platform stack
    async fn initialize(&self) -> Result<(), TransportError>;

    /// Asks the stack to report its radio state as a `RadioStateChanged` event
    async fn check_radio_state(&self) -> Result<(), TransportError>;

    /// Scans for `window`, returning early if `stop_scan` is called
    async fn scan(
        &self,
        filters: Vec<Uuid>,
        window: Duration,
        allow_duplicates: bool,
    ) -> Result<(), TransportError>;

    async fn stop_scan(&self) -> Result<(), TransportError>;

    async fn is_connected(&self, peer: &str, services: &[Uuid]) -> Result<bool, TransportError>;

    async fn connect(&self, peer: &str) -> Result<(), TransportError>;

    async fn disconnect(&self, peer: &str) -> Result<(), TransportError>;

    /// Discovers the services and characteristics of a connected peer
    async fn retrieve_channels(&self, peer: &str) -> Result<ChannelList, TransportError>;

    async fn read(&self, peer: &str, service: Uuid, channel: Uuid) -> Result<Vec<u8>, TransportError>;

    async fn write(
        &self,
        peer: &str,
        service: Uuid,
        channel: Uuid,
        data: Vec<u8>,
    ) -> Result<(), TransportError>;

    /// Starts notifications; values arrive as `ValueChanged` events
    async fn subscribe(&self, peer: &str, service: Uuid, channel: Uuid) -> Result<(), TransportError>;

    async fn unsubscribe(&self, peer: &str, service: Uuid, channel: Uuid)
    -> Result<(), TransportError>;

    /// A fresh receiver on the transport's event stream
    fn events(&self) -> broadcast::Receiver<TransportEvent>;
}
