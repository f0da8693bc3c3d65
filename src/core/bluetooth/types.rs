//! Defines shared data structures for the Bluetooth module.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::bluetooth::channel_map::Channel;

/// A peripheral we have matched by name at least once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerIdentity {
    /// Platform address of the device (MAC on Linux/Android, a UUID on macOS)
    pub address: String,
    /// The advertised name of the device
    pub name: String,
}

impl PeerIdentity {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }
}

/// A device seen during a scan, before any name filtering
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredPeer {
    pub address: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
}

/// State of the link to the peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    Connected,
    Failed,
}

/// Outcome of the most recent subscribe/read/write against one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacteristicStatus {
    #[default]
    Init,
    Loading,
    Success,
    Error,
}

/// A GATT service and the characteristic ids found under it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceInfo {
    pub service_id: Uuid,
    pub channel_ids: Vec<Uuid>,
}

/// Service table retrieved from a connected peer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChannelList {
    pub services: Vec<ServiceInfo>,
}

impl ChannelList {
    pub fn has_service(&self, service_id: Uuid) -> bool {
        self.services.iter().any(|s| s.service_id == service_id)
    }
}

/// Raw events emitted by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    RadioStateChanged { available: bool },
    ValueChanged {
        peer: String,
        service_id: Uuid,
        channel_id: Uuid,
        value: Vec<u8>,
    },
    PeerDiscovered(DiscoveredPeer),
    ScanStopped,
}

/// Events rebroadcast to external listeners such as a UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SessionEvent {
    ConnectionStateChanged { state: ConnectionState },
    CharacteristicStatusChanged {
        channel: Channel,
        status: CharacteristicStatus,
    },
    RadioAvailabilityChanged { available: bool },
    ValueChanged { channel: Channel, value: Vec<u8> },
    PeerDiscovered { peer: PeerIdentity },
    ScanStopped,
}

/// Result of a connect request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// No peer was known, a scan ran instead of a connect
    Rescanned(PeerIdentity),
    /// The link is up. Standing notifications that could not be started are listed.
    Connected { failed_subscriptions: Vec<Channel> },
}

/// Decodes a channel value the way the peripheral encodes it, as text
pub fn value_as_text(value: &[u8]) -> String {
    String::from_utf8_lossy(value)
        .trim_end_matches('\0')
        .to_string()
}
