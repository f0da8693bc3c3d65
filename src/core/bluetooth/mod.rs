//! Bluetooth functionality for the companion bridge
//! This module describes the peripheral's channels and command frames, and
//! provides the transport that scans, connects and exchanges data with it.

pub mod channel_map;
pub mod commands;
mod connection;
pub mod constants;
mod manager;
mod notification;
mod scanner;
pub mod transport;
pub mod types;

// Re-export types that should be publicly accessible
pub use channel_map::{AccessMode, Channel, ChannelDescriptor};
pub use commands::{ControlCommand, FrameError};
pub use manager::BluetoothManager;
pub use transport::{Transport, TransportError};
pub use types::{
    ChannelList, CharacteristicStatus, ConnectOutcome, ConnectionState, DiscoveredPeer,
    PeerIdentity, SessionEvent, TransportEvent, value_as_text,
};
