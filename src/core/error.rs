//! Error types for the session
//!
//! Every stage of a command has its own variant so that the message shown
//! to the user names the stage that failed.

use thiserror::Error;

use crate::core::bluetooth::channel_map::{AccessMode, Channel};
use crate::core::bluetooth::commands::FrameError;
use crate::core::session::peer_store::StoreError;
use crate::core::session::permission::PermissionError;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bluetooth has not been activated")]
    NotInitialized,

    #[error("Unable to initialize Bluetooth")]
    Activation,

    #[error(transparent)]
    Permission(#[from] PermissionError),

    #[error("Unable to scan for devices")]
    Scan,

    #[error("No device named {name} was found nearby")]
    PeerNotDiscovered { name: String },

    #[error("The device could not be found. Try moving closer.")]
    PeerNotFound,

    #[error("No MAC saved. Please rescan for devices before attempting to write.")]
    NoSavedPeer,

    #[error("Unable to find device. Try moving closer.")]
    DeviceNotFound,

    #[error("Unable to retrieve services")]
    ServiceRetrieval,

    #[error("Unable to start {} notification", .channel.notification_label())]
    Subscription { channel: Channel },

    #[error("Unable to write to device")]
    Write,

    #[error("Unable to read from device")]
    Read,

    #[error("Channel {channel} does not support {requested} access")]
    AccessMode {
        channel: Channel,
        requested: AccessMode,
    },

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("Unable to access saved devices: {0}")]
    PeerStore(#[from] StoreError),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
