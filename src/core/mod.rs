//! Core functionality for the companion bridge
//! This module contains the Bluetooth transport and the session that drives it

pub mod bluetooth;
pub mod error;
pub mod session;

// Re-export commonly used types
pub use bluetooth::BluetoothManager;
pub use error::{BridgeError, BridgeResult};
pub use session::SessionController;
