//! Constants used throughout the application
//! This module contains the fixed identity of the peripheral, the UUIDs
//! of its GATT service and characteristics, and the default timeouts.

use uuid::Uuid;

/// The advertised name of the peripheral
pub const DEVICE_NAME: &str = "raspberrypi";

/// The shared key prefixed to every keyed command frame
pub const DEVICE_KEY: &str = "pisugar";

/// The UUID of the companion service exposed by the peripheral
pub const UUID_COMPANION_SERVICE: Uuid = Uuid::from_u128(0xfd2b4448_aa0f_4a15_a62f_eb0be77a0000);

/// Companion characteristics
pub const UUID_DEVICE_NAME_CHAR: Uuid = Uuid::from_u128(0xfd2b4448_aa0f_4a15_a62f_eb0be77a0001);
pub const UUID_DEVICE_MODEL_CHAR: Uuid = Uuid::from_u128(0xfd2b4448_aa0f_4a15_a62f_eb0be77a0002);
pub const UUID_WIFI_STATUS_CHAR: Uuid = Uuid::from_u128(0xfd2b4448_aa0f_4a15_a62f_eb0be77a0003);
pub const UUID_IP_ADDRESS_CHAR: Uuid = Uuid::from_u128(0xfd2b4448_aa0f_4a15_a62f_eb0be77a0004);
pub const UUID_NOTIFY_MESSAGE_CHAR: Uuid = Uuid::from_u128(0xfd2b4448_aa0f_4a15_a62f_eb0be77a0006);
pub const UUID_COMMAND_INPUT_CHAR: Uuid = Uuid::from_u128(0xfd2b4448_aa0f_4a15_a62f_eb0be77a0007);
pub const UUID_CUSTOM_COMMAND_CHAR: Uuid = Uuid::from_u128(0xfd2b4448_aa0f_4a15_a62f_eb0be77a0008);
pub const UUID_CUSTOM_COMMAND_NOTIFY_CHAR: Uuid =
    Uuid::from_u128(0xfd2b4448_aa0f_4a15_a62f_eb0be77a0009);

/// Sensor characteristics, each a read endpoint with a paired notify endpoint
pub const UUID_CPU_TEMPERATURE_CHAR: Uuid = Uuid::from_u128(0x00000000_0000_0000_0000_fd2bccca0001);
pub const UUID_CPU_TEMPERATURE_NOTIFY_CHAR: Uuid =
    Uuid::from_u128(0x00000000_0000_0000_0000_fd2bcccb0001);
pub const UUID_CPU_LOAD_CHAR: Uuid = Uuid::from_u128(0x00000000_0000_0000_0000_fd2bccca0002);
pub const UUID_CPU_LOAD_NOTIFY_CHAR: Uuid = Uuid::from_u128(0x00000000_0000_0000_0000_fd2bcccb0002);
pub const UUID_MEMORY_CHAR: Uuid = Uuid::from_u128(0x00000000_0000_0000_0000_fd2bccca0003);
pub const UUID_MEMORY_NOTIFY_CHAR: Uuid = Uuid::from_u128(0x00000000_0000_0000_0000_fd2bcccb0003);
pub const UUID_UPTIME_CHAR: Uuid = Uuid::from_u128(0x00000000_0000_0000_0000_fd2bccca0004);
pub const UUID_UPTIME_NOTIFY_CHAR: Uuid = Uuid::from_u128(0x00000000_0000_0000_0000_fd2bcccb0004);

/// Control characteristics, triggered by a keyed command frame
pub const UUID_SHUTDOWN_CHAR: Uuid = Uuid::from_u128(0x00000000_0000_0000_0000_fd2bcccc0001);
pub const UUID_REBOOT_CHAR: Uuid = Uuid::from_u128(0x00000000_0000_0000_0000_fd2bcccc0002);

/// Connect never settles on some stacks, give up after this many seconds
pub const CONNECT_TIMEOUT_SECS: u64 = 15;

/// Timeout for every other bounded Bluetooth operation in seconds
pub const BLUETOOTH_OPERATION_TIMEOUT_SECS: u64 = 5;

/// Scan windows in seconds, run back to back
pub const DEFAULT_SCAN_WINDOWS_SECS: [u64; 2] = [3, 5];

/// Keyed command packet size in bytes
pub const COMMAND_FRAME_SIZE: usize = 20;

/// Separator between the device key and the command code
pub const COMMAND_FRAME_SEPARATOR: &str = "%&%";

/// Terminator closing a keyed command frame
pub const COMMAND_FRAME_TERMINATOR: &str = "&#&";

/// Number of trailing hex digits of a control channel id used as the command code
pub const COMMAND_CODE_LEN: usize = 4;
