//! Compiled-in table of the peripheral's logical channels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::bluetooth::constants::*;

/// What a channel can be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    Read,
    Write,
    Notify,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Notify => write!(f, "notify"),
        }
    }
}

/// Address and access mode of one logical channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelDescriptor {
    pub name: &'static str,
    pub service_id: Uuid,
    pub channel_id: Uuid,
    pub access: AccessMode,
}

/// Logical channels of the peripheral.
///
/// The discriminant is the row of the channel in [`CHANNEL_MAP`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    DeviceName,
    DeviceModel,
    WifiStatus,
    IpAddress,
    NotifyMessage,
    CommandInput,
    CustomCommand,
    CustomCommandResponse,
    CpuTemperature,
    CpuTemperatureNotify,
    CpuLoad,
    CpuLoadNotify,
    Memory,
    MemoryNotify,
    Uptime,
    UptimeNotify,
    Shutdown,
    Reboot,
}

const fn row(name: &'static str, channel_id: Uuid, access: AccessMode) -> ChannelDescriptor {
    ChannelDescriptor {
        name,
        service_id: UUID_COMPANION_SERVICE,
        channel_id,
        access,
    }
}

/// The channel table, in [`Channel`] order
pub static CHANNEL_MAP: [ChannelDescriptor; 18] = [
    row("device-name", UUID_DEVICE_NAME_CHAR, AccessMode::Read),
    row("device-model", UUID_DEVICE_MODEL_CHAR, AccessMode::Read),
    row("wifi-status", UUID_WIFI_STATUS_CHAR, AccessMode::Notify),
    row("ip-address", UUID_IP_ADDRESS_CHAR, AccessMode::Notify),
    row("notify-message", UUID_NOTIFY_MESSAGE_CHAR, AccessMode::Notify),
    row("command-input", UUID_COMMAND_INPUT_CHAR, AccessMode::Write),
    row("custom-command", UUID_CUSTOM_COMMAND_CHAR, AccessMode::Write),
    row("custom-command-response", UUID_CUSTOM_COMMAND_NOTIFY_CHAR, AccessMode::Notify),
    row("cpu-temperature", UUID_CPU_TEMPERATURE_CHAR, AccessMode::Read),
    row("cpu-temperature-notify", UUID_CPU_TEMPERATURE_NOTIFY_CHAR, AccessMode::Notify),
    row("cpu-load", UUID_CPU_LOAD_CHAR, AccessMode::Read),
    row("cpu-load-notify", UUID_CPU_LOAD_NOTIFY_CHAR, AccessMode::Notify),
    row("memory", UUID_MEMORY_CHAR, AccessMode::Read),
    row("memory-notify", UUID_MEMORY_NOTIFY_CHAR, AccessMode::Notify),
    row("uptime", UUID_UPTIME_CHAR, AccessMode::Read),
    row("uptime-notify", UUID_UPTIME_NOTIFY_CHAR, AccessMode::Notify),
    row("shutdown", UUID_SHUTDOWN_CHAR, AccessMode::Read),
    row("reboot", UUID_REBOOT_CHAR, AccessMode::Read),
];

/// Every channel, in table order
pub const ALL_CHANNELS: [Channel; 18] = [
    Channel::DeviceName,
    Channel::DeviceModel,
    Channel::WifiStatus,
    Channel::IpAddress,
    Channel::NotifyMessage,
    Channel::CommandInput,
    Channel::CustomCommand,
    Channel::CustomCommandResponse,
    Channel::CpuTemperature,
    Channel::CpuTemperatureNotify,
    Channel::CpuLoad,
    Channel::CpuLoadNotify,
    Channel::Memory,
    Channel::MemoryNotify,
    Channel::Uptime,
    Channel::UptimeNotify,
    Channel::Shutdown,
    Channel::Reboot,
];

/// Notification channels every session subscribes to
pub const STANDING_NOTIFICATIONS: [Channel; 2] =
    [Channel::WifiStatus, Channel::CustomCommandResponse];

impl Channel {
    pub fn descriptor(self) -> &'static ChannelDescriptor {
        &CHANNEL_MAP[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub fn service_id(self) -> Uuid {
        self.descriptor().service_id
    }

    pub fn channel_id(self) -> Uuid {
        self.descriptor().channel_id
    }

    pub fn access(self) -> AccessMode {
        self.descriptor().access
    }

    /// Finds the channel addressed by a notification, if it is one of ours
    pub fn from_ids(service_id: Uuid, channel_id: Uuid) -> Option<Self> {
        ALL_CHANNELS.iter().copied().find(|channel| {
            let descriptor = channel.descriptor();
            descriptor.service_id == service_id && descriptor.channel_id == channel_id
        })
    }

    /// Label used in user-facing subscription failures
    pub fn notification_label(self) -> &'static str {
        match self {
            Self::WifiStatus => "characteristic",
            Self::CustomCommandResponse => "custom command",
            other => other.name(),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown channel: {0}")]
pub struct UnknownChannel(pub String);

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_CHANNELS
            .iter()
            .copied()
            .find(|channel| channel.name() == s)
            .ok_or_else(|| UnknownChannel(s.to_string()))
    }
}

/// Looks a channel descriptor up by its logical name.
///
/// # Panics
///
/// Panics if `name` is not in the table. Names are compiled in, so an
/// unknown one is a bug in the caller.
pub fn lookup(name: &str) -> &'static ChannelDescriptor {
    match name.parse::<Channel>() {
        Ok(channel) => channel.descriptor(),
        Err(e) => panic!("{e}"),
    }
}
