//! Bluetooth connection handling for the companion peripheral
//! This module connects, disconnects and walks the GATT table of a device

use bluest::{Adapter, Characteristic, Device, Uuid};
use log::info;

use crate::core::bluetooth::transport::TransportError;
use crate::core::bluetooth::types::{ChannelList, ServiceInfo};

/// A characteristic found during discovery, with the service it lives under
pub struct DiscoveredCharacteristic {
    pub service_id: Uuid,
    pub characteristic: Characteristic,
}

#[derive(Clone)]
pub struct ConnectionManager {
    adapter: Adapter,
}

impl ConnectionManager {
    pub fn new(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// A single attempt; deadlines and retries belong to the caller
    pub async fn connect(&self, device: &Device) -> Result<(), TransportError> {
        if device.is_connected().await {
            info!("Device {} already connected", device.id());
            return Ok(());
        }
        info!("Initiating connection to {}...", device.id());
        self.adapter.connect_device(device).await?;
        info!("Connection to {} successful", device.id());
        Ok(())
    }

    pub async fn disconnect(&self, device: &Device) -> Result<(), TransportError> {
        if device.is_connected().await {
            info!("Disconnecting from device {}", device.id());
            self.adapter.disconnect_device(device).await?;
            info!("Successfully disconnected");
        } else {
            info!("Device {} not connected", device.id());
        }
        Ok(())
    }

    /// Discovers every service and characteristic of a connected device
    pub async fn discover(
        &self,
        device: &Device,
    ) -> Result<(ChannelList, Vec<DiscoveredCharacteristic>), TransportError> {
        info!("Discovering services of {}...", device.id());
        let mut channels = ChannelList::default();
        let mut found = Vec::new();

        for service in device.discover_services().await? {
            let service_id = service.uuid();
            let mut channel_ids = Vec::new();
            for characteristic in service.discover_characteristics().await? {
                channel_ids.push(characteristic.uuid());
                found.push(DiscoveredCharacteristic {
                    service_id,
                    characteristic,
                });
            }
            info!("Available service: {} ({} characteristics)", service_id, channel_ids.len());
            channels.services.push(ServiceInfo {
                service_id,
                channel_ids,
            });
        }

        Ok((channels, found))
    }
}
