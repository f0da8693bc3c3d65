//! Bluetooth manager for the companion bridge
//! This module is the bluest-backed transport: it owns the adapter, the
//! device and characteristic caches, and the scan and notification tasks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bluest::{Adapter, AdapterEvent, Characteristic, Device};
use futures_util::StreamExt;
use log::{error, info, warn};
use tokio::sync::{OnceCell, broadcast};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::bluetooth::connection::ConnectionManager;
use crate::core::bluetooth::notification::NotificationHandler;
use crate::core::bluetooth::scanner::{BluetoothScanner, DeviceCache};
use crate::core::bluetooth::transport::{Transport, TransportError};
use crate::core::bluetooth::types::{ChannelList, TransportEvent};

const EVENT_CAPACITY: usize = 256;
const RADIO_PROBE: Duration = Duration::from_millis(500);
/// How long a connect may spend finding a peer this process has not seen
const REDISCOVERY_WINDOW: Duration = Duration::from_secs(10);

type CharacteristicKey = (String, Uuid, Uuid);

/// Adapter-backed parts, created on initialize
struct Stack {
    adapter: Adapter,
    scanner: BluetoothScanner,
    connection_manager: ConnectionManager,
    radio_watcher: JoinHandle<()>,
}

/// Manages Bluetooth operations
pub struct BluetoothManager {
    events: broadcast::Sender<TransportEvent>,
    /// Map of device addresses to devices
    devices: DeviceCache,
    /// Characteristics found by the last service discovery of each peer
    characteristics: Mutex<HashMap<CharacteristicKey, Characteristic>>,
    notification_handler: NotificationHandler,
    stack: OnceCell<Stack>,
}

impl Default for BluetoothManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BluetoothManager {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            notification_handler: NotificationHandler::new(events.clone()),
            events,
            devices: Arc::new(Mutex::new(HashMap::new())),
            characteristics: Mutex::new(HashMap::new()),
            stack: OnceCell::new(),
        }
    }

    fn stack(&self) -> Result<&Stack, TransportError> {
        self.stack.get().ok_or(TransportError::NotInitialized)
    }

    fn device(&self, peer: &str) -> Result<Device, TransportError> {
        self.devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(peer)
            .cloned()
            .ok_or_else(|| TransportError::PeerUnknown {
                peer: peer.to_string(),
            })
    }

    /// The cached device, or one found again by address.
    ///
    /// Saved peers outlive the process that scanned them, so a cache miss
    /// is normal for a fresh process.
    async fn resolve(&self, stack: &Stack, peer: &str) -> Result<Device, TransportError> {
        if let Ok(device) = self.device(peer) {
            return Ok(device);
        }
        stack
            .scanner
            .find(peer, REDISCOVERY_WINDOW)
            .await?
            .ok_or_else(|| TransportError::PeerUnknown {
                peer: peer.to_string(),
            })
    }

    fn characteristic(
        &self,
        peer: &str,
        service: Uuid,
        channel: Uuid,
    ) -> Result<Characteristic, TransportError> {
        self.characteristics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(peer.to_string(), service, channel))
            .cloned()
            .ok_or(TransportError::CharacteristicNotFound {
                service,
                characteristic: channel,
            })
    }

    fn watch_radio(adapter: Adapter, events: broadcast::Sender<TransportEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut adapter_events = match adapter.events().await {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Failed to watch adapter state: {}", e);
                    return;
                }
            };
            while let Some(event) = adapter_events.next().await {
                let available = match event {
                    Ok(AdapterEvent::Available) => true,
                    Ok(AdapterEvent::Unavailable) => false,
                    Err(e) => {
                        warn!("Adapter event error: {}", e);
                        continue;
                    }
                };
                let _ = events.send(TransportEvent::RadioStateChanged { available });
            }
            info!("Adapter event stream ended");
        })
    }
}

#[async_trait]
impl Transport for BluetoothManager {
    async fn initialize(&self) -> Result<(), TransportError> {
        self.stack
            .get_or_try_init(|| async {
                let adapter = Adapter::default()
                    .await
                    .ok_or(TransportError::AdapterNotAvailable)?;
                info!("Bluetooth adapter found.");
                Ok::<_, TransportError>(Stack {
                    scanner: BluetoothScanner::new(
                        adapter.clone(),
                        self.devices.clone(),
                        self.events.clone(),
                    ),
                    connection_manager: ConnectionManager::new(adapter.clone()),
                    radio_watcher: Self::watch_radio(adapter.clone(), self.events.clone()),
                    adapter,
                })
            })
            .await?;
        Ok(())
    }

    async fn check_radio_state(&self) -> Result<(), TransportError> {
        let adapter = &self.stack()?.adapter;
        // wait_available returns at once when the radio is already on
        let available = match tokio::time::timeout(RADIO_PROBE, adapter.wait_available()).await {
            Ok(result) => {
                result?;
                true
            }
            Err(_) => false,
        };
        let _ = self.events.send(TransportEvent::RadioStateChanged { available });
        Ok(())
    }

    async fn scan(
        &self,
        filters: Vec<Uuid>,
        window: Duration,
        allow_duplicates: bool,
    ) -> Result<(), TransportError> {
        self.stack()?
            .scanner
            .scan(&filters, window, allow_duplicates)
            .await
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        self.stack()?.scanner.stop();
        Ok(())
    }

    async fn is_connected(&self, peer: &str, services: &[Uuid]) -> Result<bool, TransportError> {
        let stack = self.stack()?;
        if let Ok(device) = self.device(peer) {
            return Ok(device.is_connected().await);
        }

        // not seen in this process; the system may still hold a connection
        for device in stack.adapter.connected_devices_with_services(services).await? {
            if BluetoothScanner::address_of(&device) == peer {
                self.devices
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(peer.to_string(), device);
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn connect(&self, peer: &str) -> Result<(), TransportError> {
        let stack = self.stack()?;
        let device = self.resolve(stack, peer).await?;
        stack.connection_manager.connect(&device).await
    }

    async fn disconnect(&self, peer: &str) -> Result<(), TransportError> {
        let stack = self.stack()?;
        self.notification_handler.stop_peer(peer);
        self.characteristics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(address, _, _), _| address != peer);
        let device = self.device(peer)?;
        stack.connection_manager.disconnect(&device).await
    }

    async fn retrieve_channels(&self, peer: &str) -> Result<ChannelList, TransportError> {
        let stack = self.stack()?;
        let device = self.device(peer)?;
        let (channels, found) = stack.connection_manager.discover(&device).await?;

        let mut characteristics = self.characteristics.lock().unwrap_or_else(|e| e.into_inner());
        characteristics.retain(|(address, _, _), _| address != peer);
        for entry in found {
            characteristics.insert(
                (peer.to_string(), entry.service_id, entry.characteristic.uuid()),
                entry.characteristic,
            );
        }
        Ok(channels)
    }

    async fn read(&self, peer: &str, service: Uuid, channel: Uuid) -> Result<Vec<u8>, TransportError> {
        self.stack()?;
        let characteristic = self.characteristic(peer, service, channel)?;
        Ok(characteristic.read().await?)
    }

    async fn write(
        &self,
        peer: &str,
        service: Uuid,
        channel: Uuid,
        data: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.stack()?;
        let characteristic = self.characteristic(peer, service, channel)?;
        info!("Writing {} bytes to {}", data.len(), channel);
        characteristic.write(&data).await?;
        Ok(())
    }

    async fn subscribe(&self, peer: &str, service: Uuid, channel: Uuid) -> Result<(), TransportError> {
        self.stack()?;
        let characteristic = self.characteristic(peer, service, channel)?;
        self.notification_handler
            .start(peer, service, characteristic)
            .await
    }

    async fn unsubscribe(
        &self,
        peer: &str,
        _service: Uuid,
        channel: Uuid,
    ) -> Result<(), TransportError> {
        if !self.notification_handler.stop(peer, channel) {
            info!("No notifications were active on {}", channel);
        }
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

impl Drop for BluetoothManager {
    fn drop(&mut self) {
        if let Some(stack) = self.stack.get() {
            stack.radio_watcher.abort();
        }
    }
}
