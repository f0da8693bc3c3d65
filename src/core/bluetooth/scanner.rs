use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bluest::{Adapter, Device, Uuid};
use futures_util::{Stream, StreamExt};
use log::{debug, info};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::transport::TransportError;
use crate::core::bluetooth::types::{DiscoveredPeer, TransportEvent};
use crate::utils::extract_mac_address;

/// Devices seen by this process, by address
pub type DeviceCache = Arc<Mutex<HashMap<String, Device>>>;

pub struct BluetoothScanner {
    adapter: Adapter,
    devices: DeviceCache,
    cancel_token: Mutex<CancellationToken>,
    events: broadcast::Sender<TransportEvent>,
}

impl BluetoothScanner {
    pub fn new(
        adapter: Adapter,
        devices: DeviceCache,
        events: broadcast::Sender<TransportEvent>,
    ) -> Self {
        Self {
            adapter,
            devices,
            cancel_token: Mutex::new(CancellationToken::new()),
            events,
        }
    }

    /// Address used for a device: its MAC when the platform id carries one
    pub fn address_of(device: &Device) -> String {
        let id = device.id().to_string();
        extract_mac_address(&id).unwrap_or(id)
    }

    /// Reports every device seen within `window`, or until `stop` is called.
    ///
    /// Devices the system is already connected to never advertise, so they
    /// are reported first.
    pub async fn scan(
        &self,
        filters: &[Uuid],
        window: Duration,
        allow_duplicates: bool,
    ) -> Result<(), TransportError> {
        let cancel_token = {
            let mut current = self.cancel_token.lock().unwrap_or_else(|e| e.into_inner());
            *current = CancellationToken::new();
            current.clone()
        };

        info!("Checking for connected devices");
        for device in self.adapter.connected_devices().await? {
            let name = device.name().ok();
            self.report(device, name, None);
        }

        info!("Starting bluetooth scan for {:?}", window);
        let mut scan_stream = self.adapter.scan(filters).await?;
        let mut seen = HashSet::new();
        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(discovered) => {
                            let address = Self::address_of(&discovered.device);
                            if !allow_duplicates && !seen.insert(address) {
                                continue;
                            }
                            debug!("Found device - Device: {:?}, RSSI: {:?}", discovered.device, discovered.rssi);
                            let name = discovered
                                .adv_data
                                .local_name
                                .clone()
                                .or_else(|| discovered.device.name().ok());
                            self.report(discovered.device, name, discovered.rssi);
                        }
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    }
                }
                _ = cancel_token.cancelled() => {
                    info!("Bluetooth scan stopped.");
                    break;
                }
                _ = &mut deadline => {
                    info!("Bluetooth scan window elapsed.");
                    break;
                }
            }
        }

        let _ = self.events.send(TransportEvent::ScanStopped);
        Ok(())
    }

    /// Looks for `address` among connected devices, then among advertisers
    /// for at most `window`. A device found is cached but not reported.
    pub async fn find(&self, address: &str, window: Duration) -> Result<Option<Device>, TransportError> {
        let connected = self.adapter.connected_devices().await?;
        let mut found =
            first_with_address(futures_util::stream::iter(connected), address, Self::address_of).await;

        if found.is_none() {
            info!("{} not seen yet, scanning up to {:?} for it", address, window);
            let advertising = self
                .adapter
                .scan(&[])
                .await?
                .map(|discovered| discovered.device);
            found = tokio::time::timeout(
                window,
                first_with_address(advertising, address, Self::address_of),
            )
            .await
            .ok()
            .flatten();
        }

        if let Some(device) = &found {
            self.devices
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(address.to_string(), device.clone());
        }
        Ok(found)
    }

    pub fn stop(&self) {
        self.cancel_token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
    }

    fn report(&self, device: Device, name: Option<String>, rssi: Option<i16>) {
        let address = Self::address_of(&device);
        self.devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(address.clone(), device);

        let _ = self.events.send(TransportEvent::PeerDiscovered(DiscoveredPeer {
            address,
            name,
            rssi,
        }));
    }
}

/// First item of `stream` whose address matches, ignoring case
pub(crate) async fn first_with_address<S, T>(
    mut stream: S,
    address: &str,
    address_of: impl Fn(&T) -> String,
) -> Option<T>
where
    S: Stream<Item = T> + Unpin,
{
    while let Some(item) = stream.next().await {
        if address_of(&item).eq_ignore_ascii_case(address) {
            return Some(item);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[tokio::test]
    async fn saved_address_matches_regardless_of_case() {
        let ids = stream::iter(vec!["AA:BB:CC:00:00:01", "dc:a6:32:01:02:03", "DC:A6:32:01:02:03"]);
        let found = first_with_address(ids, "DC:A6:32:01:02:03", |id: &&str| id.to_string()).await;
        assert_eq!(found, Some("dc:a6:32:01:02:03"));
    }

    #[tokio::test]
    async fn ended_scan_finds_nothing() {
        let ids = stream::iter(vec!["AA:BB:CC:00:00:01".to_string()]);
        let found = first_with_address(ids, "DC:A6:32:01:02:03", |id: &String| id.clone()).await;
        assert_eq!(found, None);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_is_given_up_after_the_window() {
        let silent = stream::pending::<String>();
        let found = tokio::time::timeout(
            Duration::from_secs(10),
            first_with_address(silent, "DC:A6:32:01:02:03", |id: &String| id.clone()),
        )
        .await;
        assert!(found.is_err());
    }
}
