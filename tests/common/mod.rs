#![allow(dead_code)]

use std::collections::HashMap;
use std::future::pending;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, broadcast};
use uuid::Uuid;

use pi_companion_bridge_lib::config::bridge_config::BridgeConfig;
use pi_companion_bridge_lib::core::bluetooth::channel_map::ALL_CHANNELS;
use pi_companion_bridge_lib::core::bluetooth::constants::UUID_COMPANION_SERVICE;
use pi_companion_bridge_lib::core::bluetooth::types::ServiceInfo;
use pi_companion_bridge_lib::core::bluetooth::{
    ChannelList, DiscoveredPeer, PeerIdentity, Transport, TransportError, TransportEvent,
};
use pi_companion_bridge_lib::core::session::{
    CallKind, Capability, MemoryPeerStore, PermissionGate, PermissionStatus, SessionController,
};

pub const PI_ADDRESS: &str = "DC:A6:32:01:02:03";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    Hang,
}

/// Scripted transport: every call is counted and answers per its kind,
/// or per kind and channel when one is scripted
pub struct FakeTransport {
    events: broadcast::Sender<TransportEvent>,
    behaviors: Mutex<HashMap<CallKind, Behavior>>,
    channel_behaviors: Mutex<HashMap<(CallKind, Uuid), Behavior>>,
    calls: Mutex<Vec<CallKind>>,
    scan_windows: Mutex<Vec<Duration>>,
    /// Peers advertised during the scan pass at the given index
    advertisements: Mutex<HashMap<usize, Vec<DiscoveredPeer>>>,
    /// Peers advertised just as the pass at the given index ends
    late_advertisements: Mutex<HashMap<usize, Vec<DiscoveredPeer>>>,
    reads: Mutex<HashMap<Uuid, Vec<u8>>>,
    writes: Mutex<Vec<(Uuid, Vec<u8>)>>,
    connected: AtomicBool,
    stop: Notify,
    channels: Mutex<ChannelList>,
}

impl Default for FakeTransport {
    fn default() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            events,
            behaviors: Mutex::new(HashMap::new()),
            channel_behaviors: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            scan_windows: Mutex::new(Vec::new()),
            advertisements: Mutex::new(HashMap::new()),
            late_advertisements: Mutex::new(HashMap::new()),
            reads: Mutex::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
            stop: Notify::new(),
            channels: Mutex::new(companion_channels()),
        }
    }
}

/// The service table the Pi exposes
pub fn companion_channels() -> ChannelList {
    let mut by_service: Vec<ServiceInfo> = Vec::new();
    for channel in ALL_CHANNELS {
        match by_service
            .iter_mut()
            .find(|s| s.service_id == channel.service_id())
        {
            Some(service) => service.channel_ids.push(channel.channel_id()),
            None => by_service.push(ServiceInfo {
                service_id: channel.service_id(),
                channel_ids: vec![channel.channel_id()],
            }),
        }
    }
    assert!(by_service.iter().any(|s| s.service_id == UUID_COMPANION_SERVICE));
    ChannelList {
        services: by_service,
    }
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, kind: CallKind, behavior: Behavior) {
        self.behaviors.lock().unwrap().insert(kind, behavior);
    }

    pub fn set_on(&self, kind: CallKind, channel_id: Uuid, behavior: Behavior) {
        self.channel_behaviors
            .lock()
            .unwrap()
            .insert((kind, channel_id), behavior);
    }

    pub fn advertise_late_on_pass(&self, pass: usize, peer: DiscoveredPeer) {
        self.late_advertisements
            .lock()
            .unwrap()
            .entry(pass)
            .or_default()
            .push(peer);
    }

    pub fn advertise_on_pass(&self, pass: usize, peer: DiscoveredPeer) {
        self.advertisements
            .lock()
            .unwrap()
            .entry(pass)
            .or_default()
            .push(peer);
    }

    pub fn set_read(&self, channel_id: Uuid, value: &[u8]) {
        self.reads.lock().unwrap().insert(channel_id, value.to_vec());
    }

    pub fn set_channels(&self, channels: ChannelList) {
        *self.channels.lock().unwrap() = channels;
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_link_up(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.calls.lock().unwrap().iter().filter(|k| **k == kind).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn scan_windows(&self) -> Vec<Duration> {
        self.scan_windows.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.writes.lock().unwrap().clone()
    }

    /// Pushes an event as if the platform stack had raised it
    pub fn raise(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    /// Records the call and resolves its scripted outcome
    async fn answer(&self, kind: CallKind) -> Result<(), TransportError> {
        self.answer_on(kind, None).await
    }

    async fn answer_on(&self, kind: CallKind, channel_id: Option<Uuid>) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push(kind);
        let scripted = channel_id.and_then(|id| {
            self.channel_behaviors
                .lock()
                .unwrap()
                .get(&(kind, id))
                .copied()
        });
        let behavior = scripted
            .or_else(|| self.behaviors.lock().unwrap().get(&kind).copied())
            .unwrap_or(Behavior::Succeed);
        match behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err(TransportError::Other(format!("{:?} refused", kind))),
            Behavior::Hang => pending().await,
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn initialize(&self) -> Result<(), TransportError> {
        self.answer(CallKind::Initialize).await
    }

    async fn check_radio_state(&self) -> Result<(), TransportError> {
        self.answer(CallKind::CheckRadio).await?;
        self.raise(TransportEvent::RadioStateChanged { available: true });
        Ok(())
    }

    async fn scan(
        &self,
        _filters: Vec<Uuid>,
        window: Duration,
        _allow_duplicates: bool,
    ) -> Result<(), TransportError> {
        self.answer(CallKind::Scan).await?;
        let pass = {
            let mut windows = self.scan_windows.lock().unwrap();
            windows.push(window);
            windows.len() - 1
        };

        let stopped = self.stop.notified();
        tokio::pin!(stopped);
        stopped.as_mut().enable();

        let peers = self
            .advertisements
            .lock()
            .unwrap()
            .get(&pass)
            .cloned()
            .unwrap_or_default();
        for peer in peers {
            self.raise(TransportEvent::PeerDiscovered(peer));
        }

        tokio::select! {
            _ = tokio::time::sleep(window) => {}
            _ = &mut stopped => {}
        }

        let late = self
            .late_advertisements
            .lock()
            .unwrap()
            .get(&pass)
            .cloned()
            .unwrap_or_default();
        for peer in late {
            self.raise(TransportEvent::PeerDiscovered(peer));
        }
        self.raise(TransportEvent::ScanStopped);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        self.answer(CallKind::StopScan).await?;
        self.stop.notify_waiters();
        Ok(())
    }

    async fn is_connected(&self, _peer: &str, _services: &[Uuid]) -> Result<bool, TransportError> {
        self.answer(CallKind::CheckConnected).await?;
        Ok(self.is_link_up())
    }

    async fn connect(&self, _peer: &str) -> Result<(), TransportError> {
        self.answer(CallKind::Connect).await?;
        self.set_connected(true);
        Ok(())
    }

    async fn disconnect(&self, _peer: &str) -> Result<(), TransportError> {
        self.answer(CallKind::Disconnect).await?;
        self.set_connected(false);
        Ok(())
    }

    async fn retrieve_channels(&self, _peer: &str) -> Result<ChannelList, TransportError> {
        self.answer(CallKind::RetrieveChannels).await?;
        Ok(self.channels.lock().unwrap().clone())
    }

    async fn read(&self, _peer: &str, _service: Uuid, channel: Uuid) -> Result<Vec<u8>, TransportError> {
        self.answer_on(CallKind::Read, Some(channel)).await?;
        Ok(self
            .reads
            .lock()
            .unwrap()
            .get(&channel)
            .cloned()
            .unwrap_or_default())
    }

    async fn write(
        &self,
        _peer: &str,
        _service: Uuid,
        channel: Uuid,
        data: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.answer_on(CallKind::Write, Some(channel)).await?;
        self.writes.lock().unwrap().push((channel, data));
        Ok(())
    }

    async fn subscribe(&self, _peer: &str, _service: Uuid, channel: Uuid) -> Result<(), TransportError> {
        self.answer_on(CallKind::Subscribe, Some(channel)).await
    }

    async fn unsubscribe(
        &self,
        _peer: &str,
        _service: Uuid,
        channel: Uuid,
    ) -> Result<(), TransportError> {
        self.answer_on(CallKind::Unsubscribe, Some(channel)).await
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

/// Answers every check and request with a fixed status per capability
pub struct FakePermissionGate {
    statuses: Vec<(Capability, PermissionStatus)>,
}

impl FakePermissionGate {
    pub fn new(statuses: Vec<(Capability, PermissionStatus)>) -> Arc<Self> {
        Arc::new(Self { statuses })
    }

    pub fn granted() -> Arc<Self> {
        Self::new(vec![
            (Capability::BluetoothScan, PermissionStatus::Granted),
            (Capability::BluetoothConnect, PermissionStatus::Granted),
        ])
    }

    fn status(&self, capability: Capability) -> PermissionStatus {
        self.statuses
            .iter()
            .find(|(c, _)| *c == capability)
            .map(|(_, s)| *s)
            .unwrap_or(PermissionStatus::Denied)
    }
}

#[async_trait]
impl PermissionGate for FakePermissionGate {
    fn capabilities(&self) -> Vec<Capability> {
        self.statuses.iter().map(|(c, _)| *c).collect()
    }

    async fn check(&self, capability: Capability) -> PermissionStatus {
        self.status(capability)
    }

    async fn request(&self, capability: Capability) -> PermissionStatus {
        self.status(capability)
    }
}

pub fn pi_peer() -> PeerIdentity {
    PeerIdentity::new(PI_ADDRESS, "raspberrypi")
}

pub fn advertised(name: &str) -> DiscoveredPeer {
    DiscoveredPeer {
        address: PI_ADDRESS.to_string(),
        name: Some(name.to_string()),
        rssi: Some(-60),
    }
}

pub struct Harness {
    pub transport: Arc<FakeTransport>,
    pub peers: Arc<MemoryPeerStore>,
    pub controller: SessionController,
}

pub fn harness(gate: Arc<FakePermissionGate>, peers: Vec<PeerIdentity>) -> Harness {
    let transport = FakeTransport::new();
    let peers = Arc::new(MemoryPeerStore::with_peers(peers));
    let controller = SessionController::new(
        transport.clone(),
        gate,
        peers.clone(),
        BridgeConfig::default(),
    );
    Harness {
        transport,
        peers,
        controller,
    }
}

/// Lets the router drain pending events
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
