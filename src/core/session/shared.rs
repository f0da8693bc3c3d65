//! Observations shared between the session controller and the event router.
//!
//! The connection state is written by the controller only; the router
//! records radio availability, channel values and discovery matches.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::core::bluetooth::channel_map::Channel;
use crate::core::bluetooth::types::{
    CharacteristicStatus, ConnectionState, PeerIdentity, SessionEvent,
};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct Observations {
    connection: ConnectionState,
    statuses: HashMap<Channel, CharacteristicStatus>,
    last_values: HashMap<Channel, Vec<u8>>,
    subscriptions: BTreeSet<Channel>,
    radio_available: bool,
    peer: Option<PeerIdentity>,
    scan_match: Option<PeerIdentity>,
    permission_error: Option<String>,
}

pub struct SessionShared {
    inner: Mutex<Observations>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for SessionShared {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionShared {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Mutex::new(Observations::default()),
            events,
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Observations) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Best-effort broadcast; dropped when nobody listens
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.with(|o| o.connection)
    }

    pub(crate) fn set_connection_state(&self, state: ConnectionState) {
        let changed = self.with(|o| std::mem::replace(&mut o.connection, state) != state);
        if changed {
            self.emit(SessionEvent::ConnectionStateChanged { state });
        }
    }

    pub fn characteristic_status(&self, channel: Channel) -> CharacteristicStatus {
        self.with(|o| o.statuses.get(&channel).copied().unwrap_or_default())
    }

    pub(crate) fn set_status(&self, channel: Channel, status: CharacteristicStatus) {
        self.with(|o| o.statuses.insert(channel, status));
        self.emit(SessionEvent::CharacteristicStatusChanged { channel, status });
    }

    pub fn last_value(&self, channel: Channel) -> Option<Vec<u8>> {
        self.with(|o| o.last_values.get(&channel).cloned())
    }

    pub(crate) fn record_value(&self, channel: Channel, value: Vec<u8>) {
        self.with(|o| o.last_values.insert(channel, value.clone()));
        self.emit(SessionEvent::ValueChanged { channel, value });
    }

    pub fn radio_available(&self) -> bool {
        self.with(|o| o.radio_available)
    }

    pub(crate) fn set_radio_available(&self, available: bool) {
        self.with(|o| o.radio_available = available);
        self.emit(SessionEvent::RadioAvailabilityChanged { available });
    }

    pub fn peer(&self) -> Option<PeerIdentity> {
        self.with(|o| o.peer.clone())
    }

    /// The peer recorded since the last `begin_scan`
    pub fn scan_match(&self) -> Option<PeerIdentity> {
        self.with(|o| o.scan_match.clone())
    }

    pub(crate) fn add_subscription(&self, channel: Channel) {
        self.with(|o| o.subscriptions.insert(channel));
    }

    pub(crate) fn take_subscriptions(&self) -> Vec<Channel> {
        self.with(|o| std::mem::take(&mut o.subscriptions).into_iter().collect())
    }

    pub fn permission_error(&self) -> Option<String> {
        self.with(|o| o.permission_error.clone())
    }

    pub(crate) fn set_permission_error(&self, message: Option<String>) {
        self.with(|o| o.permission_error = message);
    }

    /// Clears the match of the previous scan
    pub(crate) fn begin_scan(&self) {
        self.with(|o| o.scan_match = None);
    }

    /// Records `peer` as the match of the current scan.
    ///
    /// Only the first match while `Scanning` is kept; false otherwise.
    pub(crate) fn claim_match(&self, peer: PeerIdentity) -> bool {
        let claimed = self.with(|o| {
            if o.connection != ConnectionState::Scanning || o.scan_match.is_some() {
                return false;
            }
            o.peer = Some(peer.clone());
            o.scan_match = Some(peer.clone());
            true
        });
        if claimed {
            self.emit(SessionEvent::PeerDiscovered { peer });
        }
        claimed
    }

    /// Back to a fresh session: Idle, every channel Init, nothing observed
    pub(crate) fn reset(&self) {
        let previous = self.with(|o| {
            let previous = o.connection;
            o.connection = ConnectionState::Idle;
            o.statuses.clear();
            o.last_values.clear();
            o.subscriptions.clear();
            o.scan_match = None;
            previous
        });
        if previous != ConnectionState::Idle {
            self.emit(SessionEvent::ConnectionStateChanged {
                state: ConnectionState::Idle,
            });
        }
    }
}
