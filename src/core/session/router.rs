//! Event routing
//! This module consumes the transport event stream and turns it into
//! session observations and broadcasts for external listeners.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;

use crate::core::bluetooth::channel_map::Channel;
use crate::core::bluetooth::transport::Transport;
use crate::core::bluetooth::types::{
    DiscoveredPeer, PeerIdentity, SessionEvent, TransportEvent, value_as_text,
};
use crate::core::error::BridgeError;
use crate::core::session::pipeline::{CallKind, OperationKey, OperationPipeline};
use crate::core::session::shared::SessionShared;

struct RouterContext {
    transport: Arc<dyn Transport>,
    shared: Arc<SessionShared>,
    pipeline: OperationPipeline,
    expected_name: String,
    stop_timeout: Duration,
}

/// Listens to the transport; at most one listener task is active at a time
pub struct EventRouter {
    context: Arc<RouterContext>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl EventRouter {
    pub fn new(
        transport: Arc<dyn Transport>,
        shared: Arc<SessionShared>,
        pipeline: OperationPipeline,
        expected_name: impl Into<String>,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            context: Arc::new(RouterContext {
                transport,
                shared,
                pipeline,
                expected_name: expected_name.into(),
                stop_timeout,
            }),
            listener: Mutex::new(None),
        }
    }

    /// Starts listening, replacing any previous listener
    pub fn attach(&self) {
        let mut events = self.context.transport.events();
        let context = self.context.clone();

        let handle = tokio::spawn(async move {
            info!("Event router listening");
            loop {
                match events.recv().await {
                    Ok(event) => Self::dispatch(&context, event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Event router fell behind, {} event(s) dropped", skipped);
                    }
                    Err(RecvError::Closed) => {
                        info!("Transport event stream closed");
                        break;
                    }
                }
            }
        });

        let previous = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stops listening; events sent afterwards are dropped
    pub fn detach(&self) {
        if let Some(handle) = self.listener.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
            info!("Event router detached");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    async fn dispatch(context: &RouterContext, event: TransportEvent) {
        match event {
            TransportEvent::RadioStateChanged { available } => {
                info!("Bluetooth radio is {}", if available { "on" } else { "off" });
                context.shared.set_radio_available(available);
            }
            TransportEvent::ValueChanged {
                peer,
                service_id,
                channel_id,
                value,
            } => match Channel::from_ids(service_id, channel_id) {
                Some(channel) => {
                    info!(
                        "Received {} for characteristic {} from {}",
                        value_as_text(&value),
                        channel,
                        peer
                    );
                    context.shared.record_value(channel, value);
                }
                None => debug!("Ignoring value for unknown characteristic {}", channel_id),
            },
            TransportEvent::PeerDiscovered(peer) => Self::on_discovered(context, peer).await,
            TransportEvent::ScanStopped => {
                debug!("Scan stopped");
                context.shared.emit(SessionEvent::ScanStopped);
            }
        }
    }

    /// Accepts discoveries still queued on `events`; true if one matched.
    ///
    /// A peer raised as the last scan pass ends may not have reached the
    /// listener before the scan is judged.
    pub fn claim_pending(&self, events: &mut broadcast::Receiver<TransportEvent>) -> bool {
        loop {
            match events.try_recv() {
                Ok(TransportEvent::PeerDiscovered(peer)) => {
                    if Self::accept(&self.context, peer) {
                        return true;
                    }
                }
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return false,
            }
        }
    }

    fn accept(context: &RouterContext, peer: DiscoveredPeer) -> bool {
        let DiscoveredPeer {
            address,
            name,
            rssi,
        } = peer;
        let Some(name) = name else {
            return false;
        };
        if name != context.expected_name {
            return false;
        }
        if !context
            .shared
            .claim_match(PeerIdentity::new(address.clone(), name))
        {
            debug!("Saw {} outside of a scan or after its match, ignoring", address);
            return false;
        }
        info!("Got ble peripheral {} ({:?} dBm)", address, rssi);
        true
    }

    async fn on_discovered(context: &RouterContext, peer: DiscoveredPeer) {
        if !Self::accept(context, peer) {
            return;
        }

        let transport = context.transport.clone();
        let stopped = context
            .pipeline
            .bounded(
                OperationKey::new(CallKind::StopScan),
                context.stop_timeout,
                BridgeError::Scan,
                async move { transport.stop_scan().await },
            )
            .await;
        if stopped.is_err() {
            warn!("Scan could not be stopped after a match, it will end with its window");
        }
    }
}

impl Drop for EventRouter {
    fn drop(&mut self) {
        self.detach();
    }
}
