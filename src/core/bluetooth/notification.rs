//! Notification handling for the companion peripheral
//! Each subscribed characteristic gets a task that forwards its values as
//! transport events until it is unsubscribed or the stream ends.

use std::collections::HashMap;
use std::sync::Mutex;

use bluest::{Characteristic, Uuid};
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use crate::core::bluetooth::transport::TransportError;
use crate::core::bluetooth::types::TransportEvent;

type NotificationKey = (String, Uuid);

pub struct NotificationHandler {
    events: broadcast::Sender<TransportEvent>,
    tasks: Mutex<HashMap<NotificationKey, JoinHandle<()>>>,
}

impl NotificationHandler {
    pub fn new(events: broadcast::Sender<TransportEvent>) -> Self {
        Self {
            events,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Starts forwarding notifications; returns once the stream is open.
    ///
    /// A second subscription to the same characteristic replaces the first.
    pub async fn start(
        &self,
        peer: &str,
        service_id: Uuid,
        characteristic: Characteristic,
    ) -> Result<(), TransportError> {
        let channel_id = characteristic.uuid();
        let (started_tx, started_rx) = oneshot::channel();
        let events = self.events.clone();
        let peer_for_task = peer.to_string();

        let handle = tokio::spawn(async move {
            Self::process_notifications(
                characteristic,
                peer_for_task,
                service_id,
                events,
                started_tx,
            )
            .await;
        });

        let previous = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((peer.to_string(), channel_id), handle);
        if let Some(previous) = previous {
            previous.abort();
        }

        match started_rx.await {
            Ok(result) => result,
            Err(_) => Err(TransportError::NotificationStreamClosed),
        }
    }

    async fn process_notifications(
        characteristic: Characteristic,
        peer: String,
        service_id: Uuid,
        events: broadcast::Sender<TransportEvent>,
        started: oneshot::Sender<Result<(), TransportError>>,
    ) {
        let channel_id = characteristic.uuid();
        info!("Subscribing to notifications on {}...", channel_id);

        let notification_stream = match characteristic.notify().await {
            Ok(stream) => {
                let _ = started.send(Ok(()));
                stream
            }
            Err(e) => {
                error!("Failed to subscribe to notifications: {}", e);
                let _ = started.send(Err(e.into()));
                return;
            }
        };

        futures_util::pin_mut!(notification_stream);
        while let Some(result) = notification_stream.next().await {
            match result {
                Ok(value) => {
                    debug!("Received {:?} on {}", value, channel_id);
                    let _ = events.send(TransportEvent::ValueChanged {
                        peer: peer.clone(),
                        service_id,
                        channel_id,
                        value,
                    });
                }
                Err(e) => {
                    error!("Error in notification stream: {}", e);
                    break;
                }
            }
        }

        info!("Notification stream on {} ended", channel_id);
    }

    /// Stops one subscription; false if there was none
    pub fn stop(&self, peer: &str, channel_id: Uuid) -> bool {
        let handle = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(peer.to_string(), channel_id));
        match handle {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Stops every subscription held for `peer`
    pub fn stop_peer(&self, peer: &str) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|(address, _), handle| {
            if address == peer {
                handle.abort();
                false
            } else {
                true
            }
        });
    }
}

impl Drop for NotificationHandler {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }
}
