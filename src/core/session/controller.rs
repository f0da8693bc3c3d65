//! Session controller for the companion peripheral
//! This module owns the connection state machine and exposes the command
//! operations. Every transport call goes through the operation pipeline.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{OnceCell, broadcast};
use uuid::Uuid;

use crate::config::bridge_config::BridgeConfig;
use crate::core::bluetooth::channel_map::{AccessMode, Channel, STANDING_NOTIFICATIONS};
use crate::core::bluetooth::commands::ControlCommand;
use crate::core::bluetooth::constants::UUID_COMPANION_SERVICE;
use crate::core::bluetooth::transport::Transport;
use crate::core::bluetooth::types::{
    ChannelList, CharacteristicStatus, ConnectOutcome, ConnectionState, PeerIdentity, SessionEvent,
};
use crate::core::error::{BridgeError, BridgeResult};
use crate::core::session::peer_store::PeerStore;
use crate::core::session::permission::{self, PermissionGate};
use crate::core::session::pipeline::{CallKind, DiscoveryPolicy, OperationKey, OperationPipeline};
use crate::core::session::router::EventRouter;
use crate::core::session::shared::SessionShared;

/// Drives one peripheral at a time.
///
/// Mutating operations (scan, connect, send) are not internally serialized:
/// callers await one before starting the next.
pub struct SessionController {
    transport: Arc<dyn Transport>,
    permissions: Arc<dyn PermissionGate>,
    peers: Arc<dyn PeerStore>,
    pipeline: OperationPipeline,
    shared: Arc<SessionShared>,
    router: EventRouter,
    discovery: DiscoveryPolicy,
    config: BridgeConfig,
    activated: OnceCell<()>,
}

impl SessionController {
    pub fn new(
        transport: Arc<dyn Transport>,
        permissions: Arc<dyn PermissionGate>,
        peers: Arc<dyn PeerStore>,
        config: BridgeConfig,
    ) -> Self {
        let pipeline = OperationPipeline::new();
        let shared = Arc::new(SessionShared::new());
        let router = EventRouter::new(
            transport.clone(),
            shared.clone(),
            pipeline.clone(),
            config.device_name.clone(),
            config.operation_timeout(),
        );
        let discovery = DiscoveryPolicy::new(
            config.scan_windows(),
            config.allow_duplicates,
            config.operation_timeout(),
        );

        Self {
            transport,
            permissions,
            peers,
            pipeline,
            shared,
            router,
            discovery,
            config,
            activated: OnceCell::new(),
        }
    }

    /// Initializes the transport once and starts routing its events.
    ///
    /// Repeated calls are no-ops. Must precede every other operation.
    pub async fn request_activation(&self) -> BridgeResult<()> {
        let transport = self.transport.clone();
        let pipeline = self.pipeline.clone();
        let limit = self.config.operation_timeout();

        self.activated
            .get_or_try_init(|| async move {
                info!("Initializing Bluetooth transport");
                pipeline
                    .bounded(
                        OperationKey::new(CallKind::Initialize),
                        limit,
                        BridgeError::Activation,
                        async move { transport.initialize().await },
                    )
                    .await
            })
            .await?;

        if !self.router.is_attached() {
            self.router.attach();
            let transport = self.transport.clone();
            let radio = self
                .pipeline
                .bounded(
                    OperationKey::new(CallKind::CheckRadio),
                    limit,
                    BridgeError::Activation,
                    async move { transport.check_radio_state().await },
                )
                .await;
            if radio.is_err() {
                warn!("Radio state unknown until the adapter reports a change");
            }
        }
        Ok(())
    }

    /// True from a successful activation until the next teardown
    pub fn is_activated(&self) -> bool {
        self.activated.initialized() && self.router.is_attached()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.connection_state()
    }

    pub fn characteristic_status(&self, channel: Channel) -> CharacteristicStatus {
        self.shared.characteristic_status(channel)
    }

    pub fn last_value(&self, channel: Channel) -> Option<Vec<u8>> {
        self.shared.last_value(channel)
    }

    pub fn radio_available(&self) -> bool {
        self.shared.radio_available()
    }

    /// Peer matched by the last scan of this session
    pub fn last_peer(&self) -> Option<PeerIdentity> {
        self.shared.peer()
    }

    /// Message of the last permission failure, for display
    pub fn permission_error(&self) -> Option<String> {
        self.shared.permission_error()
    }

    pub fn clear_permission_error(&self) {
        self.shared.set_permission_error(None);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.subscribe()
    }

    /// The peer commands go to: the newest entry of the peer store
    pub async fn active_peer(&self) -> BridgeResult<Option<PeerIdentity>> {
        Ok(self.peers.active().await?)
    }

    /// Scans for the peripheral and records it when found.
    pub async fn start_scan(&self) -> BridgeResult<PeerIdentity> {
        self.ensure_activated()?;
        self.acquire_permissions().await?;

        info!("Scanning for {}", self.config.device_name);
        let mut pending = self.transport.events();
        self.shared.begin_scan();
        self.shared.set_connection_state(ConnectionState::Scanning);

        let found = self
            .discovery
            .run(
                move |window| self.scan_pass(window),
                || self.shared.scan_match().is_some(),
            )
            .await;

        if let Ok(false) = found {
            self.router.claim_pending(&mut pending);
        }

        match (found, self.shared.scan_match()) {
            (Ok(_), Some(peer)) => {
                info!("Found {} at {}", peer.name, peer.address);
                if let Err(e) = self.peers.remember(peer.clone()).await {
                    error!("Failed to save discovered peer: {}", e);
                }
                self.shared.set_connection_state(ConnectionState::Idle);
                Ok(peer)
            }
            (Ok(_), None) => {
                warn!("No device named {} answered", self.config.device_name);
                self.shared.set_connection_state(ConnectionState::Failed);
                Err(BridgeError::PeerNotDiscovered {
                    name: self.config.device_name.clone(),
                })
            }
            (Err(e), _) => {
                self.shared.set_connection_state(ConnectionState::Failed);
                Err(e)
            }
        }
    }

    async fn scan_pass(&self, window: Duration) -> BridgeResult<()> {
        let transport = self.transport.clone();
        let allow_duplicates = self.discovery.allow_duplicates;
        self.pipeline
            .bounded(
                OperationKey::new(CallKind::Scan),
                window + self.discovery.grace,
                BridgeError::Scan,
                async move { transport.scan(Vec::new(), window, allow_duplicates).await },
            )
            .await
    }

    /// Connects to the active peer and starts the standing notifications.
    ///
    /// With no known peer a scan runs instead and nothing is connected.
    /// A subscription failure does not undo the connection; it is reported
    /// in the outcome and in the channel's status.
    pub async fn connect_to_peer(&self) -> BridgeResult<ConnectOutcome> {
        self.ensure_activated()?;
        self.acquire_permissions().await?;

        let Some(peer) = self.peers.active().await? else {
            info!("No saved device, scanning instead of connecting");
            let peer = self.start_scan().await?;
            return Ok(ConnectOutcome::Rescanned(peer));
        };

        self.mark(&STANDING_NOTIFICATIONS, CharacteristicStatus::Loading);
        if let Err(e) = self.ensure_link(&peer).await {
            self.mark(&STANDING_NOTIFICATIONS, CharacteristicStatus::Error);
            return Err(e);
        }

        if let Err(e) = self.retrieve_services(&peer).await {
            self.mark(&STANDING_NOTIFICATIONS, CharacteristicStatus::Error);
            return Err(e);
        }

        let mut failed_subscriptions = Vec::new();
        for channel in STANDING_NOTIFICATIONS {
            if self.subscribe(&peer, channel).await.is_err() {
                failed_subscriptions.push(channel);
            }
        }

        if !failed_subscriptions.is_empty() {
            warn!("Connected with notifications missing on {:?}", failed_subscriptions);
        }
        Ok(ConnectOutcome::Connected {
            failed_subscriptions,
        })
    }

    /// Writes `payload` to the command input channel.
    ///
    /// Stages run in order and the first failure ends the call with that
    /// stage's error: permissions, known peer, link, services, wifi status
    /// notification, custom command notification, write.
    pub async fn send_command(&self, payload: Vec<u8>) -> BridgeResult<()> {
        self.ensure_activated()?;
        self.acquire_permissions().await?;

        let Some(peer) = self.peers.active().await? else {
            self.shared.set_status(Channel::CommandInput, CharacteristicStatus::Init);
            if let Err(e) = self.start_scan().await {
                debug!("Rescan after missing device failed: {}", e);
            }
            return Err(BridgeError::PeerNotFound);
        };

        self.shared.set_status(Channel::CommandInput, CharacteristicStatus::Loading);
        let sent = self.write_command_input(&peer, payload).await;
        let status = match sent {
            Ok(()) => CharacteristicStatus::Success,
            Err(_) => CharacteristicStatus::Error,
        };
        self.shared.set_status(Channel::CommandInput, status);
        sent
    }

    async fn write_command_input(&self, peer: &PeerIdentity, payload: Vec<u8>) -> BridgeResult<()> {
        self.ensure_link(peer).await?;
        self.retrieve_services(peer).await?;
        for channel in STANDING_NOTIFICATIONS {
            self.subscribe(peer, channel).await?;
        }
        self.write(peer, Channel::CommandInput, payload).await?;
        info!("Command written to {}", peer.address);
        Ok(())
    }

    /// Sends a keyed control command, surfacing the stage that failed.
    pub async fn send_keyed_command(
        &self,
        peer_address: &str,
        command: ControlCommand,
    ) -> BridgeResult<()> {
        self.ensure_activated()?;
        if peer_address.is_empty() {
            return Err(BridgeError::NoSavedPeer);
        }
        let frame = command.to_frame(&self.config.device_key)?;
        let peer = PeerIdentity::new(peer_address, self.config.device_name.clone());

        if !self.is_connected(&peer).await {
            self.connect(&peer).await?;
        }
        self.retrieve_services(&peer).await?;
        self.subscribe(&peer, Channel::CustomCommandResponse).await?;
        self.write(&peer, Channel::CustomCommand, frame).await?;
        info!("{:?} command sent to {}", command, peer.address);
        Ok(())
    }

    /// Best-effort reboot. Failures after the address check are logged and
    /// swallowed; the call reports success regardless.
    pub async fn send_reboot_like_command(&self, peer_address: &str) -> BridgeResult<bool> {
        self.send_best_effort(peer_address, ControlCommand::Reboot).await
    }

    /// Best-effort shutdown, same contract as [`Self::send_reboot_like_command`].
    pub async fn send_shutdown_like_command(&self, peer_address: &str) -> BridgeResult<bool> {
        self.send_best_effort(peer_address, ControlCommand::Shutdown).await
    }

    async fn send_best_effort(&self, peer_address: &str, command: ControlCommand) -> BridgeResult<bool> {
        self.ensure_activated()?;
        if peer_address.is_empty() {
            return Err(BridgeError::NoSavedPeer);
        }
        if let Err(e) = self.send_keyed_command(peer_address, command).await {
            warn!("{:?} command to {} failed, ignored: {}", command, peer_address, e);
        }
        Ok(true)
    }

    /// Reads a telemetry channel from the active peer.
    pub async fn read_channel(&self, channel: Channel) -> BridgeResult<Vec<u8>> {
        self.ensure_activated()?;
        if channel.access() != AccessMode::Read {
            return Err(BridgeError::AccessMode {
                channel,
                requested: AccessMode::Read,
            });
        }
        self.acquire_permissions().await?;

        let peer = self.peers.active().await?.ok_or(BridgeError::PeerNotFound)?;

        self.shared.set_status(channel, CharacteristicStatus::Loading);
        let read = async {
            self.ensure_link(&peer).await?;
            self.retrieve_services(&peer).await?;
            self.read(&peer, channel).await
        }
        .await;

        match read {
            Ok(value) => {
                self.shared.set_status(channel, CharacteristicStatus::Success);
                self.shared.record_value(channel, value.clone());
                Ok(value)
            }
            Err(e) => {
                self.shared.set_status(channel, CharacteristicStatus::Error);
                Err(e)
            }
        }
    }

    /// Releases every subscription and disconnects the recorded peer.
    ///
    /// Never fails: each release is attempted and its failure only logged.
    /// Afterwards the controller must be activated again.
    pub async fn teardown(&self) {
        info!("Tearing down Bluetooth session");
        let subscriptions = self.shared.take_subscriptions();

        let peer = match self.peers.active().await {
            Ok(peer) => peer.or_else(|| self.shared.peer()),
            Err(e) => {
                warn!("Could not read saved devices during teardown: {}", e);
                self.shared.peer()
            }
        };

        if let Some(peer) = peer {
            for channel in subscriptions {
                let transport = self.transport.clone();
                let address = peer.address.clone();
                let released = self
                    .pipeline
                    .bounded(
                        OperationKey::on(CallKind::Unsubscribe, channel),
                        self.config.operation_timeout(),
                        BridgeError::Subscription { channel },
                        async move {
                            transport
                                .unsubscribe(&address, channel.service_id(), channel.channel_id())
                                .await
                        },
                    )
                    .await;
                if released.is_err() {
                    warn!("Could not stop notifications on {}", channel);
                }
            }

            let transport = self.transport.clone();
            let address = peer.address.clone();
            let disconnected = self
                .pipeline
                .bounded(
                    OperationKey::new(CallKind::Disconnect),
                    self.config.operation_timeout(),
                    BridgeError::DeviceNotFound,
                    async move { transport.disconnect(&address).await },
                )
                .await;
            if disconnected.is_err() {
                warn!("Could not disconnect from {}", peer.address);
            }
        }

        self.router.detach();
        self.shared.reset();
    }

    fn ensure_activated(&self) -> BridgeResult<()> {
        if self.is_activated() {
            Ok(())
        } else {
            Err(BridgeError::NotInitialized)
        }
    }

    async fn acquire_permissions(&self) -> BridgeResult<()> {
        match permission::acquire(self.permissions.as_ref(), self.config.permission_policy).await {
            Ok(()) => {
                self.shared.set_permission_error(None);
                Ok(())
            }
            Err(e) => {
                self.shared.set_permission_error(Some(e.to_string()));
                Err(e.into())
            }
        }
    }

    fn mark(&self, channels: &[Channel], status: CharacteristicStatus) {
        for channel in channels {
            self.shared.set_status(*channel, status);
        }
    }

    /// Connects unless the peer already is, driving the connection state.
    async fn ensure_link(&self, peer: &PeerIdentity) -> BridgeResult<()> {
        if self.is_connected(peer).await {
            debug!("{} already connected", peer.address);
            self.shared.set_connection_state(ConnectionState::Connected);
            return Ok(());
        }

        self.shared.set_connection_state(ConnectionState::Connecting);
        match self.connect(peer).await {
            Ok(()) => {
                self.shared.set_connection_state(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                self.shared.set_connection_state(ConnectionState::Failed);
                Err(e)
            }
        }
    }

    /// A failed check counts as not connected
    async fn is_connected(&self, peer: &PeerIdentity) -> bool {
        let transport = self.transport.clone();
        let address = peer.address.clone();
        self.pipeline
            .bounded(
                OperationKey::new(CallKind::CheckConnected),
                self.config.operation_timeout(),
                BridgeError::DeviceNotFound,
                async move { transport.is_connected(&address, &[UUID_COMPANION_SERVICE]).await },
            )
            .await
            .unwrap_or(false)
    }

    async fn connect(&self, peer: &PeerIdentity) -> BridgeResult<()> {
        info!("Connecting to {}", peer.address);
        let transport = self.transport.clone();
        let address = peer.address.clone();
        self.pipeline
            .bounded(
                OperationKey::new(CallKind::Connect),
                self.config.connect_timeout(),
                BridgeError::DeviceNotFound,
                async move { transport.connect(&address).await },
            )
            .await
    }

    async fn retrieve_services(&self, peer: &PeerIdentity) -> BridgeResult<ChannelList> {
        let transport = self.transport.clone();
        let address = peer.address.clone();
        let channels = self
            .pipeline
            .bounded(
                OperationKey::new(CallKind::RetrieveChannels),
                self.config.operation_timeout(),
                BridgeError::ServiceRetrieval,
                async move { transport.retrieve_channels(&address).await },
            )
            .await?;

        if !channels.has_service(UUID_COMPANION_SERVICE) {
            let found: Vec<Uuid> = channels.services.iter().map(|s| s.service_id).collect();
            warn!("Companion service missing, peer offers {:?}", found);
            return Err(BridgeError::ServiceRetrieval);
        }
        Ok(channels)
    }

    async fn subscribe(&self, peer: &PeerIdentity, channel: Channel) -> BridgeResult<()> {
        self.shared.set_status(channel, CharacteristicStatus::Loading);
        let transport = self.transport.clone();
        let address = peer.address.clone();
        let subscribed = self
            .pipeline
            .bounded(
                OperationKey::on(CallKind::Subscribe, channel),
                self.config.operation_timeout(),
                BridgeError::Subscription { channel },
                async move {
                    transport
                        .subscribe(&address, channel.service_id(), channel.channel_id())
                        .await
                },
            )
            .await;

        match subscribed {
            Ok(()) => {
                self.shared.add_subscription(channel);
                self.shared.set_status(channel, CharacteristicStatus::Success);
                Ok(())
            }
            Err(e) => {
                self.shared.set_status(channel, CharacteristicStatus::Error);
                Err(e)
            }
        }
    }

    async fn write(&self, peer: &PeerIdentity, channel: Channel, data: Vec<u8>) -> BridgeResult<()> {
        if channel.access() != AccessMode::Write {
            return Err(BridgeError::AccessMode {
                channel,
                requested: AccessMode::Write,
            });
        }
        let transport = self.transport.clone();
        let address = peer.address.clone();
        self.pipeline
            .bounded(
                OperationKey::on(CallKind::Write, channel),
                self.config.operation_timeout(),
                BridgeError::Write,
                async move {
                    transport
                        .write(&address, channel.service_id(), channel.channel_id(), data)
                        .await
                },
            )
            .await
    }

    async fn read(&self, peer: &PeerIdentity, channel: Channel) -> BridgeResult<Vec<u8>> {
        let transport = self.transport.clone();
        let address = peer.address.clone();
        self.pipeline
            .bounded(
                OperationKey::on(CallKind::Read, channel),
                self.config.operation_timeout(),
                BridgeError::Read,
                async move {
                    transport
                        .read(&address, channel.service_id(), channel.channel_id())
                        .await
                },
            )
            .await
    }
}
