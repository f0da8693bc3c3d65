//! Bridge commands
//! This module defines the commands the binary invokes. Each returns the
//! user-facing notice text on failure.

use log::{error, info};
use serde::Serialize;

use crate::core::bluetooth::{Channel, ConnectOutcome, ConnectionState, PeerIdentity, value_as_text};
use crate::state::AppState;

/// Snapshot of the session, for display
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub connection_state: ConnectionState,
    pub radio_available: bool,
    pub peer: Option<PeerIdentity>,
    pub permission_error: Option<String>,
}

/// Activates Bluetooth; every other command expects this to have run
pub async fn activate(app_state: &AppState) -> Result<(), String> {
    app_state
        .controller
        .request_activation()
        .await
        .map_err(|e| e.to_string())
}

/// Scans for the peripheral and returns it once it has been saved
pub async fn start_scan(app_state: &AppState) -> Result<PeerIdentity, String> {
    app_state
        .controller
        .start_scan()
        .await
        .map_err(|e| e.to_string())
}

/// Connects to the saved peripheral and starts its standing notifications
pub async fn connect_to_peer(app_state: &AppState) -> Result<ConnectOutcome, String> {
    let outcome = app_state
        .controller
        .connect_to_peer()
        .await
        .map_err(|e| e.to_string())?;

    if let ConnectOutcome::Connected {
        failed_subscriptions,
    } = &outcome
    {
        for channel in failed_subscriptions {
            error!("Unable to start {} notification", channel.notification_label());
        }
    }
    Ok(outcome)
}

/// Writes a text command to the peripheral's command input
pub async fn send_command(app_state: &AppState, command: String) -> Result<(), String> {
    info!("Sending command {:?}", command);
    app_state
        .controller
        .send_command(command.into_bytes())
        .await
        .map_err(|e| e.to_string())
}

/// Reads one telemetry channel as text
pub async fn read_channel(app_state: &AppState, channel: Channel) -> Result<String, String> {
    let value = app_state
        .controller
        .read_channel(channel)
        .await
        .map_err(|e| e.to_string())?;
    Ok(value_as_text(&value))
}

/// Reboots the saved peripheral, or the one at `address`
pub async fn reboot(app_state: &AppState, address: Option<String>) -> Result<bool, String> {
    let address = target_address(app_state, address).await?;
    app_state
        .controller
        .send_reboot_like_command(&address)
        .await
        .map_err(|e| e.to_string())
}

/// Shuts down the saved peripheral, or the one at `address`
pub async fn shutdown(app_state: &AppState, address: Option<String>) -> Result<bool, String> {
    let address = target_address(app_state, address).await?;
    app_state
        .controller
        .send_shutdown_like_command(&address)
        .await
        .map_err(|e| e.to_string())
}

pub fn session_summary(app_state: &AppState) -> SessionSummary {
    let controller = &app_state.controller;
    SessionSummary {
        connection_state: controller.connection_state(),
        radio_available: controller.radio_available(),
        peer: controller.last_peer(),
        permission_error: controller.permission_error(),
    }
}

/// Releases the session; safe to call after any failure
pub async fn teardown(app_state: &AppState) {
    app_state.controller.teardown().await;
}

/// An empty address is passed through so the controller reports it
async fn target_address(app_state: &AppState, address: Option<String>) -> Result<String, String> {
    if let Some(address) = address {
        return Ok(address);
    }
    let peer = app_state
        .controller
        .active_peer()
        .await
        .map_err(|e| e.to_string())?;
    Ok(peer.map(|peer| peer.address).unwrap_or_default())
}
