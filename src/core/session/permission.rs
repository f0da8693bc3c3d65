//! Host permission gate
//!
//! The host operating system decides whether the app may use Bluetooth.
//! The session only sees a status per capability and reduces the set to a
//! single outcome before any transport call is made.

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A runtime permission the host may ask the user for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    BluetoothScan,
    BluetoothConnect,
    BluetoothPeripheral,
    FineLocation,
    LocationWhenInUse,
}

/// What the host reports for a capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    Blocked,
    Unavailable,
    Limited,
}

/// How statuses are reduced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionPolicy {
    /// Unavailable capabilities are tolerated (Android style)
    #[default]
    Lenient,
    /// Every capability must be granted (iOS style)
    Strict,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PermissionError {
    #[error("Bluetooth or location service not available on this device.")]
    Unavailable,

    #[error("Permissions blocked. Please reset location permissions in the app settings.")]
    Blocked,

    #[error("Failed to get permissions")]
    Denied,

    #[error("Unknown permissions error")]
    Unknown,
}

#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Capabilities that must be settled before Bluetooth is used
    fn capabilities(&self) -> Vec<Capability>;

    async fn check(&self, capability: Capability) -> PermissionStatus;

    async fn request(&self, capability: Capability) -> PermissionStatus;
}

/// Gate for desktop hosts, where the Bluetooth stack needs no runtime permission
#[derive(Debug, Clone, Default)]
pub struct HostPermissionGate;

#[async_trait]
impl PermissionGate for HostPermissionGate {
    fn capabilities(&self) -> Vec<Capability> {
        Vec::new()
    }

    async fn check(&self, _capability: Capability) -> PermissionStatus {
        PermissionStatus::Granted
    }

    async fn request(&self, _capability: Capability) -> PermissionStatus {
        PermissionStatus::Granted
    }
}

/// Checks every capability, requests the ones not granted, and reduces the result.
pub async fn acquire(
    gate: &dyn PermissionGate,
    policy: PermissionPolicy,
) -> Result<(), PermissionError> {
    let mut statuses = Vec::new();
    for capability in gate.capabilities() {
        let status = match gate.check(capability).await {
            PermissionStatus::Granted => PermissionStatus::Granted,
            other => {
                debug!("{:?} is {:?}, requesting", capability, other);
                gate.request(capability).await
            }
        };
        statuses.push(status);
    }

    let outcome = reduce(&statuses, policy);
    if let Err(e) = &outcome {
        warn!("Permission check failed: {:?} -> {}", statuses, e);
    }
    outcome
}

/// Reduces per-capability statuses to one outcome
pub fn reduce(statuses: &[PermissionStatus], policy: PermissionPolicy) -> Result<(), PermissionError> {
    use PermissionStatus::*;

    let any_blocked = statuses.iter().any(|s| *s == Blocked);
    match policy {
        PermissionPolicy::Lenient => {
            if !statuses.is_empty() && statuses.iter().all(|s| *s == Unavailable) {
                Err(PermissionError::Unavailable)
            } else if statuses.iter().all(|s| matches!(s, Granted | Unavailable)) {
                Ok(())
            } else if any_blocked {
                Err(PermissionError::Blocked)
            } else {
                Err(PermissionError::Unknown)
            }
        }
        PermissionPolicy::Strict => {
            if statuses.iter().all(|s| *s == Granted) {
                Ok(())
            } else if any_blocked {
                Err(PermissionError::Blocked)
            } else {
                Err(PermissionError::Denied)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use PermissionStatus::*;

    #[test]
    fn lenient_reduction() {
        let p = PermissionPolicy::Lenient;
        assert_eq!(reduce(&[], p), Ok(()));
        assert_eq!(reduce(&[Granted, Granted, Granted], p), Ok(()));
        assert_eq!(reduce(&[Granted, Unavailable], p), Ok(()));
        assert_eq!(reduce(&[Unavailable, Unavailable], p), Err(PermissionError::Unavailable));
        assert_eq!(reduce(&[Granted, Blocked, Unavailable], p), Err(PermissionError::Blocked));
        assert_eq!(reduce(&[Granted, Denied], p), Err(PermissionError::Unknown));
        assert_eq!(reduce(&[Denied, Blocked], p), Err(PermissionError::Blocked));
    }

    #[test]
    fn strict_reduction() {
        let p = PermissionPolicy::Strict;
        assert_eq!(reduce(&[Granted, Granted], p), Ok(()));
        assert_eq!(reduce(&[Granted, Unavailable], p), Err(PermissionError::Denied));
        assert_eq!(reduce(&[Limited, Blocked], p), Err(PermissionError::Blocked));
    }

    struct ScriptedGate {
        checked: HashMap<Capability, PermissionStatus>,
        requested: HashMap<Capability, PermissionStatus>,
        requests: Mutex<Vec<Capability>>,
    }

    #[async_trait]
    impl PermissionGate for ScriptedGate {
        fn capabilities(&self) -> Vec<Capability> {
            vec![
                Capability::BluetoothConnect,
                Capability::BluetoothScan,
                Capability::FineLocation,
            ]
        }

        async fn check(&self, capability: Capability) -> PermissionStatus {
            self.checked[&capability]
        }

        async fn request(&self, capability: Capability) -> PermissionStatus {
            self.requests.lock().unwrap().push(capability);
            self.requested[&capability]
        }
    }

    #[tokio::test]
    async fn only_ungranted_capabilities_are_requested() {
        let gate = ScriptedGate {
            checked: HashMap::from([
                (Capability::BluetoothConnect, Granted),
                (Capability::BluetoothScan, Denied),
                (Capability::FineLocation, Unavailable),
            ]),
            requested: HashMap::from([
                (Capability::BluetoothScan, Granted),
                (Capability::FineLocation, Unavailable),
            ]),
            requests: Mutex::new(Vec::new()),
        };

        assert_eq!(acquire(&gate, PermissionPolicy::Lenient).await, Ok(()));
        assert_eq!(
            *gate.requests.lock().unwrap(),
            vec![Capability::BluetoothScan, Capability::FineLocation]
        );
    }

    #[tokio::test]
    async fn host_gate_always_passes() {
        assert_eq!(acquire(&HostPermissionGate, PermissionPolicy::Strict).await, Ok(()));
    }
}
