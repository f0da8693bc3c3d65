//! The session around one peripheral: permission checks, bounded transport
//! calls, event routing, and the operations callers invoke.

pub mod controller;
pub mod peer_store;
pub mod permission;
pub mod pipeline;
pub mod router;
pub mod shared;

pub use controller::SessionController;
pub use peer_store::{JsonPeerStore, MemoryPeerStore, PeerStore, StoreError};
pub use permission::{
    Capability, HostPermissionGate, PermissionError, PermissionGate, PermissionPolicy,
    PermissionStatus,
};
pub use pipeline::{CallKind, DiscoveryPolicy, OperationKey, OperationPipeline};
