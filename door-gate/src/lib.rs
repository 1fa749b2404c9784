//! Smart Door Gate
//!
//! Client-side access control for doors gated by an on-chain access contract.
//!
//! ## Components
//!
//! - [`AccessRegistry`]: typed reads of the access contract
//! - [`AuthorizationEngine`]: fail-closed access decisions, grant and revoke
//! - [`EventReconciler`]: polls contract events past a persisted watermark
//!   and dispatches each one exactly once to [`EventHandler`]s
//! - [`GatedActionController`]: per-door open/closed state machine with at
//!   most one outstanding check per door
//! - [`LedgerDoorSigner`]: records approved door use on-chain

pub mod authorization;
pub mod controller;
pub mod effects;
pub mod receipt;
pub mod reconcile;
pub mod registry;
pub mod signer;
pub mod watermark;

pub use authorization::{AuthorizationEngine, Clock, GrantRequest};
pub use controller::{
    GatedActionController, GatewayPhase, PlayerPositions, PresenceProbe, RequestOutcome,
};
pub use effects::{
    AccessLogger, EventHandler, KnownPrincipals, PresenceSpawn, PresenceSpawner,
    RecordingPresence, DEFAULT_LOG_CAPACITY,
};
pub use receipt::ReceiptPoller;
pub use reconcile::{
    CycleReport, EventReconciler, ReconcilerConfig, ReconcilerHandle, ReconcilerState,
    StartPosition,
};
pub use registry::AccessRegistry;
pub use signer::{DoorSigner, LedgerDoorSigner};
pub use watermark::{MemoryWatermarkStore, SledWatermarkStore, WatermarkStore};
