//! Smart Door Core
//!
//! Core types for the blockchain-gated door protocol. A remote access
//! contract acts as the authorization oracle; this crate models what the
//! client side needs to reason about it:
//! - Principals (account addresses) and signing identities
//! - Access records (role, capability flags, expiration) and their validity
//! - Door gateways and their open/closed state
//! - Ledger events observed by the reconciliation loop
//! - Transaction receipts
//!
//! Configuration and logging setup shared by the other crates also live here.

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod types;

pub use config::DoorConfig;
pub use constants::*;
pub use error::{DoorError, DoorResult};
pub use types::*;

/// Current unix time in seconds
pub fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
