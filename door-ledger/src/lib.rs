//! Smart Door Ledger
//!
//! The ledger-facing half of the door protocol:
//! - [`LedgerClient`]: block height, read-only calls, signed transactions,
//!   receipts and event log queries
//! - [`abi`]: typed access contract methods, return values and event logs
//! - [`MockLedgerClient`]: simulated chain running the access contract rules

pub mod abi;
pub mod client;
pub mod error;
pub mod mock;

pub use abi::{AbiValue, ContractCall, LogEntry, Method};
pub use client::LedgerClient;
pub use error::{LedgerError, LedgerResult};
pub use mock::{Fault, MockLedgerClient, ReceiptDelay};
