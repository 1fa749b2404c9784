//! Ledger Client
//!
//! Capability the door protocol consumes from a blockchain node. Real
//! deployments wrap a JSON-RPC client and signing library behind this trait;
//! [`crate::MockLedgerClient`] simulates the access contract in memory.

use async_trait::async_trait;

use door_core::types::{DoorEventKind, Principal, Receipt, Signer, TxHash};

use crate::abi::{AbiValue, ContractCall, LogEntry};
use crate::error::LedgerResult;

/// Ledger client trait
///
/// Implementations:
/// - JSON-RPC node client (external)
/// - [`crate::MockLedgerClient`] (testing, simulation)
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current block height
    async fn block_number(&self) -> LedgerResult<u64>;

    /// Call a read-only contract method
    async fn call(&self, contract: &Principal, call: &ContractCall) -> LedgerResult<AbiValue>;

    /// Sign and submit a state-changing transaction
    ///
    /// Returns the transaction hash as soon as the node accepted it; the
    /// outcome is only known once a receipt is observed.
    async fn send_transaction(
        &self,
        contract: &Principal,
        call: &ContractCall,
        signer: &Signer,
    ) -> LedgerResult<TxHash>;

    /// Receipt for a mined transaction, `None` while pending
    async fn get_receipt(&self, tx_hash: &TxHash) -> LedgerResult<Option<Receipt>>;

    /// Logs of one event kind emitted by `contract` in `[from_block, to_block]`
    async fn get_event_logs(
        &self,
        contract: &Principal,
        kind: DoorEventKind,
        from_block: u64,
        to_block: u64,
    ) -> LedgerResult<Vec<LogEntry>>;
}
