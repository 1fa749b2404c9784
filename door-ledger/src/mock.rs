//! Simulated Ledger
//!
//! In-memory stand-in for a node hosting the access contract. Every
//! transaction is mined into its own block immediately, emitting the same
//! events the deployed contract emits. Receipts, faults, latency and log
//! ordering can be steered from tests.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

use door_core::types::{
    AccessRecord, AccessRole, Capability, DoorEventBody, DoorEventKind, Principal, Receipt,
    Signer, TxHash,
};
use door_core::{unix_now, RECEIPT_STATUS_SUCCESS};

use crate::abi::{encode_access_record, AbiValue, ContractCall, LogEntry, Method};
use crate::client::LedgerClient;
use crate::error::{LedgerError, LedgerResult};

/// Gas reported for a transaction that emitted no events
const BASE_GAS: u64 = 21_000;

/// Additional gas reported per emitted event
const EVENT_GAS: u64 = 8_000;

/// Status reported for a reverted transaction
const RECEIPT_STATUS_REVERTED: u64 = 0;

/// Operation class that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    BlockNumber,
    Calls,
    Sends,
    Receipts,
    EventLogs,
}

/// When receipts become visible after mining
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiptDelay {
    /// On the first poll
    #[default]
    Immediate,
    /// After this many polls returned nothing
    Polls(u32),
    /// Not until [`MockLedgerClient::release_receipts`] is called
    Withheld,
}

struct PendingReceipt {
    receipt: Receipt,
    hidden_polls: Option<u32>,
}

struct LedgerState {
    head: u64,
    owner: Principal,
    records: HashMap<Principal, AccessRecord>,
    /// Enumeration order of `getAccessList`
    members: Vec<Principal>,
    logs: Vec<LogEntry>,
    receipts: HashMap<TxHash, PendingReceipt>,
    sent: Vec<(Principal, ContractCall)>,
    nonce: u64,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory access contract and chain
pub struct MockLedgerClient {
    contract: Principal,
    state: Mutex<LedgerState>,
    faults: Mutex<HashSet<Fault>>,
    receipt_delay: Mutex<ReceiptDelay>,
    latency: Mutex<Option<Duration>>,
    call_counts: Mutex<HashMap<Method, u64>>,
    revert_next: AtomicBool,
    reverse_logs: AtomicBool,
    /// Fixed contract time in unix seconds; 0 follows the system clock
    clock: AtomicU64,
    log_queries: AtomicU64,
    receipt_polls: AtomicU64,
}

impl MockLedgerClient {
    /// Deploy the contract at `contract`, owned by `owner`, at block 1
    pub fn new(contract: Principal, owner: Principal) -> Self {
        Self {
            contract,
            state: Mutex::new(LedgerState {
                head: 1,
                owner,
                records: HashMap::new(),
                members: Vec::new(),
                logs: Vec::new(),
                receipts: HashMap::new(),
                sent: Vec::new(),
                nonce: 0,
            }),
            faults: Mutex::new(HashSet::new()),
            receipt_delay: Mutex::new(ReceiptDelay::Immediate),
            latency: Mutex::new(None),
            call_counts: Mutex::new(HashMap::new()),
            revert_next: AtomicBool::new(false),
            reverse_logs: AtomicBool::new(false),
            clock: AtomicU64::new(0),
            log_queries: AtomicU64::new(0),
            receipt_polls: AtomicU64::new(0),
        }
    }

    /// Contract address
    pub fn contract(&self) -> &Principal {
        &self.contract
    }

    // ==================== Steering ====================

    /// Make an operation class fail (or recover)
    pub fn set_fault(&self, fault: Fault, enabled: bool) {
        let mut faults = lock(&self.faults);
        if enabled {
            faults.insert(fault);
        } else {
            faults.remove(&fault);
        }
    }

    /// Delay applied to every read-only call
    pub fn set_latency(&self, latency: Option<Duration>) {
        *lock(&self.latency) = latency;
    }

    /// Receipt visibility for transactions mined from now on
    pub fn set_receipt_delay(&self, delay: ReceiptDelay) {
        *lock(&self.receipt_delay) = delay;
    }

    /// Make every pending receipt visible
    pub fn release_receipts(&self) {
        for pending in lock(&self.state).receipts.values_mut() {
            pending.hidden_polls = Some(0);
        }
    }

    /// Mine the next transaction with a failure status and no state change
    pub fn revert_next_transaction(&self) {
        self.revert_next.store(true, Ordering::SeqCst);
    }

    /// Return logs newest-first
    pub fn set_reverse_log_order(&self, reverse: bool) {
        self.reverse_logs.store(reverse, Ordering::SeqCst);
    }

    /// Pin contract time; 0 returns to the system clock
    pub fn set_clock(&self, unix_secs: u64) {
        self.clock.store(unix_secs, Ordering::SeqCst);
    }

    // ==================== Seeding ====================

    /// Store a record directly, without a transaction or events
    pub fn set_record(&self, principal: &Principal, record: AccessRecord) {
        let mut state = lock(&self.state);
        if !state.members.contains(principal) {
            state.members.push(principal.clone());
        }
        state.records.insert(principal.clone(), record);
    }

    /// Current stored record
    pub fn record(&self, principal: &Principal) -> Option<AccessRecord> {
        lock(&self.state).records.get(principal).copied()
    }

    /// Mine one block containing `bodies` as consecutive logs; returns the block
    pub fn emit(&self, bodies: &[DoorEventBody]) -> u64 {
        let mut state = lock(&self.state);
        state.head += 1;
        let block = state.head;
        for (index, body) in bodies.iter().enumerate() {
            let entry = LogEntry::from_body(&self.contract, block, index as u64, None, body);
            state.logs.push(entry);
        }
        block
    }

    /// Append a raw log without mining
    pub fn push_log(&self, entry: LogEntry) {
        let mut state = lock(&self.state);
        state.head = state.head.max(entry.block_number);
        state.logs.push(entry);
    }

    /// Mine `n` empty blocks
    pub fn mine_blocks(&self, n: u64) -> u64 {
        let mut state = lock(&self.state);
        state.head += n;
        state.head
    }

    // ==================== Inspection ====================

    /// Current head without going through the client interface
    pub fn head(&self) -> u64 {
        lock(&self.state).head
    }

    /// Read-only calls made for `method`
    pub fn call_count(&self, method: Method) -> u64 {
        lock(&self.call_counts).get(&method).copied().unwrap_or(0)
    }

    /// `get_event_logs` invocations
    pub fn log_query_count(&self) -> u64 {
        self.log_queries.load(Ordering::SeqCst)
    }

    /// `get_receipt` invocations
    pub fn receipt_poll_count(&self) -> u64 {
        self.receipt_polls.load(Ordering::SeqCst)
    }

    /// Every submitted transaction as `(sender, call)`
    pub fn sent_transactions(&self) -> Vec<(Principal, ContractCall)> {
        lock(&self.state).sent.clone()
    }

    // ==================== Contract ====================

    fn faulted(&self, fault: Fault) -> LedgerResult<()> {
        if lock(&self.faults).contains(&fault) {
            return Err(LedgerError::Unavailable(format!("simulated {:?} failure", fault)));
        }
        Ok(())
    }

    fn now(&self) -> u64 {
        match self.clock.load(Ordering::SeqCst) {
            0 => unix_now(),
            pinned => pinned,
        }
    }

    fn check_contract(&self, contract: &Principal) -> LedgerResult<()> {
        if contract != &self.contract {
            return Err(LedgerError::Rpc {
                code: -32000,
                message: format!("no contract code at {}", contract),
            });
        }
        Ok(())
    }

    fn is_privileged(state: &LedgerState, sender: &Principal, now: u64) -> bool {
        sender == &state.owner
            || state
                .records
                .get(sender)
                .map(|r| r.role == AccessRole::Admin && r.is_valid(now))
                .unwrap_or(false)
    }

    fn read(&self, state: &LedgerState, call: &ContractCall) -> LedgerResult<AbiValue> {
        let now = self.now();
        let record_of = |index: usize| -> LedgerResult<AccessRecord> {
            let who = call.arg(index)?.as_address()?;
            Ok(state.records.get(who).copied().unwrap_or_default())
        };
        let value = match call.method {
            Method::CanOpenDoor => {
                let r = record_of(0)?;
                AbiValue::Bool(r.is_valid(now) && (r.has_physical_access || r.has_digital_access))
            }
            Method::CanOpenPhysicalDoor => {
                AbiValue::Bool(record_of(0)?.is_valid_for(Capability::Physical, now))
            }
            Method::CanOpenDigitalDoor => {
                AbiValue::Bool(record_of(0)?.is_valid_for(Capability::Digital, now))
            }
            Method::CanEnterAdminRoom => {
                AbiValue::Bool(record_of(0)?.is_valid_for(Capability::AdminRoom, now))
            }
            Method::GetAccessList => AbiValue::AddressArray(state.members.clone()),
            Method::AccessList => encode_access_record(&record_of(0)?),
            Method::Owner => AbiValue::Address(state.owner.clone()),
            other => {
                return Err(LedgerError::InvalidArgument(format!(
                    "{} is not a view function",
                    other
                )))
            }
        };
        Ok(value)
    }

    /// Apply a transaction; `Err` carries the revert reason
    fn execute(
        state: &mut LedgerState,
        sender: &Principal,
        call: &ContractCall,
        now: u64,
    ) -> Result<Vec<DoorEventBody>, String> {
        let target = || -> Result<Principal, String> {
            call.arg(0)
                .and_then(|v| v.as_address().cloned())
                .map_err(|e| e.to_string())
        };
        match call.method {
            Method::GrantAccess => {
                if !Self::is_privileged(state, sender, now) {
                    return Err("Only admin".to_string());
                }
                let who = target()?;
                let record = call.granted_record().map_err(|e| e.to_string())?;
                if record.role == AccessRole::None {
                    return Err("Invalid role".to_string());
                }
                if record.role == AccessRole::Admin && sender != &state.owner {
                    return Err("Only owner".to_string());
                }
                if !state.members.contains(&who) {
                    state.members.push(who.clone());
                }
                state.records.insert(who.clone(), record);
                Ok(vec![
                    DoorEventBody::Granted {
                        principal: who.clone(),
                        role: record.role,
                        physical: record.has_physical_access,
                        digital: record.has_digital_access,
                    },
                    DoorEventBody::Changed {
                        principal: who,
                        role: record.role,
                        physical: record.has_physical_access,
                        digital: record.has_digital_access,
                        admin_room: record.has_admin_room_access,
                        expiration: record.expiration,
                    },
                ])
            }
            Method::RevokeAccess => {
                if !Self::is_privileged(state, sender, now) {
                    return Err("Only admin".to_string());
                }
                let who = target()?;
                if state.records.remove(&who).is_none() {
                    return Err("No access to revoke".to_string());
                }
                state.members.retain(|m| m != &who);
                Ok(vec![DoorEventBody::Revoked { principal: who }])
            }
            Method::OpenDoor => {
                let who = target()?;
                let door_id = call
                    .arg(1)
                    .and_then(|v| v.as_uint())
                    .map_err(|e| e.to_string())?;
                let physical = call
                    .arg(2)
                    .and_then(|v| v.as_bool())
                    .map_err(|e| e.to_string())?;
                Ok(vec![DoorEventBody::Opened {
                    principal: who,
                    door_id: Some(door_id),
                    physical,
                }])
            }
            other => Err(format!("{} is a view function", other)),
        }
    }

    fn tx_hash(&self, sender: &Principal, call: &ContractCall, nonce: u64) -> TxHash {
        let mut hasher = Sha256::new();
        hasher.update(self.contract.as_str().as_bytes());
        hasher.update(sender.as_str().as_bytes());
        hasher.update(call.method.signature().as_bytes());
        hasher.update(nonce.to_be_bytes());
        TxHash::new(format!("0x{}", hex::encode(hasher.finalize())))
    }
}

#[async_trait]
impl LedgerClient for MockLedgerClient {
    async fn block_number(&self) -> LedgerResult<u64> {
        self.faulted(Fault::BlockNumber)?;
        Ok(self.head())
    }

    async fn call(&self, contract: &Principal, call: &ContractCall) -> LedgerResult<AbiValue> {
        *lock(&self.call_counts).entry(call.method).or_insert(0) += 1;
        let latency = *lock(&self.latency);
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        self.faulted(Fault::Calls)?;
        self.check_contract(contract)?;
        let state = lock(&self.state);
        self.read(&state, call)
    }

    async fn send_transaction(
        &self,
        contract: &Principal,
        call: &ContractCall,
        signer: &Signer,
    ) -> LedgerResult<TxHash> {
        self.faulted(Fault::Sends)?;
        self.check_contract(contract)?;
        if call.method.is_read_only() {
            return Err(LedgerError::InvalidArgument(format!(
                "{} is a view function",
                call.method
            )));
        }

        let now = self.now();
        let hidden_polls = match *lock(&self.receipt_delay) {
            ReceiptDelay::Immediate => Some(0),
            ReceiptDelay::Polls(n) => Some(n),
            ReceiptDelay::Withheld => None,
        };
        let force_revert = self.revert_next.swap(false, Ordering::SeqCst);

        let mut state = lock(&self.state);
        let sender = signer.address().clone();
        state.nonce += 1;
        let tx_hash = self.tx_hash(&sender, call, state.nonce);
        state.sent.push((sender.clone(), call.clone()));
        state.head += 1;
        let block = state.head;

        let outcome = if force_revert {
            Err("forced revert".to_string())
        } else {
            Self::execute(&mut state, &sender, call, now)
        };

        let (status, events) = match outcome {
            Ok(events) => (RECEIPT_STATUS_SUCCESS, events),
            Err(reason) => {
                debug!(
                    tx = %tx_hash,
                    method = %call.method,
                    reason = %reason,
                    "Transaction reverted"
                );
                (RECEIPT_STATUS_REVERTED, Vec::new())
            }
        };

        for (index, body) in events.iter().enumerate() {
            let entry = LogEntry::from_body(
                &self.contract,
                block,
                index as u64,
                Some(tx_hash.clone()),
                body,
            );
            state.logs.push(entry);
        }

        let receipt = Receipt {
            tx_hash: tx_hash.clone(),
            block_number: block,
            status,
            gas_used: BASE_GAS + EVENT_GAS * events.len() as u64,
        };
        state.receipts.insert(
            tx_hash.clone(),
            PendingReceipt {
                receipt,
                hidden_polls,
            },
        );

        Ok(tx_hash)
    }

    async fn get_receipt(&self, tx_hash: &TxHash) -> LedgerResult<Option<Receipt>> {
        self.receipt_polls.fetch_add(1, Ordering::SeqCst);
        self.faulted(Fault::Receipts)?;
        let mut state = lock(&self.state);
        let pending = match state.receipts.get_mut(tx_hash) {
            Some(p) => p,
            None => return Ok(None),
        };
        match pending.hidden_polls {
            Some(0) => Ok(Some(pending.receipt.clone())),
            Some(n) => {
                pending.hidden_polls = Some(n - 1);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn get_event_logs(
        &self,
        contract: &Principal,
        kind: DoorEventKind,
        from_block: u64,
        to_block: u64,
    ) -> LedgerResult<Vec<LogEntry>> {
        self.log_queries.fetch_add(1, Ordering::SeqCst);
        self.faulted(Fault::EventLogs)?;
        self.check_contract(contract)?;
        let state = lock(&self.state);
        let mut logs: Vec<LogEntry> = state
            .logs
            .iter()
            .filter(|l| {
                l.event == kind.event_name()
                    && l.block_number >= from_block
                    && l.block_number <= to_block
            })
            .cloned()
            .collect();
        if self.reverse_logs.load(Ordering::SeqCst) {
            logs.reverse();
        }
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Principal {
        let mut bytes = [0u8; 20];
        bytes[0] = 0xaa;
        bytes[19] = n;
        Principal::from_bytes(bytes)
    }

    fn signer_for(p: &Principal) -> Signer {
        Signer::from_parts(&format!("0x{}", "11".repeat(32)), p.as_str()).unwrap()
    }

    fn ledger() -> MockLedgerClient {
        MockLedgerClient::new(addr(0xff), addr(0))
    }

    #[tokio::test]
    async fn test_owner_grant_emits_events_and_receipt() {
        let ledger = ledger();
        let contract = ledger.contract().clone();
        let record = AccessRecord::for_role(AccessRole::Service, 0);
        let call = ContractCall::grant_access(&addr(1), &record);

        let tx = ledger
            .send_transaction(&contract, &call, &signer_for(&addr(0)))
            .await
            .unwrap();
        let receipt = ledger.get_receipt(&tx).await.unwrap().unwrap();
        assert!(receipt.is_success());
        assert_eq!(ledger.record(&addr(1)), Some(record));

        let granted = ledger
            .get_event_logs(&contract, DoorEventKind::Granted, 0, ledger.head())
            .await
            .unwrap();
        assert_eq!(granted.len(), 1);
        assert_eq!(granted[0].tx_hash.as_ref(), Some(&tx));
    }

    #[tokio::test]
    async fn test_unprivileged_grant_reverts() {
        let ledger = ledger();
        let contract = ledger.contract().clone();
        let record = AccessRecord::for_role(AccessRole::Default, 0);
        let call = ContractCall::grant_access(&addr(2), &record);

        let tx = ledger
            .send_transaction(&contract, &call, &signer_for(&addr(1)))
            .await
            .unwrap();
        let receipt = ledger.get_receipt(&tx).await.unwrap().unwrap();
        assert_eq!(receipt.status, 0);
        assert_eq!(ledger.record(&addr(2)), None);
    }

    #[tokio::test]
    async fn test_admin_cannot_grant_admin() {
        let ledger = ledger();
        let contract = ledger.contract().clone();
        let record = AccessRecord::for_role(AccessRole::Admin, 0);
        ledger.set_record(&addr(1), record);
        let call = ContractCall::grant_access(&addr(2), &record);

        let tx = ledger
            .send_transaction(&contract, &call, &signer_for(&addr(1)))
            .await
            .unwrap();
        assert!(!ledger.get_receipt(&tx).await.unwrap().unwrap().is_success());
    }

    #[tokio::test]
    async fn test_delayed_receipt() {
        let ledger = ledger();
        let contract = ledger.contract().clone();
        ledger.set_receipt_delay(ReceiptDelay::Polls(2));
        let call = ContractCall::open_door(&addr(3), 0, true);

        let tx = ledger
            .send_transaction(&contract, &call, &signer_for(&addr(9)))
            .await
            .unwrap();
        assert!(ledger.get_receipt(&tx).await.unwrap().is_none());
        assert!(ledger.get_receipt(&tx).await.unwrap().is_none());
        assert!(ledger.get_receipt(&tx).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_view_calls() {
        let ledger = ledger();
        let contract = ledger.contract().clone();
        ledger.set_record(
            &addr(1),
            AccessRecord {
                role: AccessRole::Default,
                has_physical_access: true,
                has_digital_access: false,
                has_admin_room_access: false,
                expiration: 0,
            },
        );

        let physical = ledger
            .call(&contract, &ContractCall::can_open_physical_door(&addr(1)))
            .await
            .unwrap();
        assert_eq!(physical, AbiValue::Bool(true));
        let admin = ledger
            .call(&contract, &ContractCall::can_enter_admin_room(&addr(1)))
            .await
            .unwrap();
        assert_eq!(admin, AbiValue::Bool(false));
        let list = ledger
            .call(&contract, &ContractCall::get_access_list())
            .await
            .unwrap();
        assert_eq!(list, AbiValue::AddressArray(vec![addr(1)]));
        assert_eq!(ledger.call_count(Method::GetAccessList), 1);
    }

    #[tokio::test]
    async fn test_faults_and_wrong_contract() {
        let ledger = ledger();
        ledger.set_fault(Fault::Calls, true);
        let result = ledger
            .call(ledger.contract(), &ContractCall::owner())
            .await;
        assert!(matches!(result, Err(LedgerError::Unavailable(_))));

        ledger.set_fault(Fault::Calls, false);
        let result = ledger.call(&addr(7), &ContractCall::owner()).await;
        assert!(matches!(result, Err(LedgerError::Rpc { .. })));
    }

    #[tokio::test]
    async fn test_emit_orders_logs_in_block() {
        let ledger = ledger();
        let block = ledger.emit(&[
            DoorEventBody::Revoked { principal: addr(1) },
            DoorEventBody::Revoked { principal: addr(2) },
        ]);
        ledger.set_reverse_log_order(true);
        let logs = ledger
            .get_event_logs(ledger.contract(), DoorEventKind::Revoked, block, block)
            .await
            .unwrap();
        assert_eq!(logs.iter().map(|l| l.log_index).collect::<Vec<_>>(), vec![1, 0]);
    }
}
