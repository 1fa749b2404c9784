//! Event Reconciliation Loop
//!
//! Keeps local effects in step with the access contract's event log.
//!
//! Each cycle moves `Idle → Polling → Processing → Idle`:
//! - Polling reads the head and queries every tracked event kind over
//!   `[watermark, head]`, one query per kind.
//! - Processing merges the results, sorts them by `(block, log_index)` and
//!   dispatches each `(block, log_index, kind)` key at most once.
//! - The watermark then becomes `head + 1` and is persisted.
//!
//! A failed query leaves the watermark untouched; the next attempt follows
//! the shorter retry backoff. Nothing is dispatched once the loop is torn
//! down.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use door_core::types::{DoorEvent, DoorEventKind, EventKey, Principal};
use door_core::{DoorConfig, DoorError, DoorResult};
use door_ledger::LedgerClient;

use crate::effects::EventHandler;
use crate::watermark::WatermarkStore;

/// Loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    Idle,
    Polling,
    Processing,
    Stopped,
}

/// Where to begin when no watermark is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartPosition {
    /// The block after the head at first contact; history is not replayed
    #[default]
    Head,
    /// An explicit block
    Block(u64),
}

/// Loop timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Delay after a successful cycle
    pub poll_interval: Duration,
    /// Delay after a failed cycle
    pub retry_backoff: Duration,
    /// First block when nothing is stored
    pub start: StartPosition,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self::from(&DoorConfig::default())
    }
}

impl From<&DoorConfig> for ReconcilerConfig {
    fn from(config: &DoorConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            retry_backoff: config.retry_backoff(),
            start: StartPosition::Head,
        }
    }
}

/// Outcome of one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// First block queried
    pub from_block: u64,
    /// Last block queried; the new watermark is `to_block + 1`
    pub to_block: u64,
    /// Events handed to handlers
    pub dispatched: usize,
    /// Events skipped because their key was already applied
    pub duplicates: usize,
}

fn set_state(state: &Mutex<ReconcilerState>, next: ReconcilerState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = next;
}

/// Reconciliation loop for one contract
pub struct EventReconciler {
    client: Arc<dyn LedgerClient>,
    contract: Principal,
    store: Arc<dyn WatermarkStore>,
    handlers: Vec<Arc<dyn EventHandler>>,
    config: ReconcilerConfig,
    /// Next block to process; owned by this loop
    watermark: Option<u64>,
    /// Keys dispatched at or above the persisted watermark
    seen: BTreeSet<EventKey>,
    state: Arc<Mutex<ReconcilerState>>,
    torn_down: Arc<AtomicBool>,
}

impl EventReconciler {
    pub fn new(
        client: Arc<dyn LedgerClient>,
        contract: Principal,
        store: Arc<dyn WatermarkStore>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            client,
            contract,
            store,
            handlers: Vec::new(),
            config,
            watermark: None,
            seen: BTreeSet::new(),
            state: Arc::new(Mutex::new(ReconcilerState::Idle)),
            torn_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a handler
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn state(&self) -> ReconcilerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Next block to process, once known
    pub fn watermark(&self) -> Option<u64> {
        self.watermark
    }

    /// Kinds with at least one handler
    fn tracked_kinds(&self) -> Vec<DoorEventKind> {
        DoorEventKind::ALL
            .into_iter()
            .filter(|k| self.handlers.iter().any(|h| h.handles(*k)))
            .collect()
    }

    async fn resolve_watermark(&mut self, head: u64) -> DoorResult<u64> {
        if let Some(w) = self.watermark {
            return Ok(w);
        }
        let w = match self.store.load(&self.contract).await? {
            Some(stored) => {
                info!("Resuming {} from stored watermark {}", self.contract, stored);
                stored
            }
            None => {
                let start = match self.config.start {
                    StartPosition::Head => head + 1,
                    StartPosition::Block(block) => block,
                };
                info!("No stored watermark for {}, starting at block {}", self.contract, start);
                self.store.advance(&self.contract, start).await?
            }
        };
        self.watermark = Some(w);
        Ok(w)
    }

    /// Run one `Polling → Processing` pass
    pub async fn run_cycle(&mut self) -> DoorResult<CycleReport> {
        if self.torn_down.load(Ordering::SeqCst) {
            return Err(DoorError::TornDown(format!("reconciler for {}", self.contract)));
        }
        set_state(&self.state, ReconcilerState::Polling);
        let result = self.cycle().await;
        if !self.torn_down.load(Ordering::SeqCst) {
            set_state(&self.state, ReconcilerState::Idle);
        }
        result
    }

    async fn cycle(&mut self) -> DoorResult<CycleReport> {
        let head = self
            .client
            .block_number()
            .await
            .map_err(|e| e.into_event_query_error())?;
        let from_block = self.resolve_watermark(head).await?;

        if from_block > head {
            debug!("No new blocks (watermark {}, head {})", from_block, head);
            return Ok(CycleReport {
                from_block,
                to_block: head,
                dispatched: 0,
                duplicates: 0,
            });
        }

        let mut events = Vec::new();
        for kind in self.tracked_kinds() {
            let logs = self
                .client
                .get_event_logs(&self.contract, kind, from_block, head)
                .await
                .map_err(|e| e.into_event_query_error())?;
            for log in logs {
                if log.block_number < from_block || log.block_number > head {
                    debug!(
                        "Ignoring {} log at {}:{} outside {}..={}",
                        log.event, log.block_number, log.log_index, from_block, head
                    );
                    continue;
                }
                match log.decode() {
                    Ok(event) => events.push(event),
                    Err(e) => warn!(
                        "Skipping undecodable {} log at {}:{}: {}",
                        log.event, log.block_number, log.log_index, e
                    ),
                }
            }
        }

        set_state(&self.state, ReconcilerState::Processing);
        events.sort_by_key(|e| e.key());

        let mut dispatched = 0;
        let mut duplicates = 0;
        for event in &events {
            if self.torn_down.load(Ordering::SeqCst) {
                return Err(DoorError::TornDown(format!("reconciler for {}", self.contract)));
            }
            if !self.seen.insert(event.key()) {
                duplicates += 1;
                continue;
            }
            self.dispatch(event).await;
            dispatched += 1;
        }

        let next = self.store.advance(&self.contract, head + 1).await?;
        self.watermark = Some(next);
        self.seen = self.seen.split_off(&EventKey {
            block_number: next,
            log_index: 0,
            kind: DoorEventKind::Opened,
        });

        if dispatched > 0 {
            info!(
                "Reconciled blocks {}..={} of {}: {} event(s)",
                from_block, head, self.contract, dispatched
            );
        }
        Ok(CycleReport {
            from_block,
            to_block: head,
            dispatched,
            duplicates,
        })
    }

    async fn dispatch(&self, event: &DoorEvent) {
        let kind = event.kind();
        for handler in self.handlers.iter().filter(|h| h.handles(kind)) {
            if let Err(e) = handler.handle(event).await {
                error!(
                    "Handler {} failed on {} at {}:{}: {}",
                    handler.name(),
                    kind,
                    event.block_number,
                    event.log_index,
                    e
                );
            }
        }
    }

    /// Run cycles until stopped, on a background task
    pub fn spawn(mut self) -> ReconcilerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let state = self.state.clone();
        let torn_down = self.torn_down.clone();
        let poll_interval = self.config.poll_interval;
        let retry_backoff = self.config.retry_backoff;

        let task = tokio::spawn(async move {
            let mut delay = Duration::ZERO;
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(delay) => {}
                }

                let outcome = tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    outcome = self.run_cycle() => outcome,
                };

                delay = match outcome {
                    Ok(_) => poll_interval,
                    Err(DoorError::TornDown(_)) => break,
                    Err(e) => {
                        warn!(
                            "Reconciliation cycle failed, retrying in {:?}: {}",
                            retry_backoff, e
                        );
                        retry_backoff
                    }
                };
            }
            set_state(&self.state, ReconcilerState::Stopped);
            info!("Reconciler for {} stopped", self.contract);
        });

        ReconcilerHandle {
            shutdown_tx,
            torn_down,
            state,
            task,
        }
    }
}

/// Handle to a running reconciler
pub struct ReconcilerHandle {
    shutdown_tx: mpsc::Sender<()>,
    torn_down: Arc<AtomicBool>,
    state: Arc<Mutex<ReconcilerState>>,
    task: JoinHandle<()>,
}

impl ReconcilerHandle {
    pub fn state(&self) -> ReconcilerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Tear down and wait for the task to exit
    ///
    /// In-flight queries are dropped and no event is dispatched afterwards.
    pub async fn stop(self) {
        self.torn_down.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            error!("Reconciler task ended abnormally: {}", e);
        }
        set_state(&self.state, ReconcilerState::Stopped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::AccessLogger;
    use crate::watermark::MemoryWatermarkStore;
    use async_trait::async_trait;
    use door_core::types::{AccessRole, DoorEventBody, Receipt, Signer, TxHash};
    use door_ledger::{
        AbiValue, ContractCall, Fault, LedgerResult, LogEntry, MockLedgerClient,
    };

    /// Client that answers every log query from genesis, ignoring `from_block`
    struct OverlappingClient(Arc<MockLedgerClient>);

    #[async_trait]
    impl LedgerClient for OverlappingClient {
        async fn block_number(&self) -> LedgerResult<u64> {
            self.0.block_number().await
        }

        async fn call(&self, contract: &Principal, call: &ContractCall) -> LedgerResult<AbiValue> {
            self.0.call(contract, call).await
        }

        async fn send_transaction(
            &self,
            contract: &Principal,
            call: &ContractCall,
            signer: &Signer,
        ) -> LedgerResult<TxHash> {
            self.0.send_transaction(contract, call, signer).await
        }

        async fn get_receipt(&self, tx_hash: &TxHash) -> LedgerResult<Option<Receipt>> {
            self.0.get_receipt(tx_hash).await
        }

        async fn get_event_logs(
            &self,
            contract: &Principal,
            kind: DoorEventKind,
            _from_block: u64,
            to_block: u64,
        ) -> LedgerResult<Vec<LogEntry>> {
            self.0.get_event_logs(contract, kind, 0, to_block).await
        }
    }

    /// Records the keys it receives
    #[derive(Default)]
    struct KeyRecorder {
        keys: Mutex<Vec<EventKey>>,
    }

    impl KeyRecorder {
        fn keys(&self) -> Vec<EventKey> {
            self.keys.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventHandler for KeyRecorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn handles(&self, _kind: DoorEventKind) -> bool {
            true
        }

        async fn handle(&self, event: &DoorEvent) -> DoorResult<()> {
            self.keys.lock().unwrap().push(event.key());
            Ok(())
        }
    }

    fn addr(n: u8) -> Principal {
        let mut bytes = [0u8; 20];
        bytes[0] = 0xaa;
        bytes[19] = n;
        Principal::from_bytes(bytes)
    }

    fn revoked(n: u8) -> DoorEventBody {
        DoorEventBody::Revoked { principal: addr(n) }
    }

    struct Fixture {
        ledger: Arc<MockLedgerClient>,
        store: Arc<MemoryWatermarkStore>,
        recorder: Arc<KeyRecorder>,
        reconciler: EventReconciler,
    }

    fn fixture(start: StartPosition) -> Fixture {
        let ledger = Arc::new(MockLedgerClient::new(addr(0xff), addr(0)));
        let store = Arc::new(MemoryWatermarkStore::new());
        let recorder = Arc::new(KeyRecorder::default());
        let config = ReconcilerConfig {
            poll_interval: Duration::from_secs(10),
            retry_backoff: Duration::from_secs(3),
            start,
        };
        let reconciler = EventReconciler::new(ledger.clone(), addr(0xff), store.clone(), config)
            .with_handler(recorder.clone());
        Fixture {
            ledger,
            store,
            recorder,
            reconciler,
        }
    }

    #[tokio::test]
    async fn test_sorts_across_reversed_query_order() {
        let mut f = fixture(StartPosition::Block(0));
        f.ledger.set_reverse_log_order(true);
        let block = f.ledger.emit(&[revoked(1), revoked(2)]);

        f.reconciler.run_cycle().await.unwrap();
        let keys = f.recorder.keys();
        assert_eq!(keys.len(), 2);
        assert_eq!((keys[0].block_number, keys[0].log_index), (block, 0));
        assert_eq!((keys[1].block_number, keys[1].log_index), (block, 1));
    }

    #[tokio::test]
    async fn test_merges_kinds_in_block_order() {
        let mut f = fixture(StartPosition::Block(0));
        f.ledger.emit(&[DoorEventBody::Granted {
            principal: addr(1),
            role: AccessRole::Default,
            physical: true,
            digital: false,
        }]);
        f.ledger.emit(&[revoked(1)]);

        f.reconciler.run_cycle().await.unwrap();
        let kinds: Vec<_> = f.recorder.keys().iter().map(|k| k.kind).collect();
        assert_eq!(kinds, vec![DoorEventKind::Granted, DoorEventKind::Revoked]);
    }

    #[tokio::test]
    async fn test_duplicate_log_dispatched_once() {
        let mut f = fixture(StartPosition::Block(0));
        f.ledger.mine_blocks(5);
        let entry = LogEntry::from_body(&addr(0xff), 5, 2, None, &revoked(1));
        f.ledger.push_log(entry.clone());
        f.ledger.push_log(entry);

        let report = f.reconciler.run_cycle().await.unwrap();
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(f.recorder.keys().len(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_ranges_dispatch_once_across_cycles() {
        let ledger = Arc::new(MockLedgerClient::new(addr(0xff), addr(0)));
        let recorder = Arc::new(KeyRecorder::default());
        let config = ReconcilerConfig {
            start: StartPosition::Block(0),
            ..ReconcilerConfig::default()
        };
        let mut reconciler = EventReconciler::new(
            Arc::new(OverlappingClient(ledger.clone())),
            addr(0xff),
            Arc::new(MemoryWatermarkStore::new()),
            config,
        )
        .with_handler(recorder.clone());

        ledger.emit(&[revoked(1)]);
        assert_eq!(reconciler.run_cycle().await.unwrap().dispatched, 1);

        ledger.mine_blocks(1);
        let report = reconciler.run_cycle().await.unwrap();
        assert_eq!(report.dispatched, 0);

        let block = ledger.emit(&[revoked(2)]);
        let report = reconciler.run_cycle().await.unwrap();
        assert_eq!(report.dispatched, 1);

        let keys = recorder.keys();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1].block_number, block);
    }

    #[tokio::test]
    async fn test_logs_past_head_left_for_next_cycle() {
        let mut f = fixture(StartPosition::Block(0));
        let head = f.ledger.head();
        f.ledger
            .push_log(LogEntry::from_body(&addr(0xff), head + 1, 0, None, &revoked(3)));

        // Head read before the log's block was mined; the log shows up once it is
        let report = f.reconciler.run_cycle().await.unwrap();
        assert_eq!(report.dispatched, 0);

        f.ledger.mine_blocks(1);
        let report = f.reconciler.run_cycle().await.unwrap();
        assert_eq!(report.dispatched, 1);
        assert_eq!(f.recorder.keys().len(), 1);
    }

    #[tokio::test]
    async fn test_watermark_advances_to_head_plus_one() {
        let mut f = fixture(StartPosition::Block(0));
        f.ledger.emit(&[revoked(1)]);
        let head = f.ledger.mine_blocks(3);

        let report = f.reconciler.run_cycle().await.unwrap();
        assert_eq!(report.to_block, head);
        assert_eq!(f.reconciler.watermark(), Some(head + 1));
        assert_eq!(f.store.load(&addr(0xff)).await.unwrap(), Some(head + 1));

        // Nothing new: no queries, watermark unchanged
        let queries = f.ledger.log_query_count();
        f.reconciler.run_cycle().await.unwrap();
        assert_eq!(f.ledger.log_query_count(), queries);
        assert_eq!(f.reconciler.watermark(), Some(head + 1));
    }

    #[tokio::test]
    async fn test_failed_query_keeps_watermark() {
        let mut f = fixture(StartPosition::Block(0));
        f.ledger.emit(&[revoked(1)]);
        f.reconciler.run_cycle().await.unwrap();
        let before = f.reconciler.watermark();

        f.ledger.emit(&[revoked(2)]);
        f.ledger.set_fault(Fault::EventLogs, true);
        let err = f.reconciler.run_cycle().await.unwrap_err();
        assert!(matches!(err, DoorError::EventQueryFailure(_)));
        assert_eq!(f.reconciler.watermark(), before);
        assert_eq!(f.store.load(&addr(0xff)).await.unwrap(), before);
        assert_eq!(f.reconciler.state(), ReconcilerState::Idle);

        f.ledger.set_fault(Fault::EventLogs, false);
        f.reconciler.run_cycle().await.unwrap();
        assert_eq!(f.recorder.keys().len(), 2);
    }

    #[tokio::test]
    async fn test_starts_after_head_without_replay() {
        let mut f = fixture(StartPosition::Head);
        f.ledger.emit(&[revoked(1)]);
        let head = f.ledger.head();

        f.reconciler.run_cycle().await.unwrap();
        assert!(f.recorder.keys().is_empty());
        assert_eq!(f.reconciler.watermark(), Some(head + 1));
        assert_eq!(f.store.load(&addr(0xff)).await.unwrap(), Some(head + 1));

        let next = f.ledger.emit(&[revoked(2)]);
        f.reconciler.run_cycle().await.unwrap();
        let keys = f.recorder.keys();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].block_number, next);
    }

    #[tokio::test]
    async fn test_resumes_from_stored_watermark() {
        let f = fixture(StartPosition::Head);
        let first = f.ledger.emit(&[revoked(1)]);
        f.ledger.emit(&[revoked(2)]);
        f.store.put(&addr(0xff), first + 1).await.unwrap();

        let mut reconciler = f.reconciler;
        reconciler.run_cycle().await.unwrap();
        let keys = f.recorder.keys();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].block_number, first + 1);
    }

    #[tokio::test]
    async fn test_stored_watermark_never_rewinds() {
        let mut f = fixture(StartPosition::Block(0));
        f.ledger.mine_blocks(4);
        f.store.put(&addr(0xff), 100).await.unwrap();
        f.reconciler.watermark = Some(1);

        f.reconciler.run_cycle().await.unwrap();
        assert_eq!(f.store.load(&addr(0xff)).await.unwrap(), Some(100));
        assert_eq!(f.reconciler.watermark(), Some(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loop_retries_and_stops() {
        let f = fixture(StartPosition::Block(0));
        let ledger = f.ledger.clone();
        let logger = Arc::new(AccessLogger::default());
        ledger.set_fault(Fault::BlockNumber, true);
        ledger.emit(&[revoked(1)]);

        let handle = f.reconciler.with_handler(logger.clone()).spawn();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(logger.lines().is_empty());

        ledger.set_fault(Fault::BlockNumber, false);
        // Retry backoff (3s) is shorter than the poll interval (10s)
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(logger.lines().len(), 1);
        assert!(handle.is_running());

        handle.stop().await;
        ledger.emit(&[revoked(2)]);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(logger.lines().len(), 1);
    }

    #[tokio::test]
    async fn test_torn_down_cycle_dispatches_nothing() {
        let mut f = fixture(StartPosition::Block(0));
        f.ledger.emit(&[revoked(1)]);
        f.reconciler.torn_down.store(true, Ordering::SeqCst);

        assert!(matches!(
            f.reconciler.run_cycle().await,
            Err(DoorError::TornDown(_))
        ));
        assert!(f.recorder.keys().is_empty());
    }
}
