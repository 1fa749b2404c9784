//! Receipt Polling
//!
//! Bounded wait for a submitted transaction to be mined.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use door_core::types::{Receipt, TxHash};
use door_core::{
    DoorConfig, DoorError, DoorResult, DEFAULT_RECEIPT_ATTEMPTS, DEFAULT_RECEIPT_INTERVAL_MS,
};
use door_ledger::LedgerClient;

/// Receipt poller
#[derive(Clone)]
pub struct ReceiptPoller {
    client: Arc<dyn LedgerClient>,
    max_attempts: u32,
    interval: Duration,
}

impl ReceiptPoller {
    /// Poller with the default 10 attempts at 1 second spacing
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self {
            client,
            max_attempts: DEFAULT_RECEIPT_ATTEMPTS,
            interval: Duration::from_millis(DEFAULT_RECEIPT_INTERVAL_MS),
        }
    }

    /// Poller following the configured attempts and spacing
    pub fn from_config(client: Arc<dyn LedgerClient>, config: &DoorConfig) -> Self {
        Self::new(client).with_limits(config.receipt_max_attempts, config.receipt_interval())
    }

    pub fn with_limits(mut self, max_attempts: u32, interval: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.interval = interval;
        self
    }

    /// Poll until a receipt is seen or attempts run out
    ///
    /// A failed poll counts as an attempt. A mined receipt with a failure
    /// status is `TransactionReverted`; running out of attempts is
    /// `ReceiptTimeout`, which leaves the outcome unknown.
    pub async fn wait(&self, tx_hash: &TxHash) -> DoorResult<Receipt> {
        for attempt in 1..=self.max_attempts {
            match self.client.get_receipt(tx_hash).await {
                Ok(Some(receipt)) if receipt.is_success() => {
                    debug!(
                        "Transaction {} confirmed in block {} after {} attempt(s)",
                        tx_hash, receipt.block_number, attempt
                    );
                    return Ok(receipt);
                }
                Ok(Some(receipt)) => {
                    warn!("Transaction {} reverted with status {}", tx_hash, receipt.status);
                    return Err(DoorError::TransactionReverted {
                        tx_hash: tx_hash.to_string(),
                        status: receipt.status,
                    });
                }
                Ok(None) => debug!(
                    "Receipt for {} pending ({}/{})",
                    tx_hash, attempt, self.max_attempts
                ),
                Err(e) => warn!(
                    "Receipt poll {}/{} for {} failed: {}",
                    attempt, self.max_attempts, tx_hash, e
                ),
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        warn!("No receipt for {} after {} attempts", tx_hash, self.max_attempts);
        Err(DoorError::ReceiptTimeout {
            tx_hash: tx_hash.to_string(),
            attempts: self.max_attempts,
        })
    }
}
