//! Door Signer
//!
//! Records approved door use on-chain by sending `openDoor` from the door's
//! own identity. Submission runs on a detached task so the controller never
//! waits on it; the reconciliation loop later observes the resulting
//! `DoorOpened` event.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use door_core::types::{GatewayId, Principal, Signer};
use door_ledger::{ContractCall, LedgerClient};

use crate::receipt::ReceiptPoller;

/// Collaborator that records an approved door use
pub trait DoorSigner: Send + Sync {
    /// Fire-and-forget; must not block the caller
    fn sign_door_transaction(&self, principal: &Principal, door_id: GatewayId, is_physical: bool);
}

/// [`DoorSigner`] submitting `openDoor(address,uint256,bool)`
pub struct LedgerDoorSigner {
    client: Arc<dyn LedgerClient>,
    contract: Principal,
    identity: Signer,
    poller: ReceiptPoller,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl LedgerDoorSigner {
    pub fn new(client: Arc<dyn LedgerClient>, contract: Principal, identity: Signer) -> Self {
        Self {
            poller: ReceiptPoller::new(client.clone()),
            client,
            contract,
            identity,
            in_flight: Mutex::new(Vec::new()),
        }
    }

    pub fn with_poller(mut self, poller: ReceiptPoller) -> Self {
        self.poller = poller;
        self
    }

    /// Door account the transactions are sent from
    pub fn address(&self) -> &Principal {
        self.identity.address()
    }

    /// Wait for every submission started so far
    pub async fn flush(&self) {
        let handles: Vec<_> = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Door signing task ended abnormally: {}", e);
            }
        }
    }
}

impl DoorSigner for LedgerDoorSigner {
    fn sign_door_transaction(&self, principal: &Principal, door_id: GatewayId, is_physical: bool) {
        let client = self.client.clone();
        let contract = self.contract.clone();
        let identity = self.identity.clone();
        let poller = self.poller.clone();
        let call = ContractCall::open_door(principal, door_id, is_physical);
        let principal = principal.clone();

        let handle = tokio::spawn(async move {
            let tx_hash = match client.send_transaction(&contract, &call, &identity).await {
                Ok(hash) => hash,
                Err(e) => {
                    warn!("Failed to record door {} use by {}: {}", door_id, principal, e);
                    return;
                }
            };
            debug!("Recording door {} use by {} as {}", door_id, principal, tx_hash);
            match poller.wait(&tx_hash).await {
                Ok(receipt) => info!(
                    "Door {} use by {} recorded in block {}",
                    door_id, principal, receipt.block_number
                ),
                Err(e) => warn!("Door {} use by {} not confirmed: {}", door_id, principal, e),
            }
        });

        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);
    }
}
