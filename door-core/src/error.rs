//! Smart Door Error Types
//!
//! Error taxonomy shared by the registry, authorization engine, reconciliation
//! loop and controller. Access denials are not errors: they are returned as
//! [`crate::types::AccessDecision::Deny`].

use thiserror::Error;

/// Smart door errors
#[derive(Debug, Error)]
pub enum DoorError {
    /// Bad address or key (length/prefix/hex), rejected before any network call
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Transient failure reading the access contract
    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// Transaction mined with a non-success status
    #[error("Transaction {tx_hash} reverted with status {status}")]
    TransactionReverted { tx_hash: String, status: u64 },

    /// Receipt polling exhausted; the transaction may still confirm later
    #[error("No receipt for {tx_hash} after {attempts} attempts")]
    ReceiptTimeout { tx_hash: String, attempts: u32 },

    /// Transaction could not be submitted
    #[error("Transaction submission failed: {0}")]
    SubmissionFailed(String),

    /// Event log query failed during reconciliation
    #[error("Event query failed: {0}")]
    EventQueryFailure(String),

    /// Caller lacks the privilege required for a mutation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Log entry or call result could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Persistent storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Target was torn down while an operation was in flight
    #[error("Torn down: {0}")]
    TornDown(String),
}

/// Smart door result type
pub type DoorResult<T> = Result<T, DoorError>;

impl DoorError {
    /// Check if this error is transient and worth retrying by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DoorError::RegistryUnavailable(_)
                | DoorError::SubmissionFailed(_)
                | DoorError::EventQueryFailure(_)
                | DoorError::Storage(_)
        )
    }

    /// Whether the outcome of the operation is unknown rather than failed
    pub fn is_unknown_outcome(&self) -> bool {
        matches!(self, DoorError::ReceiptTimeout { .. })
    }

    /// Get suggested retry delay in milliseconds
    pub fn suggested_retry_delay_ms(&self) -> Option<u64> {
        match self {
            DoorError::RegistryUnavailable(_) => Some(1000),
            DoorError::SubmissionFailed(_) => Some(2000),
            DoorError::EventQueryFailure(_) => Some(3000),
            DoorError::Storage(_) => Some(500),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DoorError {
    fn from(e: serde_json::Error) -> Self {
        DoorError::Serialization(e.to_string())
    }
}
