//! Ledger Client Error Types

use door_core::DoorError;
use thiserror::Error;

/// Ledger client errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Node unreachable or request timed out
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// Node answered with a JSON-RPC error
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Call or log payload did not match the expected ABI shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Method is not part of the access contract ABI, or not callable this way
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// Argument list did not match the method signature
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Ledger client result type
pub type LedgerResult<T> = Result<T, LedgerError>;

impl LedgerError {
    /// Whether the failure is transport related rather than a malformed request
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_) | LedgerError::Rpc { .. })
    }

    /// Map a failed read-only call
    pub fn into_registry_error(self) -> DoorError {
        match self {
            LedgerError::Decode(msg) => DoorError::Decode(msg),
            other => DoorError::RegistryUnavailable(other.to_string()),
        }
    }

    /// Map a failed transaction submission
    pub fn into_submission_error(self) -> DoorError {
        match self {
            LedgerError::InvalidArgument(msg) => DoorError::MalformedInput(msg),
            other => DoorError::SubmissionFailed(other.to_string()),
        }
    }

    /// Map a failed event log query
    pub fn into_event_query_error(self) -> DoorError {
        DoorError::EventQueryFailure(self.to_string())
    }
}

impl From<LedgerError> for DoorError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Decode(msg) => DoorError::Decode(msg),
            LedgerError::InvalidArgument(msg) => DoorError::MalformedInput(msg),
            LedgerError::UnknownMethod(msg) => DoorError::Decode(format!("unknown method {}", msg)),
            other => DoorError::RegistryUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_mapping() {
        let e = LedgerError::Unavailable("connection refused".into());
        assert!(e.is_transient());
        assert!(matches!(
            e.into_registry_error(),
            DoorError::RegistryUnavailable(_)
        ));

        let e = LedgerError::Rpc {
            code: -32000,
            message: "nonce too low".into(),
        };
        assert!(matches!(
            e.into_submission_error(),
            DoorError::SubmissionFailed(_)
        ));

        let e = LedgerError::Unavailable("timeout".into());
        assert!(matches!(
            e.into_event_query_error(),
            DoorError::EventQueryFailure(_)
        ));
    }

    #[test]
    fn test_decode_stays_decode() {
        let e: DoorError = LedgerError::Decode("short tuple".into()).into();
        assert!(matches!(e, DoorError::Decode(_)));
        assert!(!LedgerError::Decode("x".into()).is_transient());
    }
}
