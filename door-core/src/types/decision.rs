//! Authorization outcomes

use serde::{Deserialize, Serialize};

/// Why access was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Principal has no role on the contract
    NoRecord,
    /// Record expired
    Expired,
    /// Record is valid but lacks the gateway's capability
    CapabilityNotGranted,
    /// Registry read failed; access is refused rather than guessed
    RegistryUnavailable,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::NoRecord => write!(f, "no access record"),
            DenyReason::Expired => write!(f, "access expired"),
            DenyReason::CapabilityNotGranted => write!(f, "capability not granted"),
            DenyReason::RegistryUnavailable => write!(f, "registry unavailable"),
        }
    }
}

/// Result of an authorization check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum AccessDecision {
    /// Access granted
    Grant,
    /// Access denied
    Deny(DenyReason),
}

impl AccessDecision {
    /// Whether access was granted
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Grant)
    }

    /// Denial reason, if denied
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            AccessDecision::Grant => None,
            AccessDecision::Deny(reason) => Some(*reason),
        }
    }
}

impl From<Result<(), DenyReason>> for AccessDecision {
    fn from(r: Result<(), DenyReason>) -> Self {
        match r {
            Ok(()) => AccessDecision::Grant,
            Err(reason) => AccessDecision::Deny(reason),
        }
    }
}
