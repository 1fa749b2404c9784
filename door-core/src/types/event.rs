//! Ledger events
//!
//! Events observed on the access contract. Each carries the block number and
//! log index it was emitted at; together with the event kind these form the
//! [`EventKey`] used to apply every event exactly once.

use serde::{Deserialize, Serialize};

use super::access::{format_expiration, AccessRole};
use super::door::door_display_name;
use super::principal::Principal;

/// Event kinds tracked by the reconciliation loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoorEventKind {
    /// `DoorOpened`
    Opened,
    /// `AccessGranted`
    Granted,
    /// `AccessRevoked`
    Revoked,
    /// `AccessChanged`
    Changed,
}

impl DoorEventKind {
    /// Every tracked kind
    pub const ALL: [DoorEventKind; 4] = [
        DoorEventKind::Opened,
        DoorEventKind::Granted,
        DoorEventKind::Revoked,
        DoorEventKind::Changed,
    ];

    /// Contract event name
    pub fn event_name(&self) -> &'static str {
        match self {
            DoorEventKind::Opened => "DoorOpened",
            DoorEventKind::Granted => "AccessGranted",
            DoorEventKind::Revoked => "AccessRevoked",
            DoorEventKind::Changed => "AccessChanged",
        }
    }

    /// Parse a contract event name
    pub fn from_event_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.event_name() == name)
    }
}

impl std::fmt::Display for DoorEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.event_name())
    }
}

/// De-duplication key; orders by block, then log index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    /// Block number
    pub block_number: u64,
    /// Log index within the block
    pub log_index: u64,
    /// Event kind
    pub kind: DoorEventKind,
}

/// Event payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DoorEventBody {
    /// A door was opened
    Opened {
        principal: Principal,
        /// Door identifier, when the emitting contract records one
        door_id: Option<u64>,
        /// Whether the door was physical
        physical: bool,
    },
    /// Access was granted
    Granted {
        principal: Principal,
        role: AccessRole,
        physical: bool,
        digital: bool,
    },
    /// Access was revoked
    Revoked { principal: Principal },
    /// Full record changed
    Changed {
        principal: Principal,
        role: AccessRole,
        physical: bool,
        digital: bool,
        admin_room: bool,
        /// Unix seconds; 0 means never expires
        expiration: u64,
    },
}

/// An event at a position in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorEvent {
    /// Block number
    pub block_number: u64,
    /// Log index within the block
    pub log_index: u64,
    /// Payload
    pub body: DoorEventBody,
}

impl DoorEvent {
    pub fn new(block_number: u64, log_index: u64, body: DoorEventBody) -> Self {
        Self {
            block_number,
            log_index,
            body,
        }
    }

    /// Event kind
    pub fn kind(&self) -> DoorEventKind {
        match self.body {
            DoorEventBody::Opened { .. } => DoorEventKind::Opened,
            DoorEventBody::Granted { .. } => DoorEventKind::Granted,
            DoorEventBody::Revoked { .. } => DoorEventKind::Revoked,
            DoorEventBody::Changed { .. } => DoorEventKind::Changed,
        }
    }

    /// De-duplication key
    pub fn key(&self) -> EventKey {
        EventKey {
            block_number: self.block_number,
            log_index: self.log_index,
            kind: self.kind(),
        }
    }

    /// Principal the event concerns
    pub fn principal(&self) -> &Principal {
        match &self.body {
            DoorEventBody::Opened { principal, .. }
            | DoorEventBody::Granted { principal, .. }
            | DoorEventBody::Revoked { principal }
            | DoorEventBody::Changed { principal, .. } => principal,
        }
    }

    /// One-line access log rendering
    pub fn log_line(&self) -> String {
        match &self.body {
            DoorEventBody::Granted {
                principal,
                role,
                physical,
                digital,
            } => format!(
                "[AccessGranted] {} | Role: {} | Physical: {} | Digital: {}",
                principal, role, physical, digital
            ),
            DoorEventBody::Revoked { principal } => format!("[AccessRevoked] {}", principal),
            DoorEventBody::Opened {
                principal,
                door_id,
                physical,
            } => match door_id {
                Some(id) => format!("[DoorOpened] {} | {}", principal, door_display_name(*id)),
                None if *physical => format!("[DoorOpened] {} | Physical door", principal),
                None => format!("[DoorOpened] {} | Digital door", principal),
            },
            DoorEventBody::Changed {
                principal,
                role,
                physical,
                digital,
                admin_room,
                expiration,
            } => format!(
                "[AccessChanged] {} | Role: {} | Physical: {} | Digital: {} | AdminRoom: {} | Expires: {}",
                principal,
                role,
                physical,
                digital,
                admin_room,
                format_expiration(*expiration)
            ),
        }
    }
}
