//! Access Contract ABI
//!
//! Method and event surface of the access contract, expressed as typed
//! values. Encoding to calldata and log topics is the job of the concrete
//! [`crate::LedgerClient`] implementation; everything above it works on
//! [`ContractCall`] and [`LogEntry`].

use door_core::types::{
    AccessRecord, AccessRole, DoorEvent, DoorEventBody, DoorEventKind, Principal, TxHash,
};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// ABI value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AbiValue {
    /// `address`
    Address(Principal),
    /// `uint8` / `uint256` (values used by the contract fit in 64 bits)
    Uint(u64),
    /// `bool`
    Bool(bool),
    /// `address[]`
    AddressArray(Vec<Principal>),
    /// Multiple return values
    Tuple(Vec<AbiValue>),
}

impl AbiValue {
    pub fn as_address(&self) -> LedgerResult<&Principal> {
        match self {
            AbiValue::Address(p) => Ok(p),
            other => Err(mismatch("address", other)),
        }
    }

    pub fn as_uint(&self) -> LedgerResult<u64> {
        match self {
            AbiValue::Uint(v) => Ok(*v),
            other => Err(mismatch("uint", other)),
        }
    }

    pub fn as_bool(&self) -> LedgerResult<bool> {
        match self {
            AbiValue::Bool(b) => Ok(*b),
            other => Err(mismatch("bool", other)),
        }
    }

    pub fn as_address_array(&self) -> LedgerResult<&[Principal]> {
        match self {
            AbiValue::AddressArray(v) => Ok(v),
            other => Err(mismatch("address[]", other)),
        }
    }

    pub fn as_tuple(&self) -> LedgerResult<&[AbiValue]> {
        match self {
            AbiValue::Tuple(v) => Ok(v),
            other => Err(mismatch("tuple", other)),
        }
    }

    /// ABI type name
    pub fn type_name(&self) -> &'static str {
        match self {
            AbiValue::Address(_) => "address",
            AbiValue::Uint(_) => "uint",
            AbiValue::Bool(_) => "bool",
            AbiValue::AddressArray(_) => "address[]",
            AbiValue::Tuple(_) => "tuple",
        }
    }
}

fn mismatch(expected: &str, got: &AbiValue) -> LedgerError {
    LedgerError::Decode(format!("expected {}, got {}", expected, got.type_name()))
}

fn decode_role(value: &AbiValue) -> LedgerResult<AccessRole> {
    let raw = value.as_uint()?;
    let byte = u8::try_from(raw)
        .map_err(|_| LedgerError::Decode(format!("role {} out of uint8 range", raw)))?;
    Ok(AccessRole::from_u8(byte))
}

/// Access contract methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    CanOpenDoor,
    CanOpenPhysicalDoor,
    CanOpenDigitalDoor,
    CanEnterAdminRoom,
    GrantAccess,
    RevokeAccess,
    GetAccessList,
    AccessList,
    Owner,
    OpenDoor,
}

impl Method {
    /// Solidity function name
    pub fn name(&self) -> &'static str {
        match self {
            Method::CanOpenDoor => "canOpenDoor",
            Method::CanOpenPhysicalDoor => "canOpenPhysicalDoor",
            Method::CanOpenDigitalDoor => "canOpenDigitalDoor",
            Method::CanEnterAdminRoom => "canEnterAdminRoom",
            Method::GrantAccess => "grantAccess",
            Method::RevokeAccess => "revokeAccess",
            Method::GetAccessList => "getAccessList",
            Method::AccessList => "accessList",
            Method::Owner => "owner",
            Method::OpenDoor => "openDoor",
        }
    }

    /// Canonical signature used for selector derivation
    pub fn signature(&self) -> &'static str {
        match self {
            Method::CanOpenDoor => "canOpenDoor(address)",
            Method::CanOpenPhysicalDoor => "canOpenPhysicalDoor(address)",
            Method::CanOpenDigitalDoor => "canOpenDigitalDoor(address)",
            Method::CanEnterAdminRoom => "canEnterAdminRoom(address)",
            Method::GrantAccess => "grantAccess(address,uint8,bool,bool,bool,uint256)",
            Method::RevokeAccess => "revokeAccess(address)",
            Method::GetAccessList => "getAccessList()",
            Method::AccessList => "accessList(address)",
            Method::Owner => "owner()",
            Method::OpenDoor => "openDoor(address,uint256,bool)",
        }
    }

    /// `view` functions are called; the rest are sent as transactions
    pub fn is_read_only(&self) -> bool {
        !matches!(
            self,
            Method::GrantAccess | Method::RevokeAccess | Method::OpenDoor
        )
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A method invocation with its arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    pub method: Method,
    pub args: Vec<AbiValue>,
}

impl ContractCall {
    fn with_address(method: Method, principal: &Principal) -> Self {
        Self {
            method,
            args: vec![AbiValue::Address(principal.clone())],
        }
    }

    pub fn can_open_door(principal: &Principal) -> Self {
        Self::with_address(Method::CanOpenDoor, principal)
    }

    pub fn can_open_physical_door(principal: &Principal) -> Self {
        Self::with_address(Method::CanOpenPhysicalDoor, principal)
    }

    pub fn can_open_digital_door(principal: &Principal) -> Self {
        Self::with_address(Method::CanOpenDigitalDoor, principal)
    }

    pub fn can_enter_admin_room(principal: &Principal) -> Self {
        Self::with_address(Method::CanEnterAdminRoom, principal)
    }

    pub fn grant_access(principal: &Principal, record: &AccessRecord) -> Self {
        Self {
            method: Method::GrantAccess,
            args: vec![
                AbiValue::Address(principal.clone()),
                AbiValue::Uint(u64::from(record.role.as_u8())),
                AbiValue::Bool(record.has_physical_access),
                AbiValue::Bool(record.has_digital_access),
                AbiValue::Bool(record.has_admin_room_access),
                AbiValue::Uint(record.expiration),
            ],
        }
    }

    pub fn revoke_access(principal: &Principal) -> Self {
        Self::with_address(Method::RevokeAccess, principal)
    }

    pub fn get_access_list() -> Self {
        Self {
            method: Method::GetAccessList,
            args: Vec::new(),
        }
    }

    pub fn access_list(principal: &Principal) -> Self {
        Self::with_address(Method::AccessList, principal)
    }

    pub fn owner() -> Self {
        Self {
            method: Method::Owner,
            args: Vec::new(),
        }
    }

    pub fn open_door(principal: &Principal, door_id: u64, is_physical: bool) -> Self {
        Self {
            method: Method::OpenDoor,
            args: vec![
                AbiValue::Address(principal.clone()),
                AbiValue::Uint(door_id),
                AbiValue::Bool(is_physical),
            ],
        }
    }

    /// Argument at `index`, or an `InvalidArgument` error
    pub fn arg(&self, index: usize) -> LedgerResult<&AbiValue> {
        self.args.get(index).ok_or_else(|| {
            LedgerError::InvalidArgument(format!(
                "{} expects argument {}",
                self.method.signature(),
                index
            ))
        })
    }

    /// Rebuild the record carried by a `grantAccess` call
    pub fn granted_record(&self) -> LedgerResult<AccessRecord> {
        if self.method != Method::GrantAccess {
            return Err(LedgerError::InvalidArgument(format!(
                "{} does not carry a record",
                self.method
            )));
        }
        let values = self.args.get(1..6).ok_or_else(|| {
            LedgerError::InvalidArgument("grantAccess expects 6 arguments".to_string())
        })?;
        decode_record_fields(values)
    }
}

fn decode_record_fields(values: &[AbiValue]) -> LedgerResult<AccessRecord> {
    if values.len() != 5 {
        return Err(LedgerError::Decode(format!(
            "access record expects 5 fields, got {}",
            values.len()
        )));
    }
    Ok(AccessRecord {
        role: decode_role(&values[0])?,
        has_physical_access: values[1].as_bool()?,
        has_digital_access: values[2].as_bool()?,
        has_admin_room_access: values[3].as_bool()?,
        expiration: values[4].as_uint()?,
    })
}

/// Decode the `(uint8,bool,bool,bool,uint256)` returned by `accessList(address)`
pub fn decode_access_record(value: &AbiValue) -> LedgerResult<AccessRecord> {
    decode_record_fields(value.as_tuple()?)
}

/// Encode a record as `accessList(address)` returns it
pub fn encode_access_record(record: &AccessRecord) -> AbiValue {
    AbiValue::Tuple(vec![
        AbiValue::Uint(u64::from(record.role.as_u8())),
        AbiValue::Bool(record.has_physical_access),
        AbiValue::Bool(record.has_digital_access),
        AbiValue::Bool(record.has_admin_room_access),
        AbiValue::Uint(record.expiration),
    ])
}

// ============================================================================
// Event Logs
// ============================================================================

/// Raw event log as returned by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Emitting contract
    pub address: Principal,
    /// Event name
    pub event: String,
    /// Block number
    pub block_number: u64,
    /// Log index within the block
    pub log_index: u64,
    /// Emitting transaction
    pub tx_hash: Option<TxHash>,
    /// Decoded event parameters in declaration order
    pub params: Vec<AbiValue>,
}

impl LogEntry {
    /// Build the log a contract would emit for `body`
    pub fn from_body(
        address: &Principal,
        block_number: u64,
        log_index: u64,
        tx_hash: Option<TxHash>,
        body: &DoorEventBody,
    ) -> Self {
        let (kind, params) = encode_event(body);
        Self {
            address: address.clone(),
            event: kind.event_name().to_string(),
            block_number,
            log_index,
            tx_hash,
            params,
        }
    }

    /// Decode into a typed event
    pub fn decode(&self) -> LedgerResult<DoorEvent> {
        let kind = DoorEventKind::from_event_name(&self.event)
            .ok_or_else(|| LedgerError::Decode(format!("untracked event {}", self.event)))?;
        let p = &self.params;
        let body = match kind {
            DoorEventKind::Opened => decode_opened(p)?,
            DoorEventKind::Granted => {
                expect_len(kind, p, 4)?;
                DoorEventBody::Granted {
                    principal: p[0].as_address()?.clone(),
                    role: decode_role(&p[1])?,
                    physical: p[2].as_bool()?,
                    digital: p[3].as_bool()?,
                }
            }
            DoorEventKind::Revoked => {
                expect_len(kind, p, 1)?;
                DoorEventBody::Revoked {
                    principal: p[0].as_address()?.clone(),
                }
            }
            DoorEventKind::Changed => {
                expect_len(kind, p, 6)?;
                let record = decode_record_fields(&p[1..6])?;
                DoorEventBody::Changed {
                    principal: p[0].as_address()?.clone(),
                    role: record.role,
                    physical: record.has_physical_access,
                    digital: record.has_digital_access,
                    admin_room: record.has_admin_room_access,
                    expiration: record.expiration,
                }
            }
        };
        Ok(DoorEvent::new(self.block_number, self.log_index, body))
    }
}

fn expect_len(kind: DoorEventKind, params: &[AbiValue], n: usize) -> LedgerResult<()> {
    if params.len() != n {
        return Err(LedgerError::Decode(format!(
            "{} expects {} parameters, got {}",
            kind,
            n,
            params.len()
        )));
    }
    Ok(())
}

/// `DoorOpened` has been deployed in three layouts:
/// `(address,uint256,bool)`, `(address,bool)` and `(address,uint256)`.
/// The last one does not say whether the door was physical; it is read as not.
fn decode_opened(p: &[AbiValue]) -> LedgerResult<DoorEventBody> {
    let principal = p
        .first()
        .ok_or_else(|| LedgerError::Decode("DoorOpened without parameters".to_string()))?
        .as_address()?
        .clone();
    let (door_id, physical) = match &p[1..] {
        [AbiValue::Uint(id), AbiValue::Bool(physical)] => (Some(*id), *physical),
        [AbiValue::Bool(physical)] => (None, *physical),
        [AbiValue::Uint(id)] => (Some(*id), false),
        other => {
            return Err(LedgerError::Decode(format!(
                "DoorOpened with unsupported layout of {} trailing parameters",
                other.len()
            )))
        }
    };
    Ok(DoorEventBody::Opened {
        principal,
        door_id,
        physical,
    })
}

/// Parameters a contract emits for `body`
pub fn encode_event(body: &DoorEventBody) -> (DoorEventKind, Vec<AbiValue>) {
    match body {
        DoorEventBody::Opened {
            principal,
            door_id,
            physical,
        } => {
            let mut params = vec![AbiValue::Address(principal.clone())];
            if let Some(id) = door_id {
                params.push(AbiValue::Uint(*id));
            }
            params.push(AbiValue::Bool(*physical));
            (DoorEventKind::Opened, params)
        }
        DoorEventBody::Granted {
            principal,
            role,
            physical,
            digital,
        } => (
            DoorEventKind::Granted,
            vec![
                AbiValue::Address(principal.clone()),
                AbiValue::Uint(u64::from(role.as_u8())),
                AbiValue::Bool(*physical),
                AbiValue::Bool(*digital),
            ],
        ),
        DoorEventBody::Revoked { principal } => (
            DoorEventKind::Revoked,
            vec![AbiValue::Address(principal.clone())],
        ),
        DoorEventBody::Changed {
            principal,
            role,
            physical,
            digital,
            admin_room,
            expiration,
        } => (
            DoorEventKind::Changed,
            vec![
                AbiValue::Address(principal.clone()),
                AbiValue::Uint(u64::from(role.as_u8())),
                AbiValue::Bool(*physical),
                AbiValue::Bool(*digital),
                AbiValue::Bool(*admin_room),
                AbiValue::Uint(*expiration),
            ],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Principal {
        Principal::parse("0xaaaa000000000000000000000000000000000001").unwrap()
    }

    fn contract() -> Principal {
        Principal::parse("0x5fbdb2315678afecb367f032d93f642f64180aa3").unwrap()
    }

    #[test]
    fn test_grant_access_arguments() {
        let record = AccessRecord::for_role(AccessRole::Service, 0);
        let call = ContractCall::grant_access(&user(), &record);
        assert_eq!(call.args.len(), 6);
        assert_eq!(call.args[1], AbiValue::Uint(2));
        assert_eq!(call.granted_record().unwrap(), record);
        assert!(!call.method.is_read_only());
    }

    #[test]
    fn test_decode_access_record() {
        let value = AbiValue::Tuple(vec![
            AbiValue::Uint(3),
            AbiValue::Bool(true),
            AbiValue::Bool(false),
            AbiValue::Bool(true),
            AbiValue::Uint(1_900_000_000),
        ]);
        let record = decode_access_record(&value).unwrap();
        assert_eq!(record.role, AccessRole::Admin);
        assert!(!record.has_digital_access);
        assert_eq!(record.expiration, 1_900_000_000);
    }

    #[test]
    fn test_decode_access_record_rejects_short_tuple() {
        let value = AbiValue::Tuple(vec![AbiValue::Uint(1), AbiValue::Bool(true)]);
        assert!(matches!(
            decode_access_record(&value),
            Err(LedgerError::Decode(_))
        ));
        assert!(decode_access_record(&AbiValue::Bool(true)).is_err());
    }

    #[test]
    fn test_role_out_of_range() {
        let value = AbiValue::Tuple(vec![
            AbiValue::Uint(300),
            AbiValue::Bool(true),
            AbiValue::Bool(true),
            AbiValue::Bool(true),
            AbiValue::Uint(0),
        ]);
        assert!(decode_access_record(&value).is_err());
    }

    #[test]
    fn test_decode_opened_layouts() {
        let log = |params: Vec<AbiValue>| LogEntry {
            address: contract(),
            event: "DoorOpened".to_string(),
            block_number: 4,
            log_index: 0,
            tx_hash: None,
            params,
        };

        let canonical = log(vec![
            AbiValue::Address(user()),
            AbiValue::Uint(1),
            AbiValue::Bool(true),
        ])
        .decode()
        .unwrap();
        assert_eq!(
            canonical.body,
            DoorEventBody::Opened {
                principal: user(),
                door_id: Some(1),
                physical: true
            }
        );

        let flag_only = log(vec![AbiValue::Address(user()), AbiValue::Bool(true)])
            .decode()
            .unwrap();
        assert!(matches!(
            flag_only.body,
            DoorEventBody::Opened {
                door_id: None,
                physical: true,
                ..
            }
        ));

        let id_only = log(vec![AbiValue::Address(user()), AbiValue::Uint(7)])
            .decode()
            .unwrap();
        assert!(matches!(
            id_only.body,
            DoorEventBody::Opened {
                door_id: Some(7),
                physical: false,
                ..
            }
        ));

        assert!(log(vec![AbiValue::Address(user())]).decode().is_err());
    }

    #[test]
    fn test_log_from_body_decodes_back() {
        let body = DoorEventBody::Changed {
            principal: user(),
            role: AccessRole::Default,
            physical: true,
            digital: true,
            admin_room: false,
            expiration: 0,
        };
        let entry = LogEntry::from_body(&contract(), 12, 3, None, &body);
        assert_eq!(entry.event, "AccessChanged");
        let event = entry.decode().unwrap();
        assert_eq!(event.block_number, 12);
        assert_eq!(event.log_index, 3);
        assert_eq!(event.body, body);
    }

    #[test]
    fn test_untracked_event_rejected() {
        let entry = LogEntry {
            address: contract(),
            event: "OwnershipTransferred".to_string(),
            block_number: 1,
            log_index: 0,
            tx_hash: None,
            params: vec![],
        };
        assert!(entry.decode().is_err());
    }
}
