//! Access Registry
//!
//! Read-only view of the access contract. Every lookup goes to the ledger;
//! nothing is cached between calls so a decision never rests on a stale
//! record.

use std::sync::Arc;
use tracing::{debug, warn};

use door_core::types::{AccessRecord, Capability, Principal};
use door_core::{DoorError, DoorResult};
use door_ledger::abi::decode_access_record;
use door_ledger::{AbiValue, ContractCall, LedgerClient};

/// Access contract reader
#[derive(Clone)]
pub struct AccessRegistry {
    client: Arc<dyn LedgerClient>,
    contract: Principal,
}

impl AccessRegistry {
    pub fn new(client: Arc<dyn LedgerClient>, contract: Principal) -> Self {
        Self { client, contract }
    }

    /// Contract address
    pub fn contract(&self) -> &Principal {
        &self.contract
    }

    async fn read(&self, call: &ContractCall) -> DoorResult<AbiValue> {
        self.client
            .call(&self.contract, call)
            .await
            .map_err(|e| e.into_registry_error())
    }

    /// Fresh record for `principal`; an unknown principal reads as role `None`
    pub async fn fetch(&self, principal: &Principal) -> DoorResult<AccessRecord> {
        let value = self.read(&ContractCall::access_list(principal)).await?;
        let record = decode_access_record(&value)?;
        debug!(principal = %principal, role = %record.role, "Fetched access record");
        Ok(record)
    }

    /// Pure validity check of a record for a capability at `now`
    pub fn is_valid(record: &AccessRecord, capability: Capability, now: u64) -> bool {
        record.is_valid_for(capability, now)
    }

    async fn read_bool(&self, call: ContractCall) -> DoorResult<bool> {
        let value = self.read(&call).await?;
        Ok(value.as_bool()?)
    }

    /// The contract's own predicate for `capability`
    ///
    /// `canOpenPhysicalDoor`, `canOpenDigitalDoor` or `canEnterAdminRoom`.
    pub async fn contract_allows(
        &self,
        principal: &Principal,
        capability: Capability,
    ) -> DoorResult<bool> {
        let call = match capability {
            Capability::Physical => ContractCall::can_open_physical_door(principal),
            Capability::Digital => ContractCall::can_open_digital_door(principal),
            Capability::AdminRoom => ContractCall::can_enter_admin_room(principal),
        };
        self.read_bool(call).await
    }

    /// Live `canEnterAdminRoom(address)`
    pub async fn can_enter_admin_room(&self, principal: &Principal) -> DoorResult<bool> {
        self.contract_allows(principal, Capability::AdminRoom).await
    }

    /// Live `canOpenDoor(address)`: any door at all
    pub async fn can_open_any_door(&self, principal: &Principal) -> DoorResult<bool> {
        self.read_bool(ContractCall::can_open_door(principal)).await
    }

    /// Contract owner
    pub async fn owner(&self) -> DoorResult<Principal> {
        let value = self.read(&ContractCall::owner()).await?;
        Ok(value.as_address()?.clone())
    }

    /// Every enumerated principal with its record
    ///
    /// Fails only when the list itself cannot be read; a record that cannot
    /// be read is skipped.
    pub async fn access_list(&self) -> DoorResult<Vec<(Principal, AccessRecord)>> {
        let value = self.read(&ContractCall::get_access_list()).await?;
        let members = value.as_address_array().map_err(DoorError::from)?.to_vec();

        let mut entries = Vec::with_capacity(members.len());
        for member in members {
            match self.fetch(&member).await {
                Ok(record) => entries.push((member, record)),
                Err(e) => warn!("Skipping access list entry {}: {}", member, e),
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use door_core::types::AccessRole;
    use door_ledger::{Fault, MockLedgerClient};

    fn addr(n: u8) -> Principal {
        let mut bytes = [0u8; 20];
        bytes[0] = 0xaa;
        bytes[19] = n;
        Principal::from_bytes(bytes)
    }

    fn setup() -> (Arc<MockLedgerClient>, AccessRegistry) {
        let ledger = Arc::new(MockLedgerClient::new(addr(0xff), addr(0)));
        let registry = AccessRegistry::new(ledger.clone(), addr(0xff));
        (ledger, registry)
    }

    #[tokio::test]
    async fn test_fetch_unknown_is_none_role() {
        let (_, registry) = setup();
        let record = registry.fetch(&addr(5)).await.unwrap();
        assert_eq!(record.role, AccessRole::None);
    }

    #[tokio::test]
    async fn test_fetch_is_never_cached() {
        let (ledger, registry) = setup();
        ledger.set_record(&addr(1), AccessRecord::for_role(AccessRole::Default, 0));
        assert_eq!(registry.fetch(&addr(1)).await.unwrap().role, AccessRole::Default);

        ledger.set_record(&addr(1), AccessRecord::for_role(AccessRole::Service, 0));
        assert_eq!(registry.fetch(&addr(1)).await.unwrap().role, AccessRole::Service);
        assert_eq!(ledger.call_count(door_ledger::Method::AccessList), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_registry_unavailable() {
        let (ledger, registry) = setup();
        ledger.set_fault(Fault::Calls, true);
        assert!(matches!(
            registry.fetch(&addr(1)).await,
            Err(DoorError::RegistryUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_access_list_and_owner() {
        let (ledger, registry) = setup();
        ledger.set_record(&addr(1), AccessRecord::for_role(AccessRole::Default, 0));
        ledger.set_record(&addr(2), AccessRecord::for_role(AccessRole::Admin, 0));

        let list = registry.access_list().await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].0, addr(2));
        assert_eq!(list[1].1.role, AccessRole::Admin);
        assert_eq!(registry.owner().await.unwrap(), addr(0));
    }

    #[tokio::test]
    async fn test_contract_predicates_per_capability() {
        let (ledger, registry) = setup();
        ledger.set_record(
            &addr(1),
            AccessRecord {
                has_digital_access: false,
                ..AccessRecord::for_role(AccessRole::Default, 0)
            },
        );

        assert!(registry.contract_allows(&addr(1), Capability::Physical).await.unwrap());
        assert!(!registry.contract_allows(&addr(1), Capability::Digital).await.unwrap());
        assert!(!registry.can_enter_admin_room(&addr(1)).await.unwrap());
        assert!(registry.can_open_any_door(&addr(1)).await.unwrap());
        assert!(!registry.can_open_any_door(&addr(2)).await.unwrap());
        assert_eq!(ledger.call_count(door_ledger::Method::CanOpenPhysicalDoor), 1);
        assert_eq!(ledger.call_count(door_ledger::Method::CanOpenDigitalDoor), 1);
    }
}
