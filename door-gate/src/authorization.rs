//! Authorization Engine
//!
//! Decides whether a principal may use a capability and submits grant and
//! revoke mutations.
//!
//! `authorize` fails closed: a registry read error becomes
//! `Deny(RegistryUnavailable)` and is never retried here. Admin room access
//! is settled by the contract's own `canEnterAdminRoom` predicate on top of
//! the record check.

use std::sync::Arc;
use tracing::{debug, info, warn};

use door_core::types::{
    expiration_from_minutes, AccessDecision, AccessRecord, AccessRole, Capability, DenyReason,
    Principal, Receipt, Signer,
};
use door_core::{unix_now, DoorConfig, DoorError, DoorResult};
use door_ledger::{ContractCall, LedgerClient};

use crate::receipt::ReceiptPoller;
use crate::registry::AccessRegistry;

/// Source of unix seconds
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Parameters of a grant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantRequest {
    pub role: AccessRole,
    pub physical: bool,
    pub digital: bool,
    pub admin_room: bool,
    /// Lifetime in minutes; 0 never expires
    pub expiration_minutes: u32,
}

impl GrantRequest {
    /// Grant with the role's conventional flags
    pub fn for_role(role: AccessRole, expiration_minutes: u32) -> Self {
        let (physical, digital, admin_room) = role.conventional_flags();
        Self {
            role,
            physical,
            digital,
            admin_room,
            expiration_minutes,
        }
    }

    fn record(&self, now: u64) -> AccessRecord {
        AccessRecord {
            role: self.role,
            has_physical_access: self.physical,
            has_digital_access: self.digital,
            has_admin_room_access: self.admin_room,
            expiration: expiration_from_minutes(now, self.expiration_minutes),
        }
    }
}

/// Authorization engine
#[derive(Clone)]
pub struct AuthorizationEngine {
    registry: AccessRegistry,
    client: Arc<dyn LedgerClient>,
    poller: ReceiptPoller,
    clock: Clock,
}

impl AuthorizationEngine {
    pub fn new(client: Arc<dyn LedgerClient>, contract: Principal) -> Self {
        Self {
            registry: AccessRegistry::new(client.clone(), contract),
            poller: ReceiptPoller::new(client.clone()),
            client,
            clock: Arc::new(unix_now),
        }
    }

    /// Engine with receipt limits taken from configuration
    pub fn from_config(client: Arc<dyn LedgerClient>, config: &DoorConfig) -> DoorResult<Self> {
        let contract = config.contract()?;
        let poller = ReceiptPoller::from_config(client.clone(), config);
        Ok(Self::new(client, contract).with_poller(poller))
    }

    pub fn with_poller(mut self, poller: ReceiptPoller) -> Self {
        self.poller = poller;
        self
    }

    /// Replace the clock used for grant expirations and privilege checks
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &AccessRegistry {
        &self.registry
    }

    /// Current time per the engine's clock
    pub fn now(&self) -> u64 {
        (self.clock)()
    }

    // ==================== Decisions ====================

    /// Decide access for a raw address
    ///
    /// Malformed input is rejected before any ledger call. Every other
    /// outcome is an [`AccessDecision`].
    pub async fn authorize(
        &self,
        principal: &str,
        capability: Capability,
        now: u64,
    ) -> DoorResult<AccessDecision> {
        let principal = Principal::parse(principal)?;
        Ok(self.authorize_principal(&principal, capability, now).await)
    }

    /// Decide access for an already validated principal
    pub async fn authorize_principal(
        &self,
        principal: &Principal,
        capability: Capability,
        now: u64,
    ) -> AccessDecision {
        let record = match self.registry.fetch(principal).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Denying {} ({}): registry read failed: {}", principal, capability, e);
                return AccessDecision::Deny(DenyReason::RegistryUnavailable);
            }
        };

        if let Err(reason) = record.check(capability, now) {
            debug!("Denying {} ({}): {}", principal, capability, reason);
            return AccessDecision::Deny(reason);
        }

        let decision = match capability {
            Capability::AdminRoom => self.admin_room_decision(principal).await,
            Capability::Physical | Capability::Digital => AccessDecision::Grant,
        };
        debug!(
            principal = %principal,
            capability = %capability,
            decision = ?decision,
            "Authorization decided"
        );
        decision
    }

    async fn admin_room_decision(&self, principal: &Principal) -> AccessDecision {
        match self.registry.can_enter_admin_room(principal).await {
            Ok(true) => AccessDecision::Grant,
            Ok(false) => AccessDecision::Deny(DenyReason::CapabilityNotGranted),
            Err(e) => {
                warn!("Denying {} admin room: predicate failed: {}", principal, e);
                AccessDecision::Deny(DenyReason::RegistryUnavailable)
            }
        }
    }

    // ==================== Mutations ====================

    /// Grant (or overwrite) access for `principal`
    pub async fn grant(
        &self,
        principal: &str,
        request: GrantRequest,
        signer: &Signer,
    ) -> DoorResult<Receipt> {
        let principal = Principal::parse(principal)?;
        if request.role == AccessRole::None {
            return Err(DoorError::MalformedInput(
                "cannot grant role None; revoke instead".to_string(),
            ));
        }
        let now = self.now();
        self.ensure_privileged(signer, request.role == AccessRole::Admin, now)
            .await?;

        let record = request.record(now);
        let call = ContractCall::grant_access(&principal, &record);
        let receipt = self.submit(&call, signer).await?;
        info!(
            "Granted {} to {} (expires {}) in block {}",
            record.role,
            principal,
            record.expiration_label(),
            receipt.block_number
        );
        Ok(receipt)
    }

    /// Revoke access for `principal`
    pub async fn revoke(&self, principal: &str, signer: &Signer) -> DoorResult<Receipt> {
        let principal = Principal::parse(principal)?;
        self.ensure_privileged(signer, false, self.now()).await?;

        let receipt = self
            .submit(&ContractCall::revoke_access(&principal), signer)
            .await?;
        info!("Revoked access of {} in block {}", principal, receipt.block_number);
        Ok(receipt)
    }

    /// Caller must be the owner or a valid admin; admin grants need the owner
    async fn ensure_privileged(
        &self,
        signer: &Signer,
        grants_admin: bool,
        now: u64,
    ) -> DoorResult<()> {
        let caller = signer.address();
        let owner = self.registry.owner().await?;
        if caller == &owner {
            return Ok(());
        }
        if grants_admin {
            return Err(DoorError::Unauthorized(format!(
                "only the owner can grant the Admin role, {} is not the owner",
                caller
            )));
        }
        let record = self.registry.fetch(caller).await?;
        if record.role == AccessRole::Admin && record.is_valid(now) {
            return Ok(());
        }
        Err(DoorError::Unauthorized(format!(
            "{} is neither owner nor a valid admin",
            caller
        )))
    }

    async fn submit(&self, call: &ContractCall, signer: &Signer) -> DoorResult<Receipt> {
        let tx_hash = self
            .client
            .send_transaction(self.registry.contract(), call, signer)
            .await
            .map_err(|e| e.into_submission_error())?;
        debug!("Submitted {} as {}", call.method, tx_hash);
        self.poller.wait(&tx_hash).await
    }
}
