//! Gated Action Controller
//!
//! Drives each gateway through `Closed/Open → PendingCheck → Open/Closed`.
//! A request must pass the local presence check before an authorization
//! check starts, and at most one check is outstanding per gateway: requests
//! arriving meanwhile are ignored. Gateways are independent of each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, info};

use door_core::types::{
    AccessDecision, DenyReason, DoorGateway, DoorState, GatewayId, Position, Principal,
};
use door_core::{DoorError, DoorResult};

use crate::authorization::AuthorizationEngine;
use crate::signer::DoorSigner;

/// Scene-side spatial query
pub trait PresenceProbe: Send + Sync {
    /// Whether `principal`'s player is within the gateway's interaction radius
    fn player_nearby(&self, principal: &Principal, gateway: &DoorGateway) -> bool;
}

/// [`PresenceProbe`] over explicitly set player positions
#[derive(Debug, Default)]
pub struct PlayerPositions {
    positions: RwLock<HashMap<Principal, Position>>,
}

impl PlayerPositions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, principal: &Principal, position: Position) {
        self.positions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(principal.clone(), position);
    }

    pub fn remove(&self, principal: &Principal) {
        self.positions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(principal);
    }
}

impl PresenceProbe for PlayerPositions {
    fn player_nearby(&self, principal: &Principal, gateway: &DoorGateway) -> bool {
        self.positions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(principal)
            .map(|p| gateway.within_reach(p))
            .unwrap_or(false)
    }
}

/// Externally visible phase of a gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayPhase {
    Closed,
    Open,
    /// Authorization outstanding; `prior` is restored on denial
    PendingCheck { prior: DoorState },
}

/// Result of an interaction request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Granted; the gateway is now in this state
    Toggled(DoorState),
    /// Denied; state unchanged
    Denied(DenyReason),
    /// A check for this gateway was already outstanding
    Ignored,
    /// The requesting player is out of reach
    NotPresent,
    /// The gateway or controller was torn down while the check ran
    TornDown,
}

struct GatewaySlot {
    gateway: DoorGateway,
    pending: bool,
    /// Bumped on re-registration so stale checks can tell
    generation: u64,
}

type Slots = Mutex<HashMap<GatewayId, GatewaySlot>>;

fn lock_slots(slots: &Slots) -> MutexGuard<'_, HashMap<GatewayId, GatewaySlot>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears a gateway's pending flag if the request future is dropped mid-check
struct PendingGuard<'a> {
    slots: &'a Slots,
    id: GatewayId,
    generation: u64,
    armed: bool,
}

impl PendingGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(slot) = lock_slots(self.slots).get_mut(&self.id) {
            if slot.generation == self.generation {
                debug!("Check on gateway {} cancelled, clearing pending", self.id);
                slot.pending = false;
            }
        }
    }
}

/// Per-gateway state machine host
pub struct GatedActionController {
    engine: AuthorizationEngine,
    presence: Arc<dyn PresenceProbe>,
    signer: Arc<dyn DoorSigner>,
    slots: Slots,
    next_generation: AtomicU64,
    torn_down: AtomicBool,
}

impl GatedActionController {
    pub fn new(
        engine: AuthorizationEngine,
        presence: Arc<dyn PresenceProbe>,
        signer: Arc<dyn DoorSigner>,
    ) -> Self {
        Self {
            engine,
            presence,
            signer,
            slots: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            torn_down: AtomicBool::new(false),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<GatewayId, GatewaySlot>> {
        lock_slots(&self.slots)
    }

    /// Register (or replace) a gateway
    pub fn add_gateway(&self, gateway: DoorGateway) {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Registered gateway {} ({}, {})", gateway.id, gateway.name, gateway.door_type);
        self.slots().insert(
            gateway.id,
            GatewaySlot {
                gateway,
                pending: false,
                generation,
            },
        );
    }

    /// Tear down one gateway; a check in flight for it will apply nothing
    pub fn remove_gateway(&self, id: GatewayId) -> Option<DoorGateway> {
        self.slots().remove(&id).map(|slot| slot.gateway)
    }

    /// Tear down the controller; no further effects are applied
    pub fn teardown(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
        self.slots().clear();
    }

    pub fn gateway(&self, id: GatewayId) -> Option<DoorGateway> {
        self.slots().get(&id).map(|slot| slot.gateway.clone())
    }

    pub fn phase(&self, id: GatewayId) -> Option<GatewayPhase> {
        self.slots().get(&id).map(|slot| match (slot.pending, slot.gateway.current_state) {
            (true, prior) => GatewayPhase::PendingCheck { prior },
            (false, DoorState::Closed) => GatewayPhase::Closed,
            (false, DoorState::Open) => GatewayPhase::Open,
        })
    }

    /// Handle an interaction request from `principal` on gateway `id`
    ///
    /// Malformed principals and unknown gateways are errors; every other
    /// outcome is a [`RequestOutcome`].
    pub async fn request(&self, id: GatewayId, principal: &str) -> DoorResult<RequestOutcome> {
        if self.torn_down.load(Ordering::SeqCst) {
            return Ok(RequestOutcome::TornDown);
        }

        let (gateway, generation, principal) = {
            let mut slots = self.slots();
            let slot = slots
                .get_mut(&id)
                .ok_or_else(|| DoorError::MalformedInput(format!("unknown gateway {}", id)))?;
            if slot.pending {
                debug!("Gateway {} check pending, ignoring request", id);
                return Ok(RequestOutcome::Ignored);
            }
            let principal = Principal::parse(principal)?;
            if !self.presence.player_nearby(&principal, &slot.gateway) {
                debug!("{} not within reach of gateway {}", principal, id);
                return Ok(RequestOutcome::NotPresent);
            }
            slot.pending = true;
            (slot.gateway.clone(), slot.generation, principal)
        };

        let guard = PendingGuard {
            slots: &self.slots,
            id,
            generation,
            armed: true,
        };
        let capability = gateway.door_type.required_capability();
        let decision = self
            .engine
            .authorize_principal(&principal, capability, self.engine.now())
            .await;
        guard.disarm();

        let mut slots = self.slots();
        let current = !self.torn_down.load(Ordering::SeqCst);
        let slot = match slots.get_mut(&id) {
            Some(slot) if slot.generation == generation && current => slot,
            _ => {
                debug!("Gateway {} torn down during check, dropping decision", id);
                return Ok(RequestOutcome::TornDown);
            }
        };
        slot.pending = false;

        match decision {
            AccessDecision::Grant => {
                let next = slot.gateway.current_state.toggled();
                slot.gateway.current_state = next;
                drop(slots);
                info!(
                    "Access granted to {} on {} {}, now {:?}",
                    principal, gateway.door_type, gateway.name, next
                );
                self.signer
                    .sign_door_transaction(&principal, id, gateway.door_type.is_physical());
                Ok(RequestOutcome::Toggled(next))
            }
            AccessDecision::Deny(reason) => {
                info!(
                    "Access denied to {} on {} {}: {}",
                    principal, gateway.door_type, gateway.name, reason
                );
                Ok(RequestOutcome::Denied(reason))
            }
        }
    }
}
