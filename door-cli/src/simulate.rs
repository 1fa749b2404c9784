//! Scripted Simulation
//!
//! Plays a short door scenario against [`MockLedgerClient`]: grants, door
//! interactions, a revoke, then one reconciliation cycle whose access log and
//! presence spawns are reported.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use door_core::types::{
    AccessRole, DoorGateway, DoorType, GatewayId, Position, Principal, Signer,
};
use door_core::{unix_now, DoorResult};
use door_gate::{
    AccessLogger, AuthorizationEngine, EventHandler, EventReconciler, GatedActionController,
    GrantRequest, KnownPrincipals, LedgerDoorSigner, MemoryWatermarkStore, PlayerPositions,
    PresenceSpawner, ReceiptPoller, ReconcilerConfig, RecordingPresence, RequestOutcome,
    StartPosition,
};
use door_ledger::MockLedgerClient;

/// What the scenario produced
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// One line per scripted step
    pub steps: Vec<String>,
    /// Access log derived by the reconciliation loop
    pub access_log: Vec<String>,
    /// Labels of spawned remote representations
    pub spawned: Vec<String>,
    /// Watermark after reconciliation
    pub watermark: Option<u64>,
}

const CONTRACT: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
const OWNER: (&str, &str) = (
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
    "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266",
);
const DOOR: (&str, &str) = (
    "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
    "0x70997970c51812dc3a010c7d01b50e0d17dc79c8",
);
const ALICE: &str = "0x3c44cdddb6a900fa2b585dd299e03d12fa4293bc";
const BOB: &str = "0x90f79bf6eb2c4f870365e785982e1f101e93b906";

fn describe(who: &str, gateway: &str, outcome: &RequestOutcome) -> String {
    let short = &who[..who.len().min(6)];
    let what = match outcome {
        RequestOutcome::Toggled(state) => format!("granted, door now {:?}", state),
        RequestOutcome::Denied(reason) => format!("denied ({})", reason),
        RequestOutcome::Ignored => "ignored, check pending".to_string(),
        RequestOutcome::NotPresent => "not within reach".to_string(),
        RequestOutcome::TornDown => "door torn down".to_string(),
    };
    format!("{} at {}: {}", short, gateway, what)
}

/// Run the scenario
pub async fn run() -> DoorResult<SimulationReport> {
    let contract = Principal::parse(CONTRACT)?;
    let owner = Signer::from_parts(OWNER.0, OWNER.1)?;
    let door_identity = Signer::from_parts(DOOR.0, DOOR.1)?;

    let ledger = Arc::new(MockLedgerClient::new(contract.clone(), owner.address().clone()));
    let now = unix_now();
    ledger.set_clock(now);

    let poller = ReceiptPoller::new(ledger.clone()).with_limits(10, Duration::from_millis(50));
    let engine = AuthorizationEngine::new(ledger.clone(), contract.clone())
        .with_poller(poller.clone())
        .with_clock(Arc::new(move || now));

    let positions = Arc::new(PlayerPositions::new());
    let door_signer = Arc::new(
        LedgerDoorSigner::new(ledger.clone(), contract.clone(), door_identity).with_poller(poller),
    );
    let controller =
        GatedActionController::new(engine.clone(), positions.clone(), door_signer.clone());

    let gateways = [
        DoorGateway::new(0, "Main Door", DoorType::Physical),
        DoorGateway::new(1, "Server Room", DoorType::Digital).at(Position::new(10.0, 0.0, 0.0)),
        DoorGateway::new(2, "Admin Room", DoorType::Admin).at(Position::new(20.0, 0.0, 0.0)),
    ];
    for gateway in gateways.iter().cloned() {
        controller.add_gateway(gateway);
    }

    let known = Arc::new(KnownPrincipals::new());
    known.register(ALICE);

    let mut steps = Vec::new();

    engine
        .grant(ALICE, GrantRequest::for_role(AccessRole::Default, 0), &owner)
        .await?;
    steps.push("owner granted Default to alice".to_string());
    engine
        .grant(BOB, GrantRequest::for_role(AccessRole::Service, 60), &owner)
        .await?;
    steps.push("owner granted Service to bob for 60 minutes".to_string());

    let alice = Principal::parse(ALICE)?;
    let bob = Principal::parse(BOB)?;
    let visit =
        |who: &Principal, id: GatewayId| positions.set(who, gateways[id as usize].position);

    let script: [(&Principal, &str, GatewayId); 5] = [
        (&alice, ALICE, 0),
        (&alice, ALICE, 2),
        (&bob, BOB, 0),
        (&bob, BOB, 1),
        (&alice, ALICE, 1),
    ];
    for &(who, raw, id) in script.iter().take(4) {
        visit(who, id);
        let outcome = controller.request(id, raw).await?;
        steps.push(describe(raw, &gateways[id as usize].name, &outcome));
    }

    engine.revoke(ALICE, &owner).await?;
    steps.push("owner revoked alice".to_string());

    let (who, raw, id) = script[4];
    visit(who, id);
    let outcome = controller.request(id, raw).await?;
    steps.push(describe(raw, &gateways[id as usize].name, &outcome));

    door_signer.flush().await;

    let logger = Arc::new(AccessLogger::default());
    let presence = Arc::new(RecordingPresence::new());
    let config = ReconcilerConfig {
        start: StartPosition::Block(0),
        ..ReconcilerConfig::default()
    };
    let mut reconciler = EventReconciler::new(
        ledger.clone(),
        contract,
        Arc::new(MemoryWatermarkStore::new()),
        config,
    )
    .with_handler(logger.clone() as Arc<dyn EventHandler>)
    .with_handler(Arc::new(PresenceSpawner::new(known, presence.clone())));

    let report = reconciler.run_cycle().await?;
    info!(
        "Reconciled blocks {}..={}: {} events",
        report.from_block, report.to_block, report.dispatched
    );

    Ok(SimulationReport {
        steps,
        access_log: logger.lines(),
        spawned: presence.spawned().into_iter().map(|(_, label)| label).collect(),
        watermark: reconciler.watermark(),
    })
}
