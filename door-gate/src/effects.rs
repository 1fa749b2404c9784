//! Derived Effects
//!
//! Handlers the reconciliation loop dispatches observed events to: an access
//! log and the external presence spawner for door openings by principals
//! that have no local player.

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, info, warn};

use door_core::types::{DoorEvent, DoorEventBody, DoorEventKind, Principal};
use door_core::DoorResult;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reaction to reconciled events
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Whether events of `kind` are dispatched to this handler
    fn handles(&self, kind: DoorEventKind) -> bool;

    /// Apply the effect; called at most once per event
    async fn handle(&self, event: &DoorEvent) -> DoorResult<()>;
}

// ============================================================================
// Access log
// ============================================================================

/// Default number of lines kept by [`AccessLogger`]
pub const DEFAULT_LOG_CAPACITY: usize = 200;

/// Bounded, newest-last access log
pub struct AccessLogger {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl AccessLogger {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    /// Snapshot, oldest first
    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).iter().cloned().collect()
    }

    pub fn clear(&self) {
        lock(&self.lines).clear();
    }

    fn push(&self, line: String) {
        let mut lines = lock(&self.lines);
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }
}

impl Default for AccessLogger {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[async_trait]
impl EventHandler for AccessLogger {
    fn name(&self) -> &'static str {
        "access_log"
    }

    fn handles(&self, _kind: DoorEventKind) -> bool {
        true
    }

    async fn handle(&self, event: &DoorEvent) -> DoorResult<()> {
        let line = event.log_line();
        info!(block = event.block_number, log_index = event.log_index, "{}", line);
        self.push(line);
        Ok(())
    }
}

// ============================================================================
// Presence
// ============================================================================

/// Principals controlled by local players
#[derive(Debug, Default)]
pub struct KnownPrincipals {
    inner: RwLock<HashSet<Principal>>,
}

impl KnownPrincipals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a local player's address; malformed addresses are ignored
    pub fn register(&self, address: &str) -> bool {
        match Principal::parse(address) {
            Ok(principal) => {
                self.write().insert(principal);
                true
            }
            Err(e) => {
                warn!("Ignoring local player address: {}", e);
                false
            }
        }
    }

    pub fn unregister(&self, principal: &Principal) {
        self.write().remove(principal);
    }

    pub fn contains(&self, principal: &Principal) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(principal)
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashSet<Principal>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scene-side collaborator that materializes a remote principal
pub trait PresenceSpawn: Send + Sync {
    /// Spawn a representation of `principal` labelled `label`
    fn spawn_presence(&self, principal: &Principal, label: &str) -> DoorResult<()>;
}

/// [`PresenceSpawn`] that records what it was asked to spawn
#[derive(Debug, Default)]
pub struct RecordingPresence {
    spawned: Mutex<Vec<(Principal, String)>>,
}

impl RecordingPresence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawned `(principal, label)` pairs in order
    pub fn spawned(&self) -> Vec<(Principal, String)> {
        lock(&self.spawned).clone()
    }
}

impl PresenceSpawn for RecordingPresence {
    fn spawn_presence(&self, principal: &Principal, label: &str) -> DoorResult<()> {
        lock(&self.spawned).push((principal.clone(), label.to_string()));
        Ok(())
    }
}

/// Spawns one representation per unknown principal seen opening a door
pub struct PresenceSpawner {
    known: Arc<KnownPrincipals>,
    sink: Arc<dyn PresenceSpawn>,
    only_physical: bool,
    represented: Mutex<HashSet<Principal>>,
}

impl PresenceSpawner {
    pub fn new(known: Arc<KnownPrincipals>, sink: Arc<dyn PresenceSpawn>) -> Self {
        Self {
            known,
            sink,
            only_physical: true,
            represented: Mutex::new(HashSet::new()),
        }
    }

    /// Also spawn for digital door openings when `false`
    pub fn only_physical(mut self, only_physical: bool) -> Self {
        self.only_physical = only_physical;
        self
    }

    /// Whether a representation exists for `principal`
    pub fn is_represented(&self, principal: &Principal) -> bool {
        lock(&self.represented).contains(principal)
    }
}

#[async_trait]
impl EventHandler for PresenceSpawner {
    fn name(&self) -> &'static str {
        "presence"
    }

    fn handles(&self, kind: DoorEventKind) -> bool {
        kind == DoorEventKind::Opened
    }

    async fn handle(&self, event: &DoorEvent) -> DoorResult<()> {
        let (principal, physical) = match &event.body {
            DoorEventBody::Opened {
                principal,
                physical,
                ..
            } => (principal, *physical),
            _ => return Ok(()),
        };

        if self.known.contains(principal) {
            debug!("{} is a local player, no presence spawned", principal);
            return Ok(());
        }
        if self.only_physical && !physical {
            debug!("{} opened a digital door, no presence spawned", principal);
            return Ok(());
        }

        let mut represented = lock(&self.represented);
        if represented.contains(principal) {
            return Ok(());
        }
        self.sink
            .spawn_presence(principal, &principal.short_label())?;
        represented.insert(principal.clone());
        info!("Spawned presence for {}", principal);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use door_core::types::AccessRole;

    fn addr(n: u8) -> Principal {
        let mut bytes = [0u8; 20];
        bytes[0] = 0xbe;
        bytes[19] = n;
        Principal::from_bytes(bytes)
    }

    fn opened(block: u64, who: Principal, physical: bool) -> DoorEvent {
        DoorEvent::new(
            block,
            0,
            DoorEventBody::Opened {
                principal: who,
                door_id: Some(0),
                physical,
            },
        )
    }

    #[tokio::test]
    async fn test_logger_ring_buffer() {
        let logger = AccessLogger::new(2);
        for n in 1..=3 {
            logger
                .handle(&DoorEvent::new(n, 0, DoorEventBody::Revoked { principal: addr(n as u8) }))
                .await
                .unwrap();
        }
        let lines = logger.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("02"));
        assert!(lines[1].starts_with("[AccessRevoked]"));
    }

    #[tokio::test]
    async fn test_logger_renders_changed() {
        let logger = AccessLogger::default();
        logger
            .handle(&DoorEvent::new(
                1,
                0,
                DoorEventBody::Changed {
                    principal: addr(1),
                    role: AccessRole::Default,
                    physical: true,
                    digital: true,
                    admin_room: false,
                    expiration: 0,
                },
            ))
            .await
            .unwrap();
        assert!(logger.lines()[0].contains("Expires: ∞"));
    }

    #[test]
    fn test_known_principals_case_insensitive() {
        let known = KnownPrincipals::new();
        assert!(known.register("0xBEEF00000000000000000000000000000000000A"));
        assert!(!known.register("0xshort"));
        let lowered = Principal::parse("0xbeef00000000000000000000000000000000000a").unwrap();
        assert!(known.contains(&lowered));
        assert_eq!(known.len(), 1);
    }

    #[tokio::test]
    async fn test_spawn_once_per_principal() {
        let sink = Arc::new(RecordingPresence::new());
        let spawner = PresenceSpawner::new(Arc::new(KnownPrincipals::new()), sink.clone());

        spawner.handle(&opened(1, addr(1), true)).await.unwrap();
        spawner.handle(&opened(2, addr(1), true)).await.unwrap();

        let spawned = sink.spawned();
        assert_eq!(spawned.len(), 1);
        assert_eq!(spawned[0].1, "0xbe...");
        assert!(spawner.is_represented(&addr(1)));
    }

    #[tokio::test]
    async fn test_no_spawn_for_local_or_digital() {
        let known = Arc::new(KnownPrincipals::new());
        known.register(addr(1).as_str());
        let sink = Arc::new(RecordingPresence::new());
        let spawner = PresenceSpawner::new(known, sink.clone());

        spawner.handle(&opened(1, addr(1), true)).await.unwrap();
        spawner.handle(&opened(2, addr(2), false)).await.unwrap();
        assert!(sink.spawned().is_empty());
    }

    #[tokio::test]
    async fn test_digital_spawn_when_allowed() {
        let sink = Arc::new(RecordingPresence::new());
        let spawner = PresenceSpawner::new(Arc::new(KnownPrincipals::new()), sink.clone())
            .only_physical(false);
        spawner.handle(&opened(1, addr(2), false)).await.unwrap();
        assert_eq!(sink.spawned().len(), 1);
    }
}
