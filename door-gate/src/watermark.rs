//! Watermark Storage
//!
//! One block number per monitored contract: the next block the reconciliation
//! loop has yet to process. [`WatermarkStore::advance`] never moves a stored
//! value backwards; only [`WatermarkStore::put`] can, and only the CLI's
//! forced reset uses it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;

use door_core::types::Principal;
use door_core::{DoorError, DoorResult};

const WATERMARKS_TREE: &str = "watermarks";

/// Persistent watermark storage
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Stored watermark for `contract`
    async fn load(&self, contract: &Principal) -> DoorResult<Option<u64>>;

    /// Overwrite unconditionally
    async fn put(&self, contract: &Principal, block: u64) -> DoorResult<()>;

    /// Remove the stored watermark
    async fn remove(&self, contract: &Principal) -> DoorResult<()>;

    /// All stored watermarks
    async fn entries(&self) -> DoorResult<Vec<(Principal, u64)>>;

    /// Store `block` unless a higher value is already stored; returns the stored value
    async fn advance(&self, contract: &Principal, block: u64) -> DoorResult<u64> {
        match self.load(contract).await? {
            Some(current) if current >= block => Ok(current),
            _ => {
                self.put(contract, block).await?;
                Ok(block)
            }
        }
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Volatile store for tests and simulations
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    marks: RwLock<HashMap<Principal, u64>>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn load(&self, contract: &Principal) -> DoorResult<Option<u64>> {
        Ok(self.marks.read().await.get(contract).copied())
    }

    async fn put(&self, contract: &Principal, block: u64) -> DoorResult<()> {
        self.marks.write().await.insert(contract.clone(), block);
        Ok(())
    }

    async fn remove(&self, contract: &Principal) -> DoorResult<()> {
        self.marks.write().await.remove(contract);
        Ok(())
    }

    async fn entries(&self) -> DoorResult<Vec<(Principal, u64)>> {
        let mut entries: Vec<_> = self
            .marks
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        entries.sort();
        Ok(entries)
    }
}

// ============================================================================
// Sled
// ============================================================================

/// Sled-backed store; keys are contract addresses, values big-endian `u64`
#[derive(Debug, Clone)]
pub struct SledWatermarkStore {
    db: sled::Db,
    marks: sled::Tree,
}

impl SledWatermarkStore {
    /// Open or create the store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> DoorResult<Self> {
        let db = sled::open(path)
            .map_err(|e| DoorError::Storage(format!("Failed to open sled db: {}", e)))?;
        let marks = db
            .open_tree(WATERMARKS_TREE)
            .map_err(|e| DoorError::Storage(format!("Failed to open watermarks tree: {}", e)))?;
        Ok(Self { db, marks })
    }

    /// Flush to disk
    pub fn flush(&self) -> DoorResult<()> {
        self.db
            .flush()
            .map_err(|e| DoorError::Storage(format!("Failed to flush db: {}", e)))?;
        Ok(())
    }

    fn decode(bytes: &[u8]) -> DoorResult<u64> {
        let raw: [u8; 8] = bytes.try_into().map_err(|_| {
            DoorError::Storage(format!("Corrupt watermark of {} bytes", bytes.len()))
        })?;
        Ok(u64::from_be_bytes(raw))
    }
}

#[async_trait]
impl WatermarkStore for SledWatermarkStore {
    async fn load(&self, contract: &Principal) -> DoorResult<Option<u64>> {
        let value = self
            .marks
            .get(contract.as_str().as_bytes())
            .map_err(|e| DoorError::Storage(format!("Failed to read watermark: {}", e)))?;
        value.map(|v| Self::decode(&v)).transpose()
    }

    async fn put(&self, contract: &Principal, block: u64) -> DoorResult<()> {
        self.marks
            .insert(contract.as_str().as_bytes(), block.to_be_bytes().to_vec())
            .map_err(|e| DoorError::Storage(format!("Failed to write watermark: {}", e)))?;
        self.marks
            .flush()
            .map_err(|e| DoorError::Storage(format!("Failed to flush watermark: {}", e)))?;
        Ok(())
    }

    async fn remove(&self, contract: &Principal) -> DoorResult<()> {
        self.marks
            .remove(contract.as_str().as_bytes())
            .map_err(|e| DoorError::Storage(format!("Failed to remove watermark: {}", e)))?;
        Ok(())
    }

    async fn entries(&self) -> DoorResult<Vec<(Principal, u64)>> {
        let mut entries = Vec::new();
        for item in self.marks.iter() {
            let (key, value) = item
                .map_err(|e| DoorError::Storage(format!("Failed to scan watermarks: {}", e)))?;
            let contract = std::str::from_utf8(&key)
                .map_err(|e| DoorError::Storage(format!("Corrupt watermark key: {}", e)))
                .and_then(Principal::parse)?;
            entries.push((contract, Self::decode(&value)?));
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract() -> Principal {
        Principal::parse("0x5fbdb2315678afecb367f032d93f642f64180aa3").unwrap()
    }

    #[tokio::test]
    async fn test_advance_never_rewinds() {
        let store = MemoryWatermarkStore::new();
        assert_eq!(store.advance(&contract(), 10).await.unwrap(), 10);
        assert_eq!(store.advance(&contract(), 7).await.unwrap(), 10);
        assert_eq!(store.load(&contract()).await.unwrap(), Some(10));
        assert_eq!(store.advance(&contract(), 11).await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_sled_advance_and_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledWatermarkStore::open(dir.path().join("marks")).unwrap();
        assert_eq!(store.load(&contract()).await.unwrap(), None);
        store.advance(&contract(), 42).await.unwrap();
        store.advance(&contract(), 40).await.unwrap();
        store.flush().unwrap();
        assert_eq!(store.load(&contract()).await.unwrap(), Some(42));
        assert_eq!(store.entries().await.unwrap(), vec![(contract(), 42)]);
    }

    #[tokio::test]
    async fn test_sled_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledWatermarkStore::open(dir.path()).unwrap();
        store.put(&contract(), 5).await.unwrap();
        store.remove(&contract()).await.unwrap();
        assert_eq!(store.load(&contract()).await.unwrap(), None);
    }
}
