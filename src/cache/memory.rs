//! In-process snapshot store

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{CacheEntry, Clock, SlotWrite, SnapshotStore, StoreError, SystemClock};
use crate::data::{Slot, Snapshot};

/// Snapshot store kept entirely in memory
///
/// Contents are lost when the process exits. Batches are applied under a
/// single write lock, so readers never see a partial batch.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<&'static str, CacheEntry>>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source used for expiry
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<&'static str, CacheEntry>>, StoreError> {
        self.entries
            .read()
            .map_err(|_| StoreError::Io("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<&'static str, CacheEntry>>, StoreError> {
        self.entries
            .write()
            .map_err(|_| StoreError::Io("memory store lock poisoned".to_string()))
    }

    fn lookup(
        entries: &HashMap<&'static str, CacheEntry>,
        slot: Slot,
        now: DateTime<Utc>,
    ) -> Option<Snapshot> {
        entries
            .get(slot.key())
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.data.clone())
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn exists(&self, slot: Slot) -> Result<bool, StoreError> {
        Ok(self.get(slot).await?.is_some())
    }

    async fn get(&self, slot: Slot) -> Result<Option<Snapshot>, StoreError> {
        let now = self.clock.now();
        Ok(Self::lookup(&*self.read()?, slot, now))
    }

    async fn put(
        &self,
        slot: Slot,
        snapshot: &Snapshot,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let now = self.clock.now();
        self.write()?
            .insert(slot.key(), CacheEntry::new(snapshot.clone(), now, ttl));
        Ok(())
    }

    async fn put_many(&self, writes: &[SlotWrite]) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut entries = self.write()?;
        for write in writes {
            entries.insert(
                write.slot.key(),
                CacheEntry::new(write.snapshot.clone(), now, write.ttl),
            );
        }
        Ok(())
    }

    async fn get_many(&self, slots: &[Slot]) -> Result<Vec<Option<Snapshot>>, StoreError> {
        let now = self.clock.now();
        let entries = self.read()?;
        Ok(slots
            .iter()
            .map(|slot| Self::lookup(&entries, *slot, now))
            .collect())
    }
}
