//! Snapshot store for the `latest` and `previous` slots
//!
//! This module defines the [`SnapshotStore`] seam the refresh and query logic
//! talk to, together with two backends: a file-backed [`CacheManager`] that
//! persists both slots in one JSON document, and an in-process
//! [`MemoryStore`]. Entries may carry an expiry deadline; an expired entry is
//! indistinguishable from an absent one on every read.

mod manager;
mod memory;

pub use manager::CacheManager;
pub use memory::MemoryStore;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::{Slot, Snapshot};

/// Errors raised by a store backend
///
/// Absence is never an error: reads of missing or expired slots return `None`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing medium could not be read or written
    #[error("store unavailable: {0}")]
    Io(String),

    /// Stored data exists but cannot be decoded
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// One write in a [`SnapshotStore::put_many`] batch
#[derive(Debug, Clone)]
pub struct SlotWrite {
    pub slot: Slot,
    pub snapshot: Snapshot,
    pub ttl: Option<Duration>,
}

/// Key-value storage for snapshots with per-key expiration
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Whether `slot` holds an unexpired snapshot
    async fn exists(&self, slot: Slot) -> Result<bool, StoreError>;

    /// Reads `slot`, returning `None` if it is absent or expired
    async fn get(&self, slot: Slot) -> Result<Option<Snapshot>, StoreError>;

    /// Overwrites `slot`, replacing any previous expiry with `ttl`
    ///
    /// A `ttl` of `None` retains the snapshot indefinitely.
    async fn put(
        &self,
        slot: Slot,
        snapshot: &Snapshot,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Applies every write as a single update; readers see all or none of them
    async fn put_many(&self, writes: &[SlotWrite]) -> Result<(), StoreError>;

    /// Reads several slots from one consistent view, in the order requested
    async fn get_many(&self, slots: &[Slot]) -> Result<Vec<Option<Snapshot>>, StoreError>;
}

/// Source of the current time for expiry decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A stored snapshot with its bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CacheEntry {
    /// The cached snapshot
    pub data: Snapshot,
    /// When the entry was written
    pub cached_at: DateTime<Utc>,
    /// When the entry stops being visible, if ever
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    pub(crate) fn new(snapshot: Snapshot, now: DateTime<Utc>, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.map(|ttl| {
            // Out-of-range TTLs are treated as "never"
            chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|ttl| now.checked_add_signed(ttl))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        });

        Self {
            data: snapshot,
            cached_at: now,
            expires_at,
        }
    }

    pub(crate) fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}
