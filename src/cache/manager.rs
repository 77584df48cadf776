//! File-backed snapshot store
//!
//! Provides a `CacheManager` that keeps every slot in a single JSON document
//! on disk, so a batch of slot writes lands in one atomic file replacement.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use directories::ProjectDirs;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use super::{CacheEntry, Clock, SlotWrite, SnapshotStore, StoreError, SystemClock};
use crate::data::{Slot, Snapshot};

/// Name of the document holding all slots
const DOCUMENT_NAME: &str = "snapshots.json";

type Document = HashMap<String, CacheEntry>;

/// Manages reading and writing cached snapshots to disk
///
/// The cache manager stores its document in an XDG-compliant cache directory
/// (`~/.cache/statcache/` on Linux) unless another directory is given. Writes
/// go to a temporary file that is renamed over the document, so readers only
/// ever see a complete previous or complete next version.
#[derive(Clone)]
pub struct CacheManager {
    /// Directory where the document is stored
    cache_dir: PathBuf,
    /// Time source for expiry decisions
    clock: Arc<dyn Clock>,
    /// Serializes read-modify-write cycles on the document
    write_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("cache_dir", &self.cache_dir)
            .finish_non_exhaustive()
    }
}

impl CacheManager {
    /// Creates a new CacheManager using the XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "statcache")?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a new CacheManager with a custom cache directory
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            clock: Arc::new(SystemClock),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Replaces the time source used for expiry
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Directory holding the document
    pub fn cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }

    fn document_path(&self) -> PathBuf {
        self.cache_dir.join(DOCUMENT_NAME)
    }

    /// Loads the whole document; a missing file is an empty document
    async fn load(&self) -> Result<Document, StoreError> {
        let content = match fs::read_to_string(self.document_path()).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Document::new()),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    /// Replaces the document on disk
    async fn save(&self, document: &Document) -> Result<(), StoreError> {
        fs::create_dir_all(&self.cache_dir).await?;

        let json = serde_json::to_string_pretty(document)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let tmp_path = self.cache_dir.join(format!("{}.tmp", DOCUMENT_NAME));
        fs::write(&tmp_path, json).await?;
        fs::rename(&tmp_path, self.document_path()).await?;
        Ok(())
    }

    /// Returns the unexpired snapshot stored under `slot`
    fn lookup(&self, document: &Document, slot: Slot) -> Option<Snapshot> {
        let now = self.clock.now();
        document
            .get(slot.key())
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.data.clone())
    }

    async fn apply(&self, writes: &[SlotWrite]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut document = self.load().await?;
        let now = self.clock.now();
        document.retain(|_, entry| !entry.is_expired(now));

        for write in writes {
            debug!(key = write.slot.key(), ttl = ?write.ttl, "writing snapshot");
            document.insert(
                write.slot.key().to_string(),
                CacheEntry::new(write.snapshot.clone(), now, write.ttl),
            );
        }

        self.save(&document).await
    }
}

#[async_trait]
impl SnapshotStore for CacheManager {
    async fn exists(&self, slot: Slot) -> Result<bool, StoreError> {
        Ok(self.get(slot).await?.is_some())
    }

    async fn get(&self, slot: Slot) -> Result<Option<Snapshot>, StoreError> {
        let document = self.load().await?;
        Ok(self.lookup(&document, slot))
    }

    async fn put(
        &self,
        slot: Slot,
        snapshot: &Snapshot,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.apply(&[SlotWrite {
            slot,
            snapshot: snapshot.clone(),
            ttl,
        }])
        .await
    }

    async fn put_many(&self, writes: &[SlotWrite]) -> Result<(), StoreError> {
        self.apply(writes).await
    }

    async fn get_many(&self, slots: &[Slot]) -> Result<Vec<Option<Snapshot>>, StoreError> {
        let document = self.load().await?;
        Ok(slots
            .iter()
            .map(|slot| self.lookup(&document, *slot))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::ManualClock;
    use serde_json::json;
    use std::fs as std_fs;
    use tempfile::TempDir;

    fn snapshot(deaths: u64) -> Snapshot {
        Snapshot::from_value(json!({"deaths": deaths, "date": "2020-04-01"})).unwrap()
    }

    fn create_test_cache() -> (CacheManager, Arc<ManualClock>, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let clock = Arc::new(ManualClock::new());
        let cache = CacheManager::with_dir(temp_dir.path().to_path_buf()).with_clock(clock.clone());
        (cache, clock, temp_dir)
    }

    #[tokio::test]
    async fn test_put_creates_document_in_cache_directory() {
        let (cache, _clock, temp_dir) = create_test_cache();

        cache
            .put(Slot::Latest, &snapshot(5), None)
            .await
            .expect("Put should succeed");

        let expected_path = temp_dir.path().join("snapshots.json");
        assert!(expected_path.exists(), "Document should exist");

        let content = std_fs::read_to_string(&expected_path).expect("Should read file");
        assert!(content.contains("\"stats_latest\""));
        assert!(content.contains("\"deaths\""));
        assert!(!content.contains("expires_at"), "Latest should carry no expiry");
    }

    #[tokio::test]
    async fn test_get_returns_none_for_missing_document() {
        let (cache, _clock, _temp_dir) = create_test_cache();

        assert_eq!(cache.get(Slot::Latest).await, Ok(None));
        assert_eq!(cache.exists(Slot::Previous).await, Ok(false));
    }

    #[tokio::test]
    async fn test_get_returns_stored_snapshot() {
        let (cache, _clock, _temp_dir) = create_test_cache();

        cache.put(Slot::Latest, &snapshot(5), None).await.unwrap();

        assert_eq!(cache.get(Slot::Latest).await, Ok(Some(snapshot(5))));
        assert_eq!(cache.exists(Slot::Latest).await, Ok(true));
        assert_eq!(cache.get(Slot::Previous).await, Ok(None));
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_absent() {
        let (cache, clock, _temp_dir) = create_test_cache();
        let ttl = Duration::from_secs(10 * 3600);

        cache.put(Slot::Previous, &snapshot(4), Some(ttl)).await.unwrap();

        clock.advance(Duration::from_secs(10 * 3600 - 1));
        assert_eq!(cache.get(Slot::Previous).await, Ok(Some(snapshot(4))));

        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.get(Slot::Previous).await, Ok(None));
        assert_eq!(cache.exists(Slot::Previous).await, Ok(false));
    }

    #[tokio::test]
    async fn test_put_resets_ttl() {
        let (cache, clock, _temp_dir) = create_test_cache();

        cache
            .put(Slot::Latest, &snapshot(1), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        cache.put(Slot::Latest, &snapshot(2), None).await.unwrap();
        clock.advance(Duration::from_secs(3600));

        assert_eq!(cache.get(Slot::Latest).await, Ok(Some(snapshot(2))));
    }

    #[tokio::test]
    async fn test_put_many_writes_all_slots_in_one_document() {
        let (cache, _clock, temp_dir) = create_test_cache();

        cache
            .put_many(&[
                SlotWrite {
                    slot: Slot::Previous,
                    snapshot: snapshot(5),
                    ttl: Some(Duration::from_secs(3600)),
                },
                SlotWrite {
                    slot: Slot::Latest,
                    snapshot: snapshot(6),
                    ttl: None,
                },
            ])
            .await
            .unwrap();

        let values = cache.get_many(&[Slot::Latest, Slot::Previous]).await.unwrap();
        assert_eq!(values, vec![Some(snapshot(6)), Some(snapshot(5))]);

        let leftovers: Vec<_> = std_fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("snapshots.json")]);
    }

    #[tokio::test]
    async fn test_malformed_document_is_an_error_not_absence() {
        let (cache, _clock, temp_dir) = create_test_cache();
        std_fs::write(temp_dir.path().join("snapshots.json"), "{not json").unwrap();

        let result = cache.get(Slot::Latest).await;

        assert!(matches!(result, Err(StoreError::Corrupt(_))));
        assert!(matches!(cache.exists(Slot::Latest).await, Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_unreadable_directory_is_io_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        // A regular file where the directory should be
        let blocker = temp_dir.path().join("blocker");
        std_fs::write(&blocker, "").unwrap();
        let cache = CacheManager::with_dir(blocker.join("nested"));

        let result = cache.put(Slot::Latest, &snapshot(1), None).await;

        assert!(matches!(result, Err(StoreError::Io(_))));
    }

    #[tokio::test]
    async fn test_write_creates_directory_if_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested_path = temp_dir.path().join("nested").join("cache").join("dir");
        let cache = CacheManager::with_dir(nested_path.clone());

        cache.put(Slot::Latest, &snapshot(1), None).await.unwrap();

        assert!(nested_path.join("snapshots.json").exists(), "Document should exist");
    }

    #[tokio::test]
    async fn test_expired_entries_are_pruned_on_write() {
        let (cache, clock, temp_dir) = create_test_cache();

        cache
            .put(Slot::Previous, &snapshot(4), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(120));
        cache.put(Slot::Latest, &snapshot(5), None).await.unwrap();

        let content = std_fs::read_to_string(temp_dir.path().join("snapshots.json")).unwrap();
        assert!(!content.contains("stats_old"));
    }

    #[test]
    fn test_new_creates_xdg_compliant_path() {
        if let Some(cache) = CacheManager::new() {
            let path_str = cache.cache_dir().to_string_lossy();
            assert!(
                path_str.contains("statcache"),
                "Cache path should contain project name"
            );
        }
        // Test passes if new() returns None (e.g., no home directory in CI)
    }
}
