//! Local filesystem storage implementation.
//!
//! Every section partition lives in its own JSON file and is guarded by its
//! own async lock, so sections fetched concurrently never contend while the
//! read-check-insert sequence of a single section stays atomic.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── sections.json                 # Watched section catalog
//! └── sections/
//!     └── {genre}_{listing}.json    # Release history + known ids
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{AppError, Result};
use crate::models::{KnownIdEntry, ReleaseRecord, SectionCatalog, SectionKey, StorageConfig};
use crate::storage::ReleaseStore;

const CATALOG_KEY: &str = "sections.json";

/// One persisted release with its dedup bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRelease {
    sequence_id: u64,
    observed_at: DateTime<Utc>,
    record: ReleaseRecord,
}

/// On-disk form of one section partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SectionHistory {
    section_key: SectionKey,
    seeded_at: DateTime<Utc>,
    next_sequence_id: u64,

    /// Oldest first
    entries: VecDeque<StoredRelease>,

    #[serde(skip)]
    index: HashSet<u64>,
}

impl SectionHistory {
    fn new(section_key: SectionKey, next_sequence_id: u64) -> Self {
        Self {
            section_key,
            seeded_at: Utc::now(),
            next_sequence_id: next_sequence_id.max(1),
            entries: VecDeque::new(),
            index: HashSet::new(),
        }
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .entries
            .iter()
            .map(|e| e.record.external_id)
            .collect();
    }

    /// Append a release unless its id is already known.
    fn push(&mut self, record: &ReleaseRecord, observed_at: DateTime<Utc>) -> bool {
        if !self.index.insert(record.external_id) {
            return false;
        }
        self.entries.push_back(StoredRelease {
            sequence_id: self.next_sequence_id,
            observed_at,
            record: record.clone(),
        });
        self.next_sequence_id += 1;
        true
    }

    /// Drop the oldest entries until `cap` is met, stopping at the first
    /// entry with a sequence id of at least `protected_from`.
    fn evict(&mut self, cap: usize, protected_from: u64) -> usize {
        let mut evicted = 0;
        while self.entries.len() > cap {
            match self.entries.front() {
                Some(front) if front.sequence_id < protected_from => {
                    let id = front.record.external_id;
                    self.entries.pop_front();
                    self.index.remove(&id);
                    evicted += 1;
                }
                _ => break,
            }
        }
        evicted
    }

    fn known_entries(&self) -> Vec<KnownIdEntry> {
        self.entries
            .iter()
            .map(|e| KnownIdEntry {
                section_key: self.section_key,
                external_id: e.record.external_id,
                sequence_id: e.sequence_id,
                observed_at: e.observed_at,
            })
            .collect()
    }
}

/// Cached state of one section partition.
enum SectionState {
    Unloaded,
    Missing,
    Loaded(SectionHistory),
}

impl SectionState {
    fn history(&self) -> Option<&SectionHistory> {
        match self {
            SectionState::Loaded(history) => Some(history),
            _ => None,
        }
    }
}

type SectionSlot = Arc<Mutex<SectionState>>;

/// Local filesystem storage backend.
#[derive(Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
    max_ids_per_section: usize,
    slots: Arc<StdMutex<HashMap<SectionKey, SectionSlot>>>,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>, max_ids_per_section: usize) -> Self {
        Self {
            root_dir: root_dir.into(),
            max_ids_per_section,
            slots: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.root_dir, config.max_ids_per_section)
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    fn section_path(key: SectionKey) -> String {
        format!("sections/{key}.json")
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        write_atomic(&self.path(key), bytes)
            .await
            .map_err(|e| AppError::storage(key, e))
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| AppError::storage(key, e))?;
        self.write_bytes(key, &bytes).await
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        read_json_file(&self.path(key), key).await
    }

    /// Lock a section partition, loading it from disk on first use.
    async fn section(&self, key: SectionKey) -> Result<OwnedMutexGuard<SectionState>> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(SectionState::Unloaded)))
                .clone()
        };

        let mut guard = slot.lock_owned().await;
        if matches!(*guard, SectionState::Unloaded) {
            *guard = match self.read_json::<SectionHistory>(&Self::section_path(key)).await? {
                Some(mut history) => {
                    history.rebuild_index();
                    log::debug!(
                        "Loaded {} known ids for {}",
                        history.entries.len(),
                        key
                    );
                    SectionState::Loaded(history)
                }
                None => SectionState::Missing,
            };
        }
        Ok(guard)
    }
}

/// Write a file by writing a sibling temp file and renaming it over.
pub(super) async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await
}

/// Read a JSON file, returning None if it doesn't exist.
pub(super) async fn read_json_file<T: DeserializeOwned>(
    path: &Path,
    context: &str,
) -> Result<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(AppError::storage(context, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| AppError::storage(context, format!("corrupt file: {e}")))
}

#[async_trait]
impl ReleaseStore for LocalStorage {
    async fn is_seeded(&self, key: SectionKey) -> Result<bool> {
        let guard = self.section(key).await?;
        Ok(guard.history().is_some())
    }

    async fn seed(&self, key: SectionKey, records: &[ReleaseRecord]) -> Result<usize> {
        let mut guard = self.section(key).await?;
        let next = guard.history().map_or(1, |h| h.next_sequence_id);

        let mut history = SectionHistory::new(key, next);
        let now = Utc::now();
        for record in records {
            history.push(record, now);
        }
        history.evict(self.max_ids_per_section, u64::MAX);

        self.write_json(&Self::section_path(key), &history).await?;
        let held = history.entries.len();
        *guard = SectionState::Loaded(history);

        log::info!("Seeded {key} with {held} known ids");
        Ok(held)
    }

    async fn record_new(
        &self,
        key: SectionKey,
        records: &[ReleaseRecord],
    ) -> Result<Vec<ReleaseRecord>> {
        let mut guard = self.section(key).await?;
        let mut history = match guard.history() {
            Some(history) => history.clone(),
            None => SectionHistory::new(key, 1),
        };

        let first_new = history.next_sequence_id;
        let now = Utc::now();
        let inserted: Vec<ReleaseRecord> = records
            .iter()
            .filter(|record| history.push(record, now))
            .cloned()
            .collect();

        if inserted.is_empty() {
            return Ok(inserted);
        }

        let evicted = history.evict(self.max_ids_per_section, first_new);
        if evicted > 0 {
            log::debug!("Evicted {evicted} oldest ids from {key}");
        }
        if history.entries.len() > self.max_ids_per_section {
            log::warn!(
                "{} holds {} ids, above the cap of {} until the next insert",
                key,
                history.entries.len(),
                self.max_ids_per_section
            );
        }

        self.write_json(&Self::section_path(key), &history).await?;
        *guard = SectionState::Loaded(history);
        Ok(inserted)
    }

    async fn find(&self, key: SectionKey, external_id: u64) -> Result<Option<ReleaseRecord>> {
        let guard = self.section(key).await?;
        Ok(guard.history().and_then(|history| {
            if !history.index.contains(&external_id) {
                return None;
            }
            history
                .entries
                .iter()
                .find(|e| e.record.external_id == external_id)
                .map(|e| e.record.clone())
        }))
    }

    async fn entries(&self, key: SectionKey) -> Result<Vec<KnownIdEntry>> {
        let guard = self.section(key).await?;
        Ok(guard
            .history()
            .map(SectionHistory::known_entries)
            .unwrap_or_default())
    }

    async fn save_catalog(&self, catalog: &SectionCatalog) -> Result<()> {
        self.write_json(CATALOG_KEY, catalog).await?;
        log::info!("Saved {} sections to {}", catalog.len(), CATALOG_KEY);
        Ok(())
    }

    async fn load_catalog(&self) -> Result<Option<SectionCatalog>> {
        self.read_json(CATALOG_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Genre, Listing};
    use tempfile::tempdir;

    fn key() -> SectionKey {
        SectionKey::new(Genre::TechnoElectro, Listing::New)
    }

    fn record(id: u64) -> ReleaseRecord {
        ReleaseRecord {
            external_id: id,
            section_key: key(),
            title: format!("Artist - Title {id}"),
            catalog_number: format!("CAT{id} – Label"),
            tracklist: "A1 Track".to_string(),
            price_text: "£9.99".to_string(),
            detail_url: format!("https://example.com/{id}"),
            image_url: format!("https://example.com/{id}.jpg"),
            sample_urls: vec![],
            availability_status: "In Stock".to_string(),
        }
    }

    fn records(ids: &[u64]) -> Vec<ReleaseRecord> {
        ids.iter().copied().map(record).collect()
    }

    fn ids(entries: &[KnownIdEntry]) -> Vec<u64> {
        entries.iter().map(|e| e.external_id).collect()
    }

    #[tokio::test]
    async fn test_unseeded_section() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), 10);

        assert!(!storage.is_seeded(key()).await.unwrap());
        assert!(storage.entries(key()).await.unwrap().is_empty());
        assert!(storage.find(key(), 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_new_returns_only_unknown_ids() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), 10);

        storage.seed(key(), &records(&[101, 102])).await.unwrap();
        let inserted = storage
            .record_new(key(), &records(&[101, 102, 103]))
            .await
            .unwrap();
        assert_eq!(inserted, records(&[103]));

        let entries = storage.entries(key()).await.unwrap();
        assert_eq!(ids(&entries), vec![101, 102, 103]);
        let newest = entries.iter().max_by_key(|e| e.sequence_id).unwrap();
        assert_eq!(newest.external_id, 103);
    }

    #[tokio::test]
    async fn test_record_new_is_idempotent() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), 10);

        let batch = records(&[1, 2, 2, 3]);
        assert_eq!(storage.record_new(key(), &batch).await.unwrap().len(), 3);
        assert!(storage.record_new(key(), &batch).await.unwrap().is_empty());
        assert_eq!(storage.entries(key()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_eviction_keeps_newest() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), 3);

        storage.seed(key(), &records(&[1, 2, 3])).await.unwrap();
        storage.record_new(key(), &records(&[4, 5])).await.unwrap();

        let entries = storage.entries(key()).await.unwrap();
        assert_eq!(ids(&entries), vec![3, 4, 5]);
        assert!(entries.windows(2).all(|w| w[0].sequence_id < w[1].sequence_id));
        assert!(storage.find(key(), 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unchanged_listing_is_never_readmitted_at_minimum_cap() {
        let dir = tempdir().unwrap();
        // Two pages of 25 releases, at the smallest cap a valid config allows.
        let storage = LocalStorage::new(dir.path(), 50);
        let listing = records(&(1..=50).collect::<Vec<_>>());
        storage.seed(key(), &listing).await.unwrap();

        for _ in 0..3 {
            assert!(storage.record_new(key(), &listing).await.unwrap().is_empty());
        }

        let mut next = listing[1..].to_vec();
        next.push(record(51));
        assert_eq!(storage.record_new(key(), &next).await.unwrap(), vec![record(51)]);
        assert!(storage.record_new(key(), &next).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_batch_is_kept_until_next_insert() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), 2);

        storage.seed(key(), &records(&[1, 2])).await.unwrap();
        let inserted = storage.record_new(key(), &records(&[3, 4, 5])).await.unwrap();
        assert_eq!(inserted.len(), 3);
        assert_eq!(ids(&storage.entries(key()).await.unwrap()), vec![3, 4, 5]);

        storage.record_new(key(), &records(&[6])).await.unwrap();
        assert_eq!(ids(&storage.entries(key()).await.unwrap()), vec![5, 6]);
    }

    #[tokio::test]
    async fn test_seed_applies_cap_and_keeps_sequence_increasing() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), 2);

        assert_eq!(storage.seed(key(), &records(&[1, 2, 3])).await.unwrap(), 2);
        let before = storage.entries(key()).await.unwrap();
        assert_eq!(ids(&before), vec![2, 3]);

        storage.seed(key(), &records(&[7])).await.unwrap();
        let after = storage.entries(key()).await.unwrap();
        assert_eq!(ids(&after), vec![7]);
        assert!(after[0].sequence_id > before[1].sequence_id);
    }

    #[tokio::test]
    async fn test_history_survives_restart() {
        let dir = tempdir().unwrap();
        {
            let storage = LocalStorage::new(dir.path(), 10);
            storage.seed(key(), &records(&[10, 11])).await.unwrap();
        }

        let storage = LocalStorage::new(dir.path(), 10);
        assert!(storage.is_seeded(key()).await.unwrap());
        assert_eq!(storage.find(key(), 11).await.unwrap(), Some(record(11)));
        assert!(
            storage
                .record_new(key(), &records(&[10, 11]))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_concurrent_inserts_announce_once() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), 10);
        let batch = records(&[42]);

        let (a, b) = tokio::join!(
            storage.record_new(key(), &batch),
            storage.record_new(key(), &batch)
        );
        assert_eq!(a.unwrap().len() + b.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_history_is_fatal() {
        let dir = tempdir().unwrap();
        let sections = dir.path().join("sections");
        std::fs::create_dir_all(&sections).unwrap();
        std::fs::write(sections.join(format!("{}.json", key())), b"{ not json").unwrap();

        let storage = LocalStorage::new(dir.path(), 10);
        let err = storage.is_seeded(key()).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_catalog_round_trip() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), 10);
        assert!(storage.load_catalog().await.unwrap().is_none());

        let catalog = SectionCatalog::discover(&Default::default());
        storage.save_catalog(&catalog).await.unwrap();

        let loaded = storage.load_catalog().await.unwrap().unwrap();
        assert_eq!(loaded.sections, catalog.sections);
    }
}
