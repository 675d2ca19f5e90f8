//! Entry Store Module
//!
//! Durable per-entry table over the storage medium, combining on-disk records
//! with an in-memory metadata index and O(1) running size/count totals.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::store::{current_timestamp_ms, CacheEntry, StorageMedium, ENTRY_KEY_PREFIX};

// == Entry Metadata ==
/// In-memory index row for one stored entry. Payloads stay on the medium;
/// the index is what makes totals and eviction ordering O(1)-cheap.
#[derive(Debug, Clone)]
struct EntryMeta {
    key_repr: String,
    accessed_at: u64,
    size_bytes: u64,
}

// == Entry Snapshot ==
/// One row of a store listing: enough to order, evict or hydrate an entry
/// without holding its payload.
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
    pub key_hash: String,
    pub key_repr: String,
    pub accessed_at: u64,
    pub size_bytes: u64,
}

// == Entry Store ==
/// Durable entry table with upsert semantics and access-time tracking.
///
/// Exclusively owns all entry records and the running totals; the hydration
/// manager and persistence subscriber interact only through these methods.
#[derive(Debug)]
pub struct EntryStore {
    medium: Arc<dyn StorageMedium>,
    index: HashMap<String, EntryMeta>,
    total_size: u64,
    /// Store-wide monotonic access stamp, seeded from wall-clock milliseconds.
    ///
    /// Every touch takes `now.max(last + 1)`, so stamps strictly increase
    /// across all operations and LRU order equals operation order.
    last_stamp: u64,
}

impl EntryStore {
    // == Open ==
    /// Opens the store over a medium, building the index by full scan.
    ///
    /// Corrupt records are deleted and skipped; a failing medium yields an
    /// empty store rather than an error, since persistence is best-effort.
    pub async fn open(medium: Arc<dyn StorageMedium>) -> Self {
        let mut store = Self {
            medium,
            index: HashMap::new(),
            total_size: 0,
            last_stamp: current_timestamp_ms(),
        };
        store.rebuild_index().await;
        store
    }

    /// Rescans the medium, replacing index and totals with ground truth.
    async fn rebuild_index(&mut self) {
        self.index.clear();
        self.total_size = 0;

        let keys = match self.medium.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("entry scan failed, starting with an empty index: {e}");
                return;
            }
        };

        for storage_key in keys {
            let Some(key_hash) = storage_key.strip_prefix(ENTRY_KEY_PREFIX) else {
                continue;
            };
            match self.read_record(&storage_key).await {
                Ok(Some(entry)) => {
                    self.last_stamp = self.last_stamp.max(entry.accessed_at);
                    self.total_size += entry.size_bytes;
                    self.index.insert(
                        key_hash.to_string(),
                        EntryMeta {
                            key_repr: entry.key_repr,
                            accessed_at: entry.accessed_at,
                            size_bytes: entry.size_bytes,
                        },
                    );
                }
                Ok(None) => {}
                Err(StoreError::Decode(e)) => {
                    warn!("dropping corrupt entry record {storage_key}: {e}");
                    if let Err(e) = self.medium.delete(&storage_key).await {
                        warn!("failed to delete corrupt record {storage_key}: {e}");
                    }
                }
                Err(e) => {
                    warn!("skipping unreadable entry record {storage_key}: {e}");
                }
            }
        }

        debug!(
            entries = self.index.len(),
            total_size = self.total_size,
            "entry index built"
        );
    }

    async fn read_record(&self, storage_key: &str) -> Result<Option<CacheEntry>> {
        let Some(bytes) = self.medium.get(storage_key).await? else {
            return Ok(None);
        };
        let entry =
            bincode::deserialize(&bytes).map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(Some(entry))
    }

    async fn write_record(&self, entry: &CacheEntry) -> Result<()> {
        let bytes = bincode::serialize(entry).map_err(|e| StoreError::Encode(e.to_string()))?;
        self.medium
            .set(&format!("{ENTRY_KEY_PREFIX}{}", entry.key_hash), &bytes)
            .await
    }

    /// Issues the next access stamp, strictly greater than every prior one.
    fn next_stamp(&mut self) -> u64 {
        self.last_stamp = current_timestamp_ms().max(self.last_stamp + 1);
        self.last_stamp
    }

    // == Put ==
    /// Upserts an entry by its key hash.
    ///
    /// Totals are adjusted by delta (the old entry's size is subtracted when
    /// replacing). On a medium failure the in-memory state is left untouched
    /// and the entry simply forfeits durability.
    pub async fn put(&mut self, mut entry: CacheEntry) -> Result<()> {
        entry.accessed_at = self.next_stamp();
        self.write_record(&entry).await?;

        let size_bytes = entry.size_bytes;
        let meta = EntryMeta {
            key_repr: entry.key_repr,
            accessed_at: entry.accessed_at,
            size_bytes,
        };
        match self.index.insert(entry.key_hash, meta) {
            Some(old) => match self.total_size.checked_sub(old.size_bytes) {
                Some(remaining) => self.total_size = remaining + size_bytes,
                None => {
                    warn!("size totals drifted below zero, recounting from medium");
                    self.recount().await;
                }
            },
            None => self.total_size += size_bytes,
        }
        Ok(())
    }

    // == Get ==
    /// Reads an entry by key hash, touching its access time.
    ///
    /// Every failure mode degrades to `None`: medium errors are logged,
    /// corrupt records are deleted, and an index row whose record vanished
    /// is dropped. The touch rewrite is best-effort; a failed rewrite only
    /// loses the updated access time on disk.
    pub async fn get(&mut self, key_hash: &str) -> Option<CacheEntry> {
        if !self.index.contains_key(key_hash) {
            return None;
        }

        let storage_key = format!("{ENTRY_KEY_PREFIX}{key_hash}");
        let mut entry = match self.read_record(&storage_key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                warn!("index row without a record, dropping {key_hash}");
                self.forget(key_hash).await;
                return None;
            }
            Err(StoreError::Decode(e)) => {
                warn!("dropping corrupt entry {key_hash}: {e}");
                if let Err(e) = self.medium.delete(&storage_key).await {
                    warn!("failed to delete corrupt record {storage_key}: {e}");
                }
                self.forget(key_hash).await;
                return None;
            }
            Err(e) => {
                warn!("read failed for {key_hash}: {e}");
                return None;
            }
        };

        entry.accessed_at = self.next_stamp();
        if let Err(e) = self.write_record(&entry).await {
            warn!("access-time rewrite failed for {key_hash}: {e}");
        }
        if let Some(meta) = self.index.get_mut(key_hash) {
            meta.accessed_at = entry.accessed_at;
        }
        Some(entry)
    }

    // == Delete ==
    /// Removes an entry and decrements totals; an absent key is a no-op.
    pub async fn delete(&mut self, key_hash: &str) -> Result<()> {
        if !self.index.contains_key(key_hash) {
            return Ok(());
        }
        self.medium
            .delete(&format!("{ENTRY_KEY_PREFIX}{key_hash}"))
            .await?;
        self.forget(key_hash).await;
        Ok(())
    }

    /// Drops an index row and its size from the totals.
    async fn forget(&mut self, key_hash: &str) {
        if let Some(old) = self.index.remove(key_hash) {
            self.subtract_size(old.size_bytes).await;
        }
    }

    /// Subtracts from the running size total, recounting on detected drift.
    async fn subtract_size(&mut self, size: u64) {
        match self.total_size.checked_sub(size) {
            Some(remaining) => self.total_size = remaining,
            None => {
                warn!("size totals drifted below zero, recounting from medium");
                self.recount().await;
            }
        }
    }

    // == Clear All ==
    /// Empties the store and resets totals. Used on logout/reset.
    ///
    /// Unlike the rest of the store this propagates failures, so a
    /// user-triggered reset can be reported as incomplete.
    pub async fn clear_all(&mut self) -> Result<()> {
        let hashes: Vec<String> = self.index.keys().cloned().collect();
        for key_hash in hashes {
            self.medium
                .delete(&format!("{ENTRY_KEY_PREFIX}{key_hash}"))
                .await?;
            self.forget(&key_hash).await;
        }
        Ok(())
    }

    // == Snapshot ==
    /// Lists all entries ordered by access time ascending, oldest first.
    ///
    /// Ties are broken by key hash for determinism. Each call produces a
    /// fresh, independently ordered snapshot.
    pub fn snapshot_by_access(&self) -> Vec<EntrySnapshot> {
        let mut rows: Vec<EntrySnapshot> = self
            .index
            .iter()
            .map(|(key_hash, meta)| EntrySnapshot {
                key_hash: key_hash.clone(),
                key_repr: meta.key_repr.clone(),
                accessed_at: meta.accessed_at,
                size_bytes: meta.size_bytes,
            })
            .collect();
        rows.sort_by(|a, b| {
            a.accessed_at
                .cmp(&b.accessed_at)
                .then_with(|| a.key_hash.cmp(&b.key_hash))
        });
        rows
    }

    // == Totals ==
    /// O(1) read of the running (entry count, total logical size) counters.
    pub fn totals(&self) -> (usize, u64) {
        (self.index.len(), self.total_size)
    }

    // == Recount ==
    /// Full-scan self-heal: rebuilds index and totals from the medium.
    pub async fn recount(&mut self) {
        self.rebuild_index().await;
    }

    /// Whether an entry exists for the given key hash.
    pub fn contains(&self, key_hash: &str) -> bool {
        self.index.contains_key(key_hash)
    }
}
