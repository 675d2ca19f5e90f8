//! Legacy Migration Module
//!
//! One-time import of the deprecated single-blob cache format into per-entry
//! records. Guarded by a persisted flag; the blob is deleted unconditionally
//! after the single attempt so a partially corrupt blob can never cause a
//! retry loop.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::codec::Codec;
use crate::config::Config;
use crate::error::Result;
use crate::key::QueryKey;
use crate::live::QueryState;
use crate::store::{
    current_timestamp_ms, CacheEntry, EntryStore, StorageMedium, LEGACY_BLOB_KEY,
    MIGRATION_FLAG_KEY,
};

// == Legacy Blob ==
/// The deprecated format: every cached query in one serialized record.
#[derive(Debug, Deserialize)]
struct LegacyBlob {
    /// When the blob was written, Unix milliseconds
    timestamp: u64,
    /// Version tag of the writer
    #[serde(default)]
    buster: String,
    /// Embedded cached queries. Kept as raw values so one malformed row
    /// is skipped on its own instead of failing the whole blob.
    queries: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct LegacyQuery {
    key: QueryKey,
    /// Hash as recorded by the old writer. Ignored: the hash is recomputed
    /// from the key so a hand-edited blob cannot desynchronize the two.
    #[serde(default)]
    #[allow(dead_code)]
    key_hash: Option<String>,
    state: QueryState,
}

// == Legacy Migrator ==
/// Converts the legacy blob into entry store records, exactly once.
#[derive(Debug)]
pub struct LegacyMigrator {
    medium: Arc<dyn StorageMedium>,
    codec: Codec,
    max_age_ms: u64,
    excluded_prefixes: Vec<String>,
}

impl LegacyMigrator {
    // == Constructor ==
    /// Creates a migrator over the same medium the entry store uses.
    pub fn new(medium: Arc<dyn StorageMedium>, codec: Codec, config: &Config) -> Self {
        Self {
            medium,
            codec,
            max_age_ms: config.max_legacy_age_ms,
            excluded_prefixes: config.excluded_prefixes.clone(),
        }
    }

    // == Migrate ==
    /// Runs the migration if it has never completed before.
    ///
    /// Safe to call on every startup. Once the persisted flag is set the
    /// call is an immediate no-op; until then the blob gets exactly one
    /// attempt, after which it is deleted and the flag set regardless of
    /// how many entries survived.
    ///
    /// # Returns
    /// The number of entries successfully migrated.
    pub async fn migrate(&self, store: &mut EntryStore) -> usize {
        if self.flag_is_set().await {
            return 0;
        }

        let raw = match self.medium.get(LEGACY_BLOB_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                // Nothing to migrate; remember that so we never look again.
                self.set_flag().await;
                return 0;
            }
            Err(e) => {
                // Unknown state: leave the flag unset so the next startup
                // retries against an intact blob.
                warn!("could not read legacy cache blob: {e}");
                return 0;
            }
        };

        let migrated = match self.parse_blob(&raw) {
            None => {
                warn!("legacy cache blob is corrupt, discarding without migrating");
                0
            }
            Some(blob) => {
                debug!(buster = %blob.buster, queries = blob.queries.len(), "parsed legacy blob");
                let age_ms = current_timestamp_ms().saturating_sub(blob.timestamp);
                if age_ms > self.max_age_ms {
                    info!(age_ms, "legacy cache blob is stale, discarding");
                    0
                } else {
                    self.import_entries(store, blob).await
                }
            }
        };

        // Unconditional cleanup: one attempt per blob, success or not.
        if let Err(e) = self.medium.delete(LEGACY_BLOB_KEY).await {
            warn!("failed to delete legacy cache blob: {e}");
        }
        self.set_flag().await;

        info!(migrated, "legacy cache migration finished");
        migrated
    }

    /// Imports each embedded query, skipping excluded categories and logging
    /// per-entry failures without aborting the batch.
    async fn import_entries(&self, store: &mut EntryStore, blob: LegacyBlob) -> usize {
        let mut migrated = 0;
        for raw_query in blob.queries {
            let query: LegacyQuery = match serde_json::from_value(raw_query) {
                Ok(query) => query,
                Err(e) => {
                    warn!("skipping unparseable legacy entry: {e}");
                    continue;
                }
            };
            if query.key.matches_any(&self.excluded_prefixes) {
                debug!(key = %query.key.repr(), "skipping excluded legacy entry");
                continue;
            }
            let entry = match CacheEntry::from_state(&query.key, &query.state, self.codec) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(key = %query.key.repr(), "failed to encode legacy entry: {e}");
                    continue;
                }
            };
            match store.put(entry).await {
                Ok(()) => migrated += 1,
                Err(e) => warn!(key = %query.key.repr(), "failed to store legacy entry: {e}"),
            }
        }
        migrated
    }

    /// Decompress-then-parse, falling back to parsing the raw bytes for
    /// blobs written before compression was introduced.
    fn parse_blob(&self, raw: &[u8]) -> Option<LegacyBlob> {
        if let Some(text) = self.codec.decompress(raw) {
            if let Ok(blob) = serde_json::from_str(&text) {
                return Some(blob);
            }
        }
        serde_json::from_slice(raw).ok()
    }

    // == Flag Handling ==
    async fn flag_is_set(&self) -> bool {
        matches!(self.medium.get(MIGRATION_FLAG_KEY).await, Ok(Some(_)))
    }

    async fn set_flag(&self) {
        if let Err(e) = self.medium.set(MIGRATION_FLAG_KEY, b"true").await {
            warn!("failed to persist migration flag: {e}");
        }
    }

    /// Clears the migration flag so `migrate` runs again. Diagnostic only.
    pub async fn clear_flag(&self) -> Result<()> {
        self.medium.delete(MIGRATION_FLAG_KEY).await
    }
}
