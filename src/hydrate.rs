//! Hydration Module
//!
//! Restores persisted entries into the live in-memory cache at startup.
//! A small curated set of critical categories is loaded synchronously so
//! first paint has its data; everything else streams in from a background
//! task that never blocks the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::codec::Codec;
use crate::config::Config;
use crate::key::QueryKey;
use crate::live::LiveCache;
use crate::store::{EntrySnapshot, EntryStore};

// == Hydration Manager ==
/// Two-phase startup restore into the live cache.
#[derive(Debug)]
pub struct HydrationManager {
    store: Arc<RwLock<EntryStore>>,
    codec: Codec,
    critical_prefixes: Vec<String>,
    complete: Arc<AtomicBool>,
}

impl HydrationManager {
    // == Constructor ==
    pub fn new(store: Arc<RwLock<EntryStore>>, codec: Codec, config: &Config) -> Self {
        Self {
            store,
            codec,
            critical_prefixes: config.critical_prefixes.clone(),
            complete: Arc::new(AtomicBool::new(false)),
        }
    }

    // == Hydrate ==
    /// Restores the store into `live`. Call once at startup.
    ///
    /// Blocks only for Phase A: entries whose key category is in the
    /// configured critical set are injected before this returns. The
    /// returned handle is the Phase B background task restoring the
    /// remainder; abort it on shutdown if it is still running.
    ///
    /// Entries stream in oldest-accessed first, so the access-time bumps the
    /// restore itself causes preserve the store's relative eviction order.
    pub async fn hydrate(&self, live: &LiveCache) -> JoinHandle<()> {
        let snapshot = self.store.read().await.snapshot_by_access();

        let mut critical = Vec::new();
        let mut remainder = Vec::new();
        for row in snapshot {
            match QueryKey::from_repr(&row.key_repr) {
                Some(key) if key.matches_any(&self.critical_prefixes) => {
                    critical.push((key, row))
                }
                Some(key) => remainder.push((key, row)),
                None => debug!(key_hash = %row.key_hash, "skipping entry with unreadable key"),
            }
        }

        // Phase A: block on the curated first-paint set.
        let critical_count = critical.len();
        for (key, row) in critical {
            inject_row(&self.store, self.codec, live, key, &row).await;
        }
        info!(
            critical = critical_count,
            background = remainder.len(),
            "critical cache entries restored, continuing in background"
        );

        // Phase B: everything else, off the startup path.
        let store = Arc::clone(&self.store);
        let codec = self.codec;
        let live = live.clone();
        let complete = Arc::clone(&self.complete);
        tokio::spawn(async move {
            for (key, row) in remainder {
                inject_row(&store, codec, &live, key, &row).await;
            }
            complete.store(true, Ordering::SeqCst);
            info!("cache hydration complete");
        })
    }

    // == Is Complete ==
    /// Whether the background phase has finished.
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::SeqCst)
    }
}

/// Loads one entry and seeds it into the live cache.
///
/// Failures are per-entry: a corrupt or undecodable record is skipped and
/// the restore moves on.
async fn inject_row(
    store: &Arc<RwLock<EntryStore>>,
    codec: Codec,
    live: &LiveCache,
    key: QueryKey,
    row: &EntrySnapshot,
) {
    let entry = {
        let mut store = store.write().await;
        store.get(&row.key_hash).await
    };
    let Some(entry) = entry else {
        debug!(key = %row.key_repr, "entry vanished before hydration");
        return;
    };
    match entry.decode_state(codec) {
        Some(state) => live.inject(key, state).await,
        None => debug!(key = %row.key_repr, "dropping undecodable entry"),
    }
}
