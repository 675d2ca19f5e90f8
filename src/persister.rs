//! Persister Module
//!
//! Facade owning the persistence subsystem: opens the entry store, runs the
//! one-time legacy migration, performs two-phase hydration, and attaches the
//! persistence subscriber. The embedding application keeps one of these for
//! the lifetime of a session.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

use crate::codec::Codec;
use crate::config::Config;
use crate::error::Result;
use crate::hydrate::HydrationManager;
use crate::live::LiveCache;
use crate::migrate::LegacyMigrator;
use crate::store::{EntryStore, EvictionPolicy, StorageMedium};
use crate::subscriber::{PersistenceSubscriber, SubscriberHandle};

// == Cache Stats ==
/// Debug/observability snapshot of the persistence subsystem.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Entries currently stored
    pub entry_count: usize,
    /// Total pre-compression size of all stored entries
    pub total_size_bytes: u64,
    /// Writes accepted from the mutation stream but not yet landed
    pub pending_write_count: usize,
}

// == Query Persister ==
/// The persistent query-result cache.
#[derive(Debug)]
pub struct QueryPersister {
    store: Arc<RwLock<EntryStore>>,
    policy: EvictionPolicy,
    migrator: LegacyMigrator,
    hydration: HydrationManager,
    subscriber: PersistenceSubscriber,
    hydration_task: Mutex<Option<JoinHandle<()>>>,
}

impl QueryPersister {
    // == Open ==
    /// Opens the persister over a storage medium.
    ///
    /// Builds the store index by scanning the medium; nothing is migrated,
    /// hydrated or subscribed until `start`.
    pub async fn open(medium: Arc<dyn StorageMedium>, config: Config) -> Self {
        let codec = Codec::default();
        let store = Arc::new(RwLock::new(EntryStore::open(Arc::clone(&medium)).await));

        Self {
            policy: EvictionPolicy::from_config(&config),
            migrator: LegacyMigrator::new(medium, codec, &config),
            hydration: HydrationManager::new(Arc::clone(&store), codec, &config),
            subscriber: PersistenceSubscriber::new(Arc::clone(&store), codec, &config),
            store,
            hydration_task: Mutex::new(None),
        }
    }

    // == Start ==
    /// Runs the startup sequence against a live cache. Call once per session.
    ///
    /// 1. Legacy migration (no-op after its first completion ever)
    /// 2. Budget enforcement over whatever migration brought in
    /// 3. Hydration Phase A (blocking) and Phase B (background)
    /// 4. Persistence subscriber attach
    ///
    /// # Returns
    /// The subscriber handle; `detach` it on logout to stop all writes.
    pub async fn start(&self, live: &LiveCache) -> SubscriberHandle {
        {
            let mut store = self.store.write().await;
            let migrated = self.migrator.migrate(&mut store).await;
            if migrated > 0 {
                let evicted = self.policy.enforce(&mut store).await;
                info!(migrated, evicted, "legacy entries imported");
            }
        }

        let task = self.hydration.hydrate(live).await;
        *self.hydration_task.lock().await = Some(task);

        self.subscriber.attach(live)
    }

    // == Stats ==
    /// Current entry count, total logical size and pending write count.
    pub async fn stats(&self) -> CacheStats {
        let (entry_count, total_size_bytes) = self.store.read().await.totals();
        CacheStats {
            entry_count,
            total_size_bytes,
            pending_write_count: self.subscriber.pending_writes().load(Ordering::SeqCst),
        }
    }

    // == Force Migration ==
    /// Clears the migration flag and re-runs migration. Diagnostic only;
    /// normal startups must rely on `start`.
    pub async fn force_migration(&self) -> usize {
        if let Err(e) = self.migrator.clear_flag().await {
            tracing::warn!("could not clear migration flag: {e}");
            return 0;
        }
        let mut store = self.store.write().await;
        self.migrator.migrate(&mut store).await
    }

    // == Clear All ==
    /// Empties the entry store. Failures are reported upward so a
    /// user-triggered reset can be flagged as incomplete.
    pub async fn clear_all(&self) -> Result<()> {
        self.store.write().await.clear_all().await
    }

    // == Hydration Queries ==
    /// Whether background hydration has finished.
    pub fn is_hydration_complete(&self) -> bool {
        self.hydration.is_complete()
    }

    /// Waits for background hydration to settle. Gate for best-effort
    /// consumers like a cache-stats debug panel.
    pub async fn wait_for_hydration(&self) {
        let task = self.hydration_task.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Shared handle to the entry store, for direct reads in tests and
    /// diagnostics tooling.
    pub fn store(&self) -> Arc<RwLock<EntryStore>> {
        Arc::clone(&self.store)
    }
}
