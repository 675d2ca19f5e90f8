//! Persistence Subscriber Module
//!
//! Mirrors live cache mutations into the entry store. A single drain task
//! consumes the mutation broadcast, coalesces bursts per key (only the
//! latest state for a key needs to land), filters out volatile categories,
//! and enforces the eviction budget after every write. Because one task
//! performs every write, writes to the same key apply in issue order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec::Codec;
use crate::config::Config;
use crate::live::{CacheEvent, LiveCache};
use crate::store::{CacheEntry, EntryStore, EvictionPolicy};

// == Subscriber Handle ==
/// Handle to a running persistence task. `detach` stops all further writes;
/// dropping the handle does not.
#[derive(Debug)]
pub struct SubscriberHandle {
    task: JoinHandle<()>,
}

impl SubscriberHandle {
    /// Stops the drain task. Used on logout.
    pub fn detach(self) {
        self.task.abort();
    }

    /// Whether the drain task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

// == Persistence Subscriber ==
/// Attaches the entry store to a live cache's mutation stream.
#[derive(Debug)]
pub struct PersistenceSubscriber {
    store: Arc<RwLock<EntryStore>>,
    codec: Codec,
    policy: EvictionPolicy,
    excluded_prefixes: Vec<String>,
    pending_writes: Arc<AtomicUsize>,
}

impl PersistenceSubscriber {
    // == Constructor ==
    pub fn new(store: Arc<RwLock<EntryStore>>, codec: Codec, config: &Config) -> Self {
        Self {
            store,
            codec,
            policy: EvictionPolicy::from_config(config),
            excluded_prefixes: config.excluded_prefixes.clone(),
            pending_writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Gauge of writes accepted but not yet landed, for the stats surface.
    pub fn pending_writes(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.pending_writes)
    }

    // == Attach ==
    /// Subscribes to the live cache and spawns the drain task.
    pub fn attach(&self, live: &LiveCache) -> SubscriberHandle {
        let mut rx = live.subscribe();
        let store = Arc::clone(&self.store);
        let codec = self.codec;
        let policy = self.policy.clone();
        let excluded = self.excluded_prefixes.clone();
        let gauge = Arc::clone(&self.pending_writes);

        let task = tokio::spawn(async move {
            info!("persistence subscriber attached");
            let mut pending: HashMap<String, CacheEvent> = HashMap::new();

            loop {
                // Block for the next mutation.
                match rx.recv().await {
                    Ok(event) => queue_event(&mut pending, event, &excluded),
                    Err(RecvError::Lagged(missed)) => {
                        // Durability forfeited for the missed events only;
                        // fall through so anything already queued still lands.
                        warn!(missed, "mutation stream lagged, some writes were dropped");
                    }
                    Err(RecvError::Closed) => break,
                }

                // Coalesce the rest of the burst: later states for a key
                // replace earlier ones before anything is written.
                loop {
                    match rx.try_recv() {
                        Ok(event) => queue_event(&mut pending, event, &excluded),
                        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                        Err(TryRecvError::Lagged(missed)) => {
                            warn!(missed, "mutation stream lagged, some writes were dropped");
                        }
                    }
                }

                gauge.store(pending.len(), Ordering::SeqCst);
                for (_, event) in pending.drain() {
                    persist_event(&store, codec, &policy, event).await;
                    gauge.fetch_sub(1, Ordering::SeqCst);
                }
            }
            info!("persistence subscriber detached, mutation stream closed");
        });

        SubscriberHandle { task }
    }
}

/// Adds an event to the pending map unless its category is excluded.
fn queue_event(
    pending: &mut HashMap<String, CacheEvent>,
    event: CacheEvent,
    excluded: &[String],
) {
    if event.key.matches_any(excluded) {
        debug!(key = %event.key.repr(), "skipping volatile category");
        return;
    }
    pending.insert(event.key.hash(), event);
}

/// Writes one coalesced state and enforces the budget. Best-effort: a failed
/// write is logged and forfeits durability for that entry only.
async fn persist_event(
    store: &Arc<RwLock<EntryStore>>,
    codec: Codec,
    policy: &EvictionPolicy,
    event: CacheEvent,
) {
    let entry = match CacheEntry::from_state(&event.key, &event.state, codec) {
        Ok(entry) => entry,
        Err(e) => {
            warn!(key = %event.key.repr(), "could not encode state for persistence: {e}");
            return;
        }
    };

    let mut store = store.write().await;
    if let Err(e) = store.put(entry).await {
        warn!(key = %event.key.repr(), "persist failed: {e}");
        return;
    }
    policy.enforce(&mut store).await;
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::QueryKey;
    use crate::live::QueryState;
    use crate::store::{MemoryMedium, StorageMedium};
    use serde_json::json;
    use std::time::Duration;

    async fn shared_store() -> Arc<RwLock<EntryStore>> {
        let medium = Arc::new(MemoryMedium::new());
        Arc::new(RwLock::new(
            EntryStore::open(medium as Arc<dyn StorageMedium>).await,
        ))
    }

    /// Polls until `check` passes or two seconds elapse.
    async fn wait_until<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within timeout");
    }

    #[tokio::test]
    async fn test_mutation_is_persisted() {
        let store = shared_store().await;
        let subscriber =
            PersistenceSubscriber::new(Arc::clone(&store), Codec::Deflate, &Config::default());
        let live = LiveCache::new();
        let handle = subscriber.attach(&live);

        let key = QueryKey::new(["documents", "a"]);
        live.set(key.clone(), QueryState::new(json!({"v": 1}), 10)).await;

        let hash = key.hash();
        wait_until(|| {
            let store = Arc::clone(&store);
            let hash = hash.clone();
            async move { store.read().await.contains(&hash) }
        })
        .await;

        let entry = store.write().await.get(&hash).await.unwrap();
        let state = entry.decode_state(Codec::Deflate).unwrap();
        assert_eq!(state.data, json!({"v": 1}));
        assert_eq!(entry.produced_at, 10);
        handle.detach();
    }

    #[tokio::test]
    async fn test_excluded_category_never_persisted() {
        let store = shared_store().await;
        let mut config = Config::default();
        config.excluded_prefixes = vec!["presence".to_string()];
        let subscriber = PersistenceSubscriber::new(Arc::clone(&store), Codec::Deflate, &config);
        let live = LiveCache::new();
        let handle = subscriber.attach(&live);

        let excluded = QueryKey::new(["presence", "user-7"]);
        let kept = QueryKey::new(["documents", "a"]);
        live.set(excluded.clone(), QueryState::new(json!("online"), 1)).await;
        live.set(kept.clone(), QueryState::new(json!("doc"), 2)).await;

        // Once the later mutation lands, the excluded one has had every
        // chance to land too.
        wait_until(|| {
            let store = Arc::clone(&store);
            let hash = kept.hash();
            async move { store.read().await.contains(&hash) }
        })
        .await;

        assert!(!store.read().await.contains(&excluded.hash()));
        handle.detach();
    }

    #[tokio::test]
    async fn test_rapid_updates_keep_latest_state() {
        let store = shared_store().await;
        let subscriber =
            PersistenceSubscriber::new(Arc::clone(&store), Codec::Deflate, &Config::default());
        let live = LiveCache::new();
        let handle = subscriber.attach(&live);

        let key = QueryKey::new(["documents", "a"]);
        for version in 1..=25u64 {
            live.set(key.clone(), QueryState::new(json!(version), version)).await;
        }

        let hash = key.hash();
        wait_until(|| {
            let store = Arc::clone(&store);
            let hash = hash.clone();
            async move {
                let mut store = store.write().await;
                match store.get(&hash).await {
                    Some(entry) => entry.produced_at == 25,
                    None => false,
                }
            }
        })
        .await;

        let entry = store.write().await.get(&hash).await.unwrap();
        assert_eq!(entry.decode_state(Codec::Deflate).unwrap().data, json!(25));
        handle.detach();
    }

    #[tokio::test]
    async fn test_budget_enforced_after_writes() {
        let store = shared_store().await;
        let mut config = Config::default();
        config.max_entries = 2;
        let subscriber = PersistenceSubscriber::new(Arc::clone(&store), Codec::Deflate, &config);
        let live = LiveCache::new();
        let handle = subscriber.attach(&live);

        for name in ["a", "b", "c", "d"] {
            live.set(
                QueryKey::new(["documents", name]),
                QueryState::new(json!(name), 1),
            )
            .await;
            // Space the bursts out so each write triggers an enforce pass.
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        wait_until(|| {
            let store = Arc::clone(&store);
            async move { store.read().await.totals().0 == 2 }
        })
        .await;
        handle.detach();
    }

    #[tokio::test]
    async fn test_detach_stops_writes() {
        let store = shared_store().await;
        let subscriber =
            PersistenceSubscriber::new(Arc::clone(&store), Codec::Deflate, &Config::default());
        let live = LiveCache::new();
        let handle = subscriber.attach(&live);
        handle.detach();

        // Give the abort a moment to land, then mutate.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let key = QueryKey::new(["documents", "late"]);
        live.set(key.clone(), QueryState::new(json!(1), 1)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!store.read().await.contains(&key.hash()));
    }
}
