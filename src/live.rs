//! Live Cache Module
//!
//! In-memory reactive query cache collaborator. This is the interface
//! boundary of the persistence subsystem: it holds the query states the UI
//! reads, broadcasts every mutation on a channel, and accepts seeded entries
//! during startup hydration. It performs no query execution and no refetch
//! scheduling.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use crate::key::QueryKey;

/// Buffered mutation events per subscriber before a slow consumer lags.
const EVENT_BUFFER: usize = 256;

// == Query State ==
/// Result of one query: the fetched data plus its freshness metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryState {
    /// Deserialized result payload
    pub data: serde_json::Value,
    /// When the underlying data was last fetched, Unix milliseconds
    pub updated_at: u64,
}

impl QueryState {
    /// Creates a state carrying `data` fetched at `updated_at`.
    pub fn new(data: serde_json::Value, updated_at: u64) -> Self {
        Self { data, updated_at }
    }
}

// == Cache Event ==
/// One mutation of the live cache: the affected key and its new state.
#[derive(Debug, Clone)]
pub struct CacheEvent {
    pub key: QueryKey,
    pub state: QueryState,
}

// == Live Cache ==
/// Shared in-memory query cache with a mutation broadcast channel.
#[derive(Debug, Clone)]
pub struct LiveCache {
    entries: Arc<RwLock<HashMap<String, LiveEntry>>>,
    events: broadcast::Sender<CacheEvent>,
}

#[derive(Debug)]
struct LiveEntry {
    key: QueryKey,
    state: QueryState,
}

impl LiveCache {
    // == Constructor ==
    /// Creates an empty live cache.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    // == Set ==
    /// Stores a query state and notifies subscribers.
    ///
    /// This is the mutation path the query layer drives on every fetch
    /// completion; the persistence subscriber observes it via `subscribe`.
    pub async fn set(&self, key: QueryKey, state: QueryState) {
        {
            let mut entries = self.entries.write().await;
            entries.insert(
                key.hash(),
                LiveEntry {
                    key: key.clone(),
                    state: state.clone(),
                },
            );
        }
        // No receivers is fine; events are best-effort notifications.
        let _ = self.events.send(CacheEvent { key, state });
    }

    // == Inject ==
    /// Seeds an entry without notifying subscribers or triggering a refetch.
    ///
    /// Used by startup hydration. If a fresher state for the key is already
    /// live (a fetch finished while background restore was still running),
    /// the seeded state is discarded.
    pub async fn inject(&self, key: QueryKey, state: QueryState) {
        let mut entries = self.entries.write().await;
        let hash = key.hash();
        if let Some(existing) = entries.get(&hash) {
            if existing.state.updated_at >= state.updated_at {
                return;
            }
        }
        entries.insert(hash, LiveEntry { key, state });
    }

    // == Get ==
    /// Reads the current state for a key.
    pub async fn get(&self, key: &QueryKey) -> Option<QueryState> {
        let entries = self.entries.read().await;
        entries.get(&key.hash()).map(|e| e.state.clone())
    }

    // == Clear ==
    /// Drops every live entry. Used on logout/reset.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    // == Subscribe ==
    /// Opens a receiver on the mutation stream.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if no entries are live.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for LiveCache {
    fn default() -> Self {
        Self::new()
    }
}
