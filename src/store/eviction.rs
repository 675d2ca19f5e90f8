//! Eviction Policy Module
//!
//! Enforces the store's count/size budget by removing least-recently-accessed
//! entries.

use tracing::{debug, warn};

use crate::config::Config;
use crate::store::EntryStore;

// == Eviction Policy ==
/// Count and logical-size budget for the entry store.
#[derive(Debug, Clone)]
pub struct EvictionPolicy {
    /// Maximum number of entries allowed
    pub max_entries: usize,
    /// Maximum total pre-compression size in bytes
    pub max_total_bytes: u64,
}

impl EvictionPolicy {
    /// Creates a policy with explicit bounds.
    pub fn new(max_entries: usize, max_total_bytes: u64) -> Self {
        Self {
            max_entries,
            max_total_bytes,
        }
    }

    /// Builds the policy from the cache configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_entries, config.max_total_bytes)
    }

    // == Enforce ==
    /// Removes oldest-accessed entries until the store is within budget.
    ///
    /// Ties on access time break by key hash, so eviction order is fully
    /// deterministic. Cheap to call when already within budget: a totals
    /// check and nothing else. A single entry larger than the whole size
    /// budget is allowed to land and is removed here on the next pass.
    ///
    /// # Returns
    /// The number of entries evicted.
    pub async fn enforce(&self, store: &mut EntryStore) -> usize {
        let (count, total_size) = store.totals();
        if count <= self.max_entries && total_size <= self.max_total_bytes {
            return 0;
        }

        let mut evicted = 0;
        // One snapshot bounds the pass: each victim comes off the front.
        for victim in store.snapshot_by_access() {
            let (count, total_size) = store.totals();
            if count <= self.max_entries && total_size <= self.max_total_bytes {
                break;
            }
            match store.delete(&victim.key_hash).await {
                Ok(()) => {
                    evicted += 1;
                    debug!(
                        key = %victim.key_repr,
                        size = victim.size_bytes,
                        "evicted least-recently-accessed entry"
                    );
                }
                Err(e) => {
                    // Leave the entry for a later pass rather than loop on a
                    // failing medium.
                    warn!("eviction failed for {}: {e}", victim.key_hash);
                    break;
                }
            }
        }
        evicted
    }
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        let config = Config::default();
        Self::new(config.max_entries, config.max_total_bytes)
    }
}
