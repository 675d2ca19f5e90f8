//! Cache Entry Module
//!
//! Defines the durable record written for each cached query result.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::error::{Result, StoreError};
use crate::key::QueryKey;
use crate::live::QueryState;

// == Cache Entry ==
/// One row per cached query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Deterministic hash of the query key; primary lookup key, unique
    pub key_hash: String,
    /// Serialized original key, kept for diagnostics and hydration
    pub key_repr: String,
    /// Compressed serialized query state
    pub payload: Vec<u8>,
    /// When the underlying data was last fetched, Unix milliseconds
    pub produced_at: u64,
    /// Bumped on every read or write; drives eviction ordering
    pub accessed_at: u64,
    /// Byte length of the serialized state before compression.
    ///
    /// Budget accounting uses the logical data volume, not what compression
    /// happened to achieve for it.
    pub size_bytes: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Builds an entry from a live query state: serialize, measure, compress.
    ///
    /// # Arguments
    /// * `key` - The query key the state belongs to
    /// * `state` - The state to persist
    /// * `codec` - Compression codec for the payload
    pub fn from_state(key: &QueryKey, state: &QueryState, codec: Codec) -> Result<Self> {
        let serialized =
            serde_json::to_string(state).map_err(|e| StoreError::Encode(e.to_string()))?;

        Ok(Self {
            key_hash: key.hash(),
            key_repr: key.repr(),
            size_bytes: serialized.len() as u64,
            payload: codec.compress(&serialized),
            produced_at: state.updated_at,
            accessed_at: current_timestamp_ms(),
        })
    }

    // == Decode ==
    /// Decompresses and deserializes the stored state.
    ///
    /// Returns `None` for corrupt or undecodable payloads; callers treat
    /// such entries as absent.
    pub fn decode_state(&self, codec: Codec) -> Option<QueryState> {
        let text = codec.decompress(&self.payload)?;
        serde_json::from_str(&text).ok()
    }

    /// Reconstructs the query key from its stored repr.
    pub fn key(&self) -> Option<QueryKey> {
        QueryKey::from_repr(&self.key_repr)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_state_measures_pre_compression_size() {
        let key = QueryKey::new(["documents", "doc-1"]);
        let state = QueryState::new(json!({"title": "hello"}), 42);
        let entry = CacheEntry::from_state(&key, &state, Codec::Deflate).unwrap();

        let serialized = serde_json::to_string(&state).unwrap();
        assert_eq!(entry.size_bytes, serialized.len() as u64);
        assert_eq!(entry.key_hash, key.hash());
        assert_eq!(entry.produced_at, 42);
    }

    #[test]
    fn test_state_round_trip() {
        let key = QueryKey::new(["folders", "inbox"]);
        let state = QueryState::new(json!({"items": [1, 2, 3], "name": "число"}), 7);
        let entry = CacheEntry::from_state(&key, &state, Codec::Deflate).unwrap();

        let decoded = entry.decode_state(Codec::Deflate).unwrap();
        assert_eq!(decoded.data, state.data);
        assert_eq!(decoded.updated_at, 7);
        assert_eq!(entry.key().unwrap(), key);
    }

    #[test]
    fn test_decode_corrupt_payload_is_none() {
        let key = QueryKey::new(["documents", "doc-1"]);
        let state = QueryState::new(json!(null), 1);
        let mut entry = CacheEntry::from_state(&key, &state, Codec::Deflate).unwrap();

        entry.payload = vec![0xde, 0xad, 0xbe, 0xef];
        assert!(entry.decode_state(Codec::Deflate).is_none());
    }
}
