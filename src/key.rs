//! Query Key Module
//!
//! Typed representation of a query's identifying key, with a deterministic
//! content hash used as the storage primary key and a human-readable
//! serialized form kept alongside stored entries.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// == Query Key ==
/// Identifying handle for one cached unit of fetched data.
///
/// A key is an ordered list of string segments, e.g. `["documents", "doc-42"]`.
/// The first segment is the key's category; exclusion and critical-restore
/// sets match on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey {
    segments: Vec<String>,
}

impl QueryKey {
    // == Constructor ==
    /// Creates a key from its segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// The key's category: its first segment, or "" for an empty key.
    pub fn category(&self) -> &str {
        self.segments.first().map(String::as_str).unwrap_or("")
    }

    /// Returns true if the key's category equals any of the given prefixes.
    pub fn matches_any(&self, prefixes: &[String]) -> bool {
        prefixes.iter().any(|p| p == self.category())
    }

    // == Hash ==
    /// Stable hex-encoded SHA-256 hash over the segments.
    ///
    /// Segments are length-prefixed before hashing so `["ab", "c"]` and
    /// `["a", "bc"]` hash differently.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        for segment in &self.segments {
            hasher.update((segment.len() as u64).to_le_bytes());
            hasher.update(segment.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    // == Repr ==
    /// Canonical JSON rendering of the segments.
    ///
    /// Stored next to each entry for diagnostics, and parsed back by startup
    /// hydration to reconstruct the key it injects into the live cache.
    pub fn repr(&self) -> String {
        serde_json::to_string(&self.segments).unwrap_or_else(|_| "[]".to_string())
    }

    /// Parses a key back from its `repr()` form.
    pub fn from_repr(repr: &str) -> Option<Self> {
        serde_json::from_str(repr).ok()
    }

    /// The key's segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}
