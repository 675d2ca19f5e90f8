//! Property-Based Tests for the Store Module
//!
//! Uses proptest to verify the codec round trip, upsert uniqueness, totals
//! accounting and the eviction bound.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use proptest::prelude::*;
use tokio_test::block_on;

use crate::codec::Codec;
use crate::key::QueryKey;
use crate::live::QueryState;
use crate::store::{CacheEntry, EntryStore, EvictionPolicy, MemoryMedium, StorageMedium};

// == Strategies ==
/// Generates key segments; a deliberately small alphabet so sequences hit
/// the same key often enough to exercise upserts and deletes.
fn segment_strategy() -> impl Strategy<Value = String> {
    "[a-d]{1,3}".prop_map(|s| s)
}

fn key_strategy() -> impl Strategy<Value = QueryKey> {
    prop::collection::vec(segment_strategy(), 1..3).prop_map(|segments| QueryKey::new(segments))
}

fn payload_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{0,64}".prop_map(|s| s)
}

/// A sequence of store operations for accounting properties.
#[derive(Debug, Clone)]
enum StoreOp {
    Put { key: QueryKey, payload: String },
    Delete { key: QueryKey },
}

fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        (key_strategy(), payload_strategy())
            .prop_map(|(key, payload)| StoreOp::Put { key, payload }),
        key_strategy().prop_map(|key| StoreOp::Delete { key }),
    ]
}

// == Helpers ==
async fn new_store() -> EntryStore {
    EntryStore::open(Arc::new(MemoryMedium::new()) as Arc<dyn StorageMedium>).await
}

fn entry_for(key: &QueryKey, payload: &str) -> CacheEntry {
    let state = QueryState::new(serde_json::Value::String(payload.to_string()), 1);
    CacheEntry::from_state(key, &state, Codec::Deflate).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // For any string, including empty and non-ASCII, compressing then
    // decompressing returns the original exactly.
    #[test]
    fn prop_deflate_round_trip(text in any::<String>()) {
        let codec = Codec::Deflate;
        let encoded = codec.compress(&text);
        let decoded = codec.decompress(&encoded);
        prop_assert_eq!(decoded.as_deref(), Some(text.as_str()));
    }

    #[test]
    fn prop_plain_round_trip(text in any::<String>()) {
        let codec = Codec::Plain;
        let encoded = codec.compress(&text);
        let decoded = codec.decompress(&encoded);
        prop_assert_eq!(decoded.as_deref(), Some(text.as_str()));
    }

    // Repeated puts under one key hash leave exactly one entry, and the
    // totals reflect only the last payload's size.
    #[test]
    fn prop_upsert_keeps_single_entry(
        key in key_strategy(),
        payloads in prop::collection::vec(payload_strategy(), 1..8)
    ) {
        block_on(async {
            let mut store = new_store().await;
            let mut last_size = 0;
            for payload in &payloads {
                let entry = entry_for(&key, payload);
                last_size = entry.size_bytes;
                store.put(entry).await.unwrap();
            }

            let (count, total) = store.totals();
            prop_assert_eq!(count, 1);
            prop_assert_eq!(total, last_size);
            Ok(())
        })?;
    }

    // After any sequence of puts and deletes, the running totals equal what
    // a full recount of the surviving entries gives.
    #[test]
    fn prop_totals_track_contents(ops in prop::collection::vec(store_op_strategy(), 1..40)) {
        block_on(async {
            let mut store = new_store().await;
            let mut expected: HashMap<String, u64> = HashMap::new();

            for op in ops {
                match op {
                    StoreOp::Put { key, payload } => {
                        let entry = entry_for(&key, &payload);
                        expected.insert(entry.key_hash.clone(), entry.size_bytes);
                        store.put(entry).await.unwrap();
                    }
                    StoreOp::Delete { key } => {
                        expected.remove(&key.hash());
                        store.delete(&key.hash()).await.unwrap();
                    }
                }
            }

            let (count, total) = store.totals();
            prop_assert_eq!(count, expected.len());
            prop_assert_eq!(total, expected.values().sum::<u64>());
            Ok(())
        })?;
    }

    // Enforcing a count budget keeps exactly the most recently accessed
    // distinct keys, never more than the budget.
    #[test]
    fn prop_eviction_bound(
        names in prop::collection::vec("[a-h]{1,4}", 1..30),
        max_entries in 1usize..10
    ) {
        block_on(async {
            let mut store = new_store().await;
            for name in &names {
                store
                    .put(entry_for(&QueryKey::new(["q", name]), name))
                    .await
                    .unwrap();
            }

            let policy = EvictionPolicy::new(max_entries, u64::MAX);
            policy.enforce(&mut store).await;

            let (count, _) = store.totals();
            prop_assert!(count <= max_entries);

            // Most recent distinct keys, newest first.
            let mut recent: Vec<String> = Vec::new();
            for name in names.iter().rev() {
                let hash = QueryKey::new(["q", name]).hash();
                if !recent.contains(&hash) {
                    recent.push(hash);
                }
            }
            let survivors: HashSet<&String> = recent.iter().take(count).collect();
            for hash in &survivors {
                prop_assert!(store.contains(hash.as_str()), "recently used key was evicted");
            }
            Ok(())
        })?;
    }
}
