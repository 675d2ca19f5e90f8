//! Query Persist - A persistent query-result cache
//!
//! Survives application restarts by mirroring an in-memory reactive query
//! cache into a durable per-entry store, with LRU eviction against a
//! count/size budget, compressed payloads, a one-time migration off the
//! deprecated single-blob format, and two-phase startup hydration so the UI
//! is usable before the full cache is restored.

pub mod codec;
pub mod config;
pub mod error;
pub mod hydrate;
pub mod key;
pub mod live;
pub mod migrate;
pub mod persister;
pub mod store;
pub mod subscriber;

pub use codec::Codec;
pub use config::Config;
pub use error::{Result, StoreError};
pub use key::QueryKey;
pub use live::{CacheEvent, LiveCache, QueryState};
pub use persister::{CacheStats, QueryPersister};
pub use store::{FileMedium, MemoryMedium, StorageMedium};
pub use subscriber::SubscriberHandle;
