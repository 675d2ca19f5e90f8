//! Error types for the persistent cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Store Error Enum ==
/// Unified error type for the persistence subsystem.
///
/// Nothing in this crate surfaces these errors to the UI layer: a failed
/// read degrades to a cache miss and a failed write forfeits durability for
/// that entry. The one caller-visible path is `clear_all`, which reports
/// failure upward so a user-triggered reset can be flagged as incomplete.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The underlying storage medium failed a read or write
    #[error("storage medium error: {0}")]
    Storage(#[from] std::io::Error),

    /// Stored bytes failed to decompress or deserialize
    #[error("failed to decode stored record: {0}")]
    Decode(String),

    /// A value could not be serialized for storage
    #[error("failed to encode record: {0}")]
    Encode(String),
}

// == Result Type Alias ==
/// Convenience Result type for the persistence subsystem.
pub type Result<T> = std::result::Result<T, StoreError>;
