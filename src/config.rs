//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;

/// Persistent cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of entries the store can hold
    pub max_entries: usize,
    /// Maximum total logical size in bytes (pre-compression) across all entries
    pub max_total_bytes: u64,
    /// Maximum age in milliseconds for a legacy blob to be worth migrating
    pub max_legacy_age_ms: u64,
    /// Key categories that are never persisted (volatile data)
    pub excluded_prefixes: Vec<String>,
    /// Key categories restored synchronously before startup proceeds
    pub critical_prefixes: Vec<String>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_ENTRIES` - Maximum stored entries (default: 1000)
    /// - `MAX_TOTAL_BYTES` - Total logical size budget in bytes (default: 50 MiB)
    /// - `MAX_LEGACY_AGE_MS` - Legacy blob freshness window (default: 24h)
    /// - `EXCLUDED_PREFIXES` - Comma-separated volatile key categories (default: none)
    /// - `CRITICAL_PREFIXES` - Comma-separated first-paint key categories (default: none)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_entries: env::var("MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_entries),
            max_total_bytes: env::var("MAX_TOTAL_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_total_bytes),
            max_legacy_age_ms: env::var("MAX_LEGACY_AGE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_legacy_age_ms),
            excluded_prefixes: env::var("EXCLUDED_PREFIXES")
                .map(|v| parse_prefix_list(&v))
                .unwrap_or(defaults.excluded_prefixes),
            critical_prefixes: env::var("CRITICAL_PREFIXES")
                .map(|v| parse_prefix_list(&v))
                .unwrap_or(defaults.critical_prefixes),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            max_total_bytes: 50 * 1024 * 1024,
            max_legacy_age_ms: 24 * 60 * 60 * 1000,
            excluded_prefixes: Vec::new(),
            critical_prefixes: Vec::new(),
        }
    }
}

/// Splits a comma-separated prefix list, dropping empty items.
fn parse_prefix_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}
