//! Storage Medium Module
//!
//! The opaque async key/value medium the entry store is built on. Only the
//! entry store and the legacy migrator hold a handle to it; everything else
//! goes through the store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;

/// Prefix for in-flight file writes, filtered out of key listings.
const TMP_PREFIX: &str = ".tmp-";

// == Storage Medium Trait ==
/// Durable async key/value storage by string key.
///
/// Keys used by this crate are filename-safe path components
/// (`entry.<hex>`, `query-cache`, `migration-done`), which is what lets the
/// file-backed medium map keys to file names directly.
#[async_trait]
pub trait StorageMedium: Send + Sync + std::fmt::Debug {
    /// Reads the value stored under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Writes `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Removes the value stored under `key`; absent keys are a no-op.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Removes every stored value.
    async fn clear(&self) -> Result<()>;

    /// Lists every stored key. Used for index builds and full-scan recounts.
    async fn keys(&self) -> Result<Vec<String>>;
}

// == Memory Medium ==
/// Volatile in-memory medium for tests and ephemeral profiles.
#[derive(Debug, Default)]
pub struct MemoryMedium {
    values: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryMedium {
    /// Creates an empty in-memory medium.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageMedium for MemoryMedium {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.values.lock().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.values.lock().await.clear();
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.values.lock().await.keys().cloned().collect())
    }
}

// == File Medium ==
/// Disk-backed medium storing one file per key inside a directory.
///
/// Writes land in a temp file first and are renamed into place, so a crash
/// mid-write leaves the previous value intact rather than a torn record.
#[derive(Debug)]
pub struct FileMedium {
    dir: PathBuf,
}

impl FileMedium {
    /// Opens a file medium rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

#[async_trait]
impl StorageMedium for FileMedium {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let tmp = self.dir.join(format!("{TMP_PREFIX}{key}"));
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, self.path_for(key)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> Result<()> {
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            if item.file_type().await?.is_file() {
                tokio::fs::remove_file(item.path()).await?;
            }
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            if !item.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = item.file_name().to_str() {
                if !name.starts_with(TMP_PREFIX) {
                    keys.push(name.to_string());
                }
            }
        }
        Ok(keys)
    }
}
