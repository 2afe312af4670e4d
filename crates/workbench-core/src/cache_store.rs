//! Durable key/value store backing the install cache.
//!
//! `FileCacheStore` persists a JSON map to `<cache_dir>/store.json`, so values
//! survive process restarts. `MemoryCacheStore` lives as long as the process.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

const STORE_FILENAME: &str = "store.json";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store I/O failed at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cache store is corrupt: {0}")]
    Corrupt(String),
}

/// Durable get/put by string key.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn put(&self, key: &str, value: &str) -> Result<(), CacheError>;
    async fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// JSON-file-backed store. Writes go through a temp file + rename.
pub struct FileCacheStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCacheStore {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            path: cache_dir.join(STORE_FILENAME),
            lock: Mutex::new(()),
        }
    }

    /// Store rooted at `config::CacheConfig::cache_dir()`.
    pub fn from_env() -> Self {
        Self::new(&crate::config::CacheConfig::cache_dir())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, CacheError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| CacheError::Corrupt(format!("{}: {}", self.path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(self.io_err(e)),
        }
    }

    /// Like `load`, but a corrupt file is discarded so writes can recover it.
    async fn load_for_write(&self) -> Result<BTreeMap<String, String>, CacheError> {
        match self.load().await {
            Err(CacheError::Corrupt(reason)) => {
                tracing::warn!(%reason, "Discarding corrupt cache store");
                Ok(BTreeMap::new())
            }
            other => other,
        }
    }

    async fn save(&self, map: &BTreeMap<String, String>) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_err(e))?;
        }
        let content = serde_json::to_string_pretty(map)
            .map_err(|e| CacheError::Corrupt(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| self.io_err(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_err(e))
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let _guard = self.lock.lock().await;
        let mut map = self.load_for_write().await?;
        map.insert(key.to_string(), value.to_string());
        self.save(&map).await
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let _guard = self.lock.lock().await;
        let mut map = self.load_for_write().await?;
        if map.remove(key).is_some() {
            self.save(&map).await?;
        }
        Ok(())
    }
}

/// In-process store, for tests and `--no-persist` runs.
#[derive(Default)]
pub struct MemoryCacheStore {
    map: Mutex<BTreeMap<String, String>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.map.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.map
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.map.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileCacheStore::new(dir.path());
            store.put("k", "v1").await.unwrap();
            store.put("other", "x").await.unwrap();
        }
        let reopened = FileCacheStore::new(dir.path());
        assert_eq!(reopened.get("k").await.unwrap(), Some("v1".to_string()));
        reopened.remove("k").await.unwrap();
        assert_eq!(reopened.get("k").await.unwrap(), None);
        assert_eq!(reopened.get("other").await.unwrap(), Some("x".to_string()));
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(&dir.path().join("nested"));
        assert_eq!(store.get("anything").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_corrupt_read_errors_then_write_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(matches!(store.get("k").await, Err(CacheError::Corrupt(_))));
        store.put("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryCacheStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.put("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
