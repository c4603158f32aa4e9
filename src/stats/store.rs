//! Key-value backends for persisted statistics.

use crate::error::{Result, StorageError};
use crate::utils::ensure_directory;
use async_trait::async_trait;
use serde_json::Value;
#[cfg(test)]
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
#[cfg(test)]
use tokio::sync::Mutex;

/// Overwrite-at-key JSON storage. No multi-key atomicity is assumed.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Parsed JSON stored under `key`, or `None` when nothing was stored yet.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn put(&self, key: &str, value: String) -> Result<()>;
}

/// One `<key>.json` document per key inside a directory.
pub struct FileStore {
    directory: PathBuf,
}

impl FileStore {
    pub fn new(directory: impl AsRef<Path>) -> Result<Self> {
        ensure_directory(&directory)?;
        Ok(Self {
            directory: directory.as_ref().to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}.json", key))
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let content = match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StorageError::Io {
                    key: key.to_string(),
                    source,
                }
                .into())
            }
        };

        let value = serde_json::from_str(&content).map_err(|source| StorageError::Decode {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(value))
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        // Write-then-rename so a crash never leaves a half-written record.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };

        tokio::fs::write(&tmp, value).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_err)?;
        Ok(())
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let entries = self.entries.lock().await;
        match entries.get(key) {
            Some(raw) => {
                let value = serde_json::from_str(raw).map_err(|source| StorageError::Decode {
                    key: key.to_string(),
                    source,
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "sf-proxy-store-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[tokio::test]
    async fn file_store_round_trips_documents() {
        let dir = scratch_dir("roundtrip");
        let store = FileStore::new(&dir).unwrap();

        assert!(store.get("daily_stats").await.unwrap().is_none());

        store
            .put("daily_stats", json!({"requests_today": 3}).to_string())
            .await
            .unwrap();
        let value = store.get("daily_stats").await.unwrap().unwrap();
        assert_eq!(value["requests_today"], 3);
        assert!(dir.join("daily_stats.json").exists());
        assert!(!dir.join("daily_stats.json.tmp").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn file_store_reports_corrupt_documents() {
        let dir = scratch_dir("corrupt");
        let store = FileStore::new(&dir).unwrap();
        std::fs::write(dir.join("total_stats.json"), "{not json").unwrap();

        assert!(store.get("total_stats").await.is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn memory_store_overwrites_keys() {
        let store = MemoryStore::new();
        store.put("k", "1".to_string()).await.unwrap();
        store.put("k", "2".to_string()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!(2)));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }
}
