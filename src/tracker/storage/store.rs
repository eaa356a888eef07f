use std::{
    io::ErrorKind,
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use fs4::tokio::AsyncFileExt;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::{fs::File, sync::Mutex};
use tracing::{debug, warn};

use crate::fs::operations::{lock_path, replace_file};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store contains unexpected data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store root isn't a json object")]
    NotAnObject,
}

/// Merge step of [PersistentStore::update]. Receives the current value of the key.
pub type Merge = Box<dyn FnOnce(Option<Value>) -> Result<Value, StoreError> + Send>;

/// Key-value store that outlives a single scan. Values are plain json.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Reads, merges and writes `key` as a single step. Two updates racing on the same key both
    /// end up in the store. Returns the written value.
    async fn update(&self, key: &str, merge: Merge) -> Result<Value, StoreError>;
}

/// Store kept in a single json object file.
///
/// Writers are serialized with an in-process mutex and an advisory lock on a sibling `.lock`
/// file, so separate processes sharing the application directory don't lose each other's
/// updates. Contents are replaced with a rename, so an interrupted write leaves the previous
/// contents intact.
pub struct JsonFileStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Result<Self, std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Ok(Self {
            path,
            guard: Mutex::new(()),
        })
    }

    async fn transaction<T>(
        &self,
        operation: impl FnOnce(&mut Map<String, Value>) -> Result<(T, bool), StoreError>,
    ) -> Result<T, StoreError> {
        let _guard = self.guard.lock().await;

        let lock = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path(&self.path))
            .await?;
        // Semi-safe acquire-release for a file
        lock.lock_exclusive()?;
        let result = self.transaction_locked(operation).await;
        lock.unlock_async().await?;
        result
    }

    async fn transaction_locked<T>(
        &self,
        operation: impl FnOnce(&mut Map<String, Value>) -> Result<(T, bool), StoreError>,
    ) -> Result<T, StoreError> {
        let mut contents = self.read_contents().await?;
        let (result, modified) = operation(&mut contents)?;
        if modified {
            let bytes = serde_json::to_vec_pretty(&contents)?;
            replace_file(&self.path, &bytes).await?;
            debug!("Wrote store {:?}", self.path);
        }
        Ok(result)
    }

    async fn read_contents(&self) -> Result<Map<String, Value>, StoreError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        if text.trim().is_empty() {
            warn!("Store {:?} is empty, starting from scratch", self.path);
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&text)? {
            Value::Object(map) => Ok(map),
            _ => Err(StoreError::NotAnObject),
        }
    }
}

#[async_trait]
impl PersistentStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.transaction(|contents| Ok((contents.get(key).cloned(), false)))
            .await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.transaction(|contents| {
            contents.insert(key.to_string(), value);
            Ok(((), true))
        })
        .await
    }

    async fn update(&self, key: &str, merge: Merge) -> Result<Value, StoreError> {
        self.transaction(|contents| {
            let merged = merge(contents.remove(key))?;
            contents.insert(key.to_string(), merged.clone());
            Ok((merged, true))
        })
        .await
    }
}

/// Store that lives as long as the process. Used for dry runs.
#[derive(Default)]
pub struct MemoryStore {
    contents: Mutex<Map<String, Value>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Amount of successful `set` and `update` calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.contents.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.contents.lock().await.insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update(&self, key: &str, merge: Merge) -> Result<Value, StoreError> {
        let mut contents = self.contents.lock().await;
        let merged = merge(contents.get(key).cloned())?;
        contents.insert(key.to_string(), merged.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    use super::{JsonFileStore, MemoryStore, PersistentStore, StoreError};

    fn increment(key: &'static str) -> super::Merge {
        Box::new(move |current: Option<Value>| {
            let mut map = current.unwrap_or_else(|| json!({}));
            let counter = map
                .get(key)
                .and_then(Value::as_u64)
                .unwrap_or_default();
            map[key] = json!(counter + 1);
            Ok(map)
        })
    }

    #[tokio::test]
    async fn test_file_store_basic() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonFileStore::new(dir.path().join("nested").join("store.json"))?;

        assert_eq!(store.get("months").await?, None);
        store.set("total", json!({ "days": 1 })).await?;
        assert_eq!(store.get("total").await?, Some(json!({ "days": 1 })));

        let reopened = JsonFileStore::new(dir.path().join("nested").join("store.json"))?;
        assert_eq!(reopened.get("total").await?, Some(json!({ "days": 1 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_file_store_update_merges() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonFileStore::new(dir.path().join("store.json"))?;
        store.set("total", json!("kept")).await?;

        store.update("months", increment("a")).await?;
        let merged = store.update("months", increment("a")).await?;

        assert_eq!(merged, json!({ "a": 2 }));
        assert_eq!(store.get("months").await?, Some(json!({ "a": 2 })));
        assert_eq!(store.get("total").await?, Some(json!("kept")));
        Ok(())
    }

    #[tokio::test]
    async fn test_file_store_concurrent_updates_are_not_lost() -> Result<()> {
        let dir = tempdir()?;
        let store = Arc::new(JsonFileStore::new(dir.path().join("store.json"))?);

        let updates = (0..10)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.update("months", increment("a")).await })
            })
            .collect::<Vec<_>>();
        for update in updates {
            update.await??;
        }

        assert_eq!(store.get("months").await?, Some(json!({ "a": 10 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_file_store_rejects_foreign_contents() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("store.json");
        std::fs::write(&path, "[1, 2]")?;
        let store = JsonFileStore::new(path)?;
        assert!(matches!(store.get("months").await, Err(StoreError::NotAnObject)));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_merge_keeps_previous_value() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonFileStore::new(dir.path().join("store.json"))?;
        store.set("months", json!({ "a": 1 })).await?;

        let failed = store
            .update("months", Box::new(|_| Err(StoreError::NotAnObject)))
            .await;
        assert!(failed.is_err());
        assert_eq!(store.get("months").await?, Some(json!({ "a": 1 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_store_counts_writes() -> Result<()> {
        let store = MemoryStore::new();
        store.get("months").await?;
        assert_eq!(store.writes(), 0);
        store.set("total", json!(1)).await?;
        store.update("months", increment("a")).await?;
        assert_eq!(store.writes(), 2);
        assert_eq!(store.get("months").await?, Some(json!({ "a": 1 })));
        Ok(())
    }
}
