//! Key-value persistence surface and its built-in backends.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{Error, Result};

/// Minimal durable string store backing the event list and the sync queue.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Volatile in-memory backend, primarily for tests.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKv {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// File-backed store keeping all keys in a single JSON document.
pub struct FileKv {
    path: PathBuf,
    // Serializes the read-modify-write cycle of set/remove.
    write_lock: Mutex<()>,
}

impl FileKv {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<HashMap<String, String>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(HashMap::new());
            }
            Err(error) => return Err(error.into()),
        };
        serde_json::from_str(&raw)
            .map_err(|error| Error::Storage(format!("corrupt store file: {error}")))
    }

    async fn persist(&self, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string(entries)?;
        tokio::fs::write(&self.path, raw).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load().await?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), value);
        self.persist(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        entries.remove(key);
        self.persist(&entries).await
    }
}
