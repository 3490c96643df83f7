//! Persistence - durable key-value store for bots, trade history and logs
//!
//! Backends implement [`KeyValueStore`] and may fail; [`Persistence`] wraps
//! a backend and turns every failure into a log line so callers in the
//! strategy layer never see storage errors.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::types::TradeRecord;

/// Well-known store keys
pub mod keys {
    pub const BOTS: &str = "bots";
    pub const TRADE_HISTORY: &str = "trade_history";
    pub const LOGS_SYSTEM: &str = "logs_system";
    pub const LOGS_TRADE: &str = "logs_trade";

    pub fn bot_stats(bot_id: &str) -> String {
        format!("bot_stats:{}", bot_id)
    }
}

/// Raw JSON key-value backend
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn save(&self, key: &str, value: &Value) -> anyhow::Result<()>;
    async fn load(&self, key: &str) -> anyhow::Result<Option<Value>>;
    async fn remove(&self, key: &str) -> anyhow::Result<()>;
    async fn clear_all(&self) -> anyhow::Result<()>;
}

/// One JSON document per key inside a directory
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Percent-escapes everything but `[A-Za-z0-9_-]` so distinct keys never share a file
    fn path_for(&self, key: &str) -> PathBuf {
        let mut file = String::with_capacity(key.len());
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                file.push(byte as char);
            } else {
                file.push_str(&format!("%{:02X}", byte));
            }
        }
        self.dir.join(format!("{}.json", file))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn save(&self, key: &str, value: &Value) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        // One temp file per write; concurrent saves of a key must not share it
        let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&tmp, json).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!("Wrote {}", path.display());
        Ok(())
    }

    async fn load(&self, key: &str) -> anyhow::Result<Option<Value>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear_all(&self) -> anyhow::Result<()> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|ext| ext == "json").unwrap_or(false) {
                fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }
}

/// Volatile backend for tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn save(&self, key: &str, value: &Value) -> anyhow::Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn load(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear_all(&self) -> anyhow::Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}

/// Typed, infallible facade over a [`KeyValueStore`]
#[derive(Clone)]
pub struct Persistence {
    backend: Arc<dyn KeyValueStore>,
}

impl Persistence {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Returns false if the value could not be written
    pub async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let json = match serde_json::to_value(value) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize {}: {}", key, e);
                return false;
            }
        };
        match self.backend.save(key, &json).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to save {}: {}", key, e);
                false
            }
        }
    }

    /// Stored value, or `default` when missing or unreadable
    pub async fn load<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.backend.load(key).await {
            Ok(Some(json)) => match serde_json::from_value(json) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Discarding malformed {}: {}", key, e);
                    default
                }
            },
            Ok(None) => default,
            Err(e) => {
                error!("Failed to load {}: {}", key, e);
                default
            }
        }
    }

    /// Like [`Persistence::load`] but surfaces read and decode failures
    pub async fn try_load<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.backend.load(key).await? {
            Some(json) => Ok(Some(serde_json::from_value(json)?)),
            None => Ok(None),
        }
    }

    pub async fn remove(&self, key: &str) {
        if let Err(e) = self.backend.remove(key).await {
            error!("Failed to remove {}: {}", key, e);
        }
    }

    pub async fn clear_all(&self) {
        if let Err(e) = self.backend.clear_all().await {
            error!("Failed to clear store: {}", e);
        }
    }
}

/// Append-only trade history with bounded retention
#[derive(Clone)]
pub struct TradeJournal {
    store: Persistence,
    retention: usize,
    // Serializes read-modify-write cycles across strategies
    write_lock: Arc<Mutex<()>>,
}

impl TradeJournal {
    pub fn new(store: Persistence, retention: usize) -> Self {
        Self {
            store,
            retention: retention.max(1),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Returns false if the record was not written; existing history is
    /// never overwritten when it cannot be read back first
    pub async fn append(&self, record: TradeRecord) -> bool {
        let _guard = self.write_lock.lock().await;
        let mut history: Vec<TradeRecord> = match self.store.try_load(keys::TRADE_HISTORY).await {
            Ok(history) => history.unwrap_or_default(),
            Err(e) => {
                error!("Trade history unreadable, dropping record {}: {}", record.id, e);
                return false;
            }
        };
        history.push(record);
        if history.len() > self.retention {
            let excess = history.len() - self.retention;
            history.drain(..excess);
        }
        self.store.save(keys::TRADE_HISTORY, &history).await
    }

    /// All retained records, oldest first
    pub async fn all(&self) -> Vec<TradeRecord> {
        self.store.load(keys::TRADE_HISTORY, Vec::new()).await
    }

    /// The `n` most recent records, newest first
    pub async fn recent(&self, n: usize) -> Vec<TradeRecord> {
        let history = self.all().await;
        history.into_iter().rev().take(n).collect()
    }

    /// Records produced by one bot, oldest first
    pub async fn for_bot(&self, bot_id: &str) -> Vec<TradeRecord> {
        self.all()
            .await
            .into_iter()
            .filter(|r| r.bot_id.as_deref() == Some(bot_id))
            .collect()
    }
}
