//! Durable snapshot and cwd-map records.
//!
//! Two independent records live in a key-value store:
//!
//! ```json
//! // paneward.snapshot
//! {
//!   "sessions": [{ "cwd": "/p/a", "name": "a", "viewColumn": 1 }],
//!   "savedAt": 1760000000000,
//!   "gracefulExit": false,
//!   "editorLayout": { "orientation": 0, "groups": [{}, {}] }
//! }
//! // paneward.cwdMap
//! { "api-default": "/p/api" }
//! ```
//!
//! # Defensive Reads
//!
//! A missing, empty or corrupt record reads as absent (with a warning),
//! never as an error. The two records are keyed separately so losing one
//! never loses the other.
//!
//! # Crash Safety
//!
//! [`FileKeyValueStore`] writes a temp file in the same directory, fsyncs
//! it and renames it over the target, so once `set` returns the value
//! survives the process dying.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use fs_err as fs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{KeeperError, Result};
use crate::grid::GridLayout;
use crate::session::SessionIdentity;
use crate::storage::StorageConfig;

pub const SNAPSHOT_KEY: &str = "paneward.snapshot";
pub const CWD_MAP_KEY: &str = "paneward.cwdMap";

/// Persisted identity → cwd side table.
pub type CwdMap = BTreeMap<SessionIdentity, PathBuf>;

// ═══════════════════════════════════════════════════════════════════════════════
// Records
// ═══════════════════════════════════════════════════════════════════════════════

/// One saved pane. No live handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedSession {
    pub cwd: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_column: Option<u32>,
}

impl SavedSession {
    pub fn new(cwd: impl Into<PathBuf>, name: Option<&str>) -> Self {
        Self {
            cwd: cwd.into(),
            name: name.map(str::to_string),
            view_column: None,
        }
    }
}

/// Point-in-time record of all open sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub sessions: Vec<SavedSession>,
    /// Epoch milliseconds.
    pub saved_at: i64,
    #[serde(default)]
    pub graceful_exit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor_layout: Option<GridLayout>,
}

impl Snapshot {
    pub fn new(sessions: Vec<SavedSession>, saved_at: DateTime<Utc>) -> Self {
        Self {
            sessions,
            saved_at: saved_at.timestamp_millis(),
            graceful_exit: false,
            editor_layout: None,
        }
    }

    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.saved_at).single()
    }

    /// Older than `threshold` at `now`. An unreadable timestamp is stale.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        match self.saved_at() {
            Some(saved_at) => now.signed_duration_since(saved_at) > threshold,
            None => true,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Key-value backends
// ═══════════════════════════════════════════════════════════════════════════════

/// Durable string store scoped to one install.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// One JSON file per key under the storage state directory.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    storage: StorageConfig,
}

impl FileKeyValueStore {
    pub fn new(storage: StorageConfig) -> Self {
        Self { storage }
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.storage.key_file(key);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(KeeperError::Io {
                context: format!("read {}", key),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let dir = self.storage.state_dir();
        fs::create_dir_all(&dir).map_err(|source| KeeperError::Io {
            context: "create state directory".to_string(),
            source,
        })?;

        let store_err = |details: String| KeeperError::Store {
            key: key.to_string(),
            details,
        };
        let mut temp_file =
            NamedTempFile::new_in(&dir).map_err(|e| store_err(format!("temp file: {}", e)))?;
        temp_file
            .write_all(value.as_bytes())
            .map_err(|e| store_err(format!("write: {}", e)))?;
        temp_file
            .flush()
            .map_err(|e| store_err(format!("flush: {}", e)))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| store_err(format!("fsync: {}", e)))?;
        temp_file
            .persist(self.storage.key_file(key))
            .map_err(|e| store_err(format!("persist: {}", e.error)))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.storage.key_file(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(KeeperError::Io {
                context: format!("remove {}", key),
                source,
            }),
        }
    }
}

/// Process-local store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values().remove(key);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Typed record stores
// ═══════════════════════════════════════════════════════════════════════════════

fn read_record<T: DeserializeOwned>(kv: &dyn KeyValueStore, key: &str) -> Option<T> {
    let content = match kv.get(key) {
        Ok(Some(content)) => content,
        Ok(None) => return None,
        Err(err) => {
            warn!(key, error = %err, "Failed to read record; treating as absent");
            return None;
        }
    };

    if content.trim().is_empty() {
        debug!(key, "Empty record; treating as absent");
        return None;
    }

    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, error = %err, "Corrupt record; treating as absent");
            None
        }
    }
}

fn write_record<T: Serialize>(kv: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let content = serde_json::to_string(value).map_err(|source| KeeperError::Json {
        context: format!("serialize {}", key),
        source,
    })?;
    kv.set(key, &content)
}

/// Crash-recovery snapshot record.
#[derive(Clone)]
pub struct SnapshotStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SnapshotStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub fn write(&self, snapshot: &Snapshot) -> Result<()> {
        write_record(self.kv.as_ref(), SNAPSHOT_KEY, snapshot)
    }

    pub fn read(&self) -> Option<Snapshot> {
        read_record(self.kv.as_ref(), SNAPSHOT_KEY)
    }

    pub fn clear(&self) -> Result<()> {
        self.kv.remove(SNAPSHOT_KEY)
    }
}

/// Identity → cwd side table record.
#[derive(Clone)]
pub struct CwdMapStore {
    kv: Arc<dyn KeyValueStore>,
}

impl CwdMapStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub fn write(&self, map: &CwdMap) -> Result<()> {
        write_record(self.kv.as_ref(), CWD_MAP_KEY, map)
    }

    pub fn read(&self) -> Option<CwdMap> {
        read_record(self.kv.as_ref(), CWD_MAP_KEY)
    }

    pub fn clear(&self) -> Result<()> {
        self.kv.remove(CWD_MAP_KEY)
    }
}
