//! Storage configuration and path management for Paneward.
//!
//! All file paths live behind `StorageConfig` so tests can inject a temp
//! root with [`StorageConfig::with_root`] instead of touching `~/.paneward`.
//!
//! ```text
//! ~/.paneward/
//! ├── config.toml      # Settings (CLI; hosts usually supply their own)
//! ├── state/           # FileKeyValueStore root, one JSON file per key
//! │   ├── paneward.snapshot.json
//! │   └── paneward.cwdMap.json
//! └── logs/            # Rolling CLI log files
//! ```

use std::path::{Path, PathBuf};

/// Central configuration for all Paneward storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            root: home.join(".paneward"),
        }
    }
}

impl StorageConfig {
    /// Creates a StorageConfig with a custom root directory.
    /// Used for testing with temp directories.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to config.toml (settings).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Directory backing the durable key-value store.
    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// File name used for a store key. Keys are dotted identifiers; anything
    /// outside `[A-Za-z0-9._-]` is replaced so a key can never escape the
    /// state directory.
    pub fn key_file(&self, key: &str) -> PathBuf {
        let sanitized: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.state_dir().join(format!("{}.json", sanitized))
    }
}
