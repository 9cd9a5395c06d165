//! Error types for paneward-core operations.
//!
//! Most of the core never surfaces these to the host: the resolver, the
//! reconciler and the activity classifier convert failures into "no
//! information" locally. Errors escape only from configuration loading and
//! the explicit store/host calls that the engine logs and swallows.

use std::path::PathBuf;

/// All errors that can occur in paneward-core operations.
#[derive(Debug, thiserror::Error)]
pub enum KeeperError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Custom launch command selected but no command is set")]
    MissingLaunchCommand,

    // ─────────────────────────────────────────────────────────────────────
    // Persistence Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store write failed for key {key}: {details}")]
    Store { key: String, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Host Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Host operation failed: {operation}: {details}")]
    Host { operation: String, details: String },

    #[error("Terminal not found: {0}")]
    TerminalNotFound(u64),
}

impl KeeperError {
    pub fn host(operation: impl Into<String>, details: impl Into<String>) -> Self {
        KeeperError::Host {
            operation: operation.into(),
            details: details.into(),
        }
    }
}

/// Convenience type alias for Results using KeeperError.
pub type Result<T> = std::result::Result<T, KeeperError>;
