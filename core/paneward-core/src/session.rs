//! Session identity, cwd validity and display naming.
//!
//! # Identity
//!
//! A terminal's OS pid only arrives asynchronously, so it can't key the
//! tracker at creation time. Sessions are keyed by `"{name}-{label}"` where
//! `label` is the creation-time label the host attached to the pane
//! (`default` when it reported none).
//!
//! # Validity
//!
//! Every fallback path in the host ends up reporting the home directory or
//! `/` when it has nothing better, so both count as "unknown" and may never
//! overwrite a directory we already know.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::host::TerminalInfo;

pub const DEFAULT_LABEL: &str = "default";

/// Stable key for a terminal session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionIdentity(String);

impl SessionIdentity {
    pub fn derive(name: &str, label: Option<&str>) -> Self {
        let label = label
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_LABEL);
        SessionIdentity(format!("{}-{}", name.trim(), label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionIdentity {
    fn from(value: &str) -> Self {
        SessionIdentity(value.to_string())
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A live terminal as the core sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedSession {
    pub identity: SessionIdentity,
    pub info: TerminalInfo,
}

impl TrackedSession {
    pub fn from_info(info: TerminalInfo) -> Self {
        let identity = SessionIdentity::derive(&info.name, info.creation_label.as_deref());
        Self { identity, info }
    }

    pub fn display_name(&self) -> &str {
        &self.info.name
    }
}

/// Strips trailing slashes, keeping `/` for root (and for all-slash input).
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Non-empty, not the filesystem root, not the home directory.
pub fn is_valid_cwd(path: &Path, home: Option<&Path>) -> bool {
    let normalized = normalize_path(&path.to_string_lossy());
    if normalized.trim().is_empty() || normalized == "/" {
        return false;
    }
    match home {
        Some(home) => normalized != normalize_path(&home.to_string_lossy()),
        None => true,
    }
}

/// Last path component, used as the pane name when auto-naming is on.
pub fn folder_name(cwd: &Path) -> Option<String> {
    cwd.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}

/// Name given to a pane created for `cwd`.
///
/// Auto-naming wins; otherwise the saved name, falling back to the folder
/// name and finally to a generic label.
pub fn display_name_for(cwd: &Path, saved_name: Option<&str>, auto_name: bool) -> String {
    let saved = saved_name.map(str::trim).filter(|name| !name.is_empty());
    let folder = folder_name(cwd);
    let chosen = if auto_name {
        folder.or_else(|| saved.map(str::to_string))
    } else {
        saved.map(str::to_string).or(folder)
    };
    chosen.unwrap_or_else(|| "terminal".to_string())
}

/// Case-insensitive comparison treating `-` and `_` as the same character.
pub fn names_match(left: &str, right: &str) -> bool {
    fn fold(value: &str) -> String {
        value
            .trim()
            .chars()
            .map(|c| if c == '_' { '-' } else { c })
            .flat_map(char::to_lowercase)
            .collect()
    }
    let left = fold(left);
    !left.is_empty() && left == fold(right)
}

pub(crate) fn home_dir() -> Option<PathBuf> {
    dirs::home_dir()
}
