//! In-memory identity → cwd map.
//!
//! Constructed once by the engine and shared by `Arc` with the resolver, the
//! scheduler and the reconciler. Each read-modify-write of an entry happens
//! under a single lock acquisition, so a refresh pass and an event handler
//! racing on the same identity can't lose an update.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::session::{is_valid_cwd, SessionIdentity};
use crate::store::CwdMap;

/// Pane name reserved for a directory, and the identity it keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameClaim {
    pub name: String,
    pub identity: SessionIdentity,
    /// The entry was created by this claim rather than already held.
    pub inserted: bool,
}

/// Outcome of offering a directory to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    Updated { previous: PathBuf },
    Unchanged,
    /// A sentinel was offered; the stored value (if any) was kept.
    RejectedSentinel,
}

#[derive(Debug)]
pub struct SessionTracker {
    home: Option<PathBuf>,
    entries: Mutex<BTreeMap<SessionIdentity, PathBuf>>,
}

impl SessionTracker {
    pub fn new(home: Option<PathBuf>) -> Self {
        Self {
            home,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Tracker seeded from a persisted cwd map. Sentinel entries are dropped.
    pub fn from_map(home: Option<PathBuf>, map: CwdMap) -> Self {
        let tracker = Self::new(home);
        {
            let mut entries = tracker.lock();
            for (identity, cwd) in map {
                if is_valid_cwd(&cwd, tracker.home.as_deref()) {
                    entries.insert(identity, cwd);
                }
            }
        }
        tracker
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<SessionIdentity, PathBuf>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    pub fn is_valid(&self, cwd: &Path) -> bool {
        is_valid_cwd(cwd, self.home.as_deref())
    }

    pub fn get(&self, identity: &SessionIdentity) -> Option<PathBuf> {
        self.lock().get(identity).cloned()
    }

    /// Stores `cwd` for `identity` unless it is a sentinel. A valid value is
    /// never replaced by a sentinel.
    pub fn record(&self, identity: &SessionIdentity, cwd: &Path) -> RecordOutcome {
        if !self.is_valid(cwd) {
            debug!(identity = %identity, cwd = %cwd.display(), "Ignoring sentinel cwd");
            return RecordOutcome::RejectedSentinel;
        }

        let mut entries = self.lock();
        match entries.insert(identity.clone(), cwd.to_path_buf()) {
            None => RecordOutcome::Inserted,
            Some(previous) if previous.as_path() == cwd => RecordOutcome::Unchanged,
            Some(previous) => RecordOutcome::Updated { previous },
        }
    }

    pub fn evict(&self, identity: &SessionIdentity) -> Option<PathBuf> {
        self.lock().remove(identity)
    }

    /// Reserves a pane name for `cwd`, starting from `base` and trying
    /// `"{base} (2)"`, `"{base} (3)"`, ... until the derived identity is
    /// free or already maps to `cwd`. Another pane's directory is never
    /// overwritten. Sentinel directories get `base` without an entry.
    pub fn claim_name(&self, base: &str, label: Option<&str>, cwd: &Path) -> NameClaim {
        if !self.is_valid(cwd) {
            return NameClaim {
                name: base.to_string(),
                identity: SessionIdentity::derive(base, label),
                inserted: false,
            };
        }

        let mut entries = self.lock();
        let mut attempt = 1u32;
        loop {
            let name = if attempt == 1 {
                base.to_string()
            } else {
                format!("{} ({})", base, attempt)
            };
            let identity = SessionIdentity::derive(&name, label);
            match entries.get(&identity) {
                None => {
                    entries.insert(identity.clone(), cwd.to_path_buf());
                    return NameClaim {
                        name,
                        identity,
                        inserted: true,
                    };
                }
                Some(held) if held.as_path() == cwd => {
                    return NameClaim {
                        name,
                        identity,
                        inserted: false,
                    };
                }
                Some(held) => {
                    debug!(identity = %identity, held = %held.display(), "Name taken by another directory");
                    attempt += 1;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn to_map(&self) -> CwdMap {
        self.lock().clone()
    }
}
