//! Working-directory resolution for terminal sessions.
//!
//! No single host signal is reliable across a terminal's life: a fresh pane
//! has only its creation option, a host-restored pane may have nothing, and
//! shell integration shows up a few seconds late. Signals are therefore
//! tried in strict priority order and the first **valid** value wins
//! (see [`crate::session::is_valid_cwd`]):
//!
//! 1. Stored tracker value for the identity
//! 2. Host shell-integration cwd
//! 3. Creation-time cwd option
//! 4. Process tree under the shell pid (children, grandchildren, then the
//!    shell itself)
//! 5. Display-name match against open project roots and the entries of the
//!    configured search roots
//!
//! Nothing here fails: an unavailable signal just falls through.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;
use walkdir::WalkDir;

use crate::process::ProcessTable;
use crate::session::{folder_name, names_match, TrackedSession};
use crate::tracker::SessionTracker;

/// Children plus grandchildren, to see past a login-shell hop.
const PROCESS_TREE_DEPTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CwdSource {
    Stored,
    ShellIntegration,
    CreationOption,
    ProcessTree,
    NameMatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub cwd: PathBuf,
    pub source: CwdSource,
}

/// Per-pass inputs that come from outside the tracker.
pub struct ResolveInputs<'a> {
    pub processes: &'a dyn ProcessTable,
    /// Currently open project roots.
    pub workspace_folders: &'a [PathBuf],
}

pub struct CwdResolver {
    tracker: Arc<SessionTracker>,
    search_roots: Vec<PathBuf>,
}

impl CwdResolver {
    pub fn new(tracker: Arc<SessionTracker>, search_roots: Vec<PathBuf>) -> Self {
        Self {
            tracker,
            search_roots,
        }
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    /// Full chain, stored value first.
    pub fn resolve(&self, session: &TrackedSession, inputs: &ResolveInputs) -> Option<Resolution> {
        self.stored(session)
            .or_else(|| self.shell_integration(session))
            .or_else(|| self.creation_option(session))
            .or_else(|| self.process_tree(session, inputs.processes))
            .or_else(|| self.name_match(session, inputs.workspace_folders))
    }

    /// Re-resolves a session from live signals and records what it finds.
    ///
    /// Live signals (shell integration, process tree) may move a known
    /// directory; when they have nothing the full chain runs, so the stored
    /// value is kept. A sentinel never replaces a valid value.
    pub fn refresh(&self, session: &TrackedSession, inputs: &ResolveInputs) -> Option<Resolution> {
        let resolution = self
            .shell_integration(session)
            .or_else(|| self.process_tree(session, inputs.processes))
            .or_else(|| self.resolve(session, inputs))?;

        self.tracker.record(&session.identity, &resolution.cwd);
        debug!(
            identity = %session.identity,
            cwd = %resolution.cwd.display(),
            source = ?resolution.source,
            "Refreshed session cwd"
        );
        Some(resolution)
    }

    fn valid(&self, cwd: &Path, source: CwdSource) -> Option<Resolution> {
        self.tracker.is_valid(cwd).then(|| Resolution {
            cwd: cwd.to_path_buf(),
            source,
        })
    }

    fn stored(&self, session: &TrackedSession) -> Option<Resolution> {
        let cwd = self.tracker.get(&session.identity)?;
        self.valid(&cwd, CwdSource::Stored)
    }

    fn shell_integration(&self, session: &TrackedSession) -> Option<Resolution> {
        let cwd = session.info.shell_cwd()?;
        self.valid(cwd, CwdSource::ShellIntegration)
    }

    fn creation_option(&self, session: &TrackedSession) -> Option<Resolution> {
        let cwd = session.info.creation_cwd.as_ref()?;
        self.valid(cwd, CwdSource::CreationOption)
    }

    fn process_tree(
        &self,
        session: &TrackedSession,
        processes: &dyn ProcessTable,
    ) -> Option<Resolution> {
        let pid = session.info.pid?;
        let mut candidates: Vec<u32> = processes
            .descendants(pid, PROCESS_TREE_DEPTH)
            .iter()
            .map(|entry| entry.pid)
            .collect();
        candidates.push(pid);

        let found = candidates.into_iter().find_map(|candidate| {
            processes
                .cwd(candidate)
                .and_then(|cwd| self.valid(&cwd, CwdSource::ProcessTree))
        });
        if found.is_none() {
            debug!(identity = %session.identity, pid, "Process tree had no usable cwd");
        }
        found
    }

    fn name_match(&self, session: &TrackedSession, workspace_folders: &[PathBuf]) -> Option<Resolution> {
        let name = session.display_name();

        let from_workspace = workspace_folders
            .iter()
            .find(|root| folder_name(root).is_some_and(|folder| names_match(name, &folder)));
        if let Some(root) = from_workspace {
            return self.valid(root, CwdSource::NameMatch);
        }

        for root in &self.search_roots {
            if folder_name(root).is_some_and(|folder| names_match(name, &folder)) {
                if let Some(resolution) = self.valid(root, CwdSource::NameMatch) {
                    return Some(resolution);
                }
            }
            if let Some(entry) = find_child_dir(root, name) {
                if let Some(resolution) = self.valid(&entry, CwdSource::NameMatch) {
                    return Some(resolution);
                }
            }
        }
        None
    }
}

/// First directory directly under `root` whose name matches `name`.
fn find_child_dir(root: &Path, name: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .find(|entry| names_match(name, &entry.file_name().to_string_lossy()))
        .map(|entry| entry.into_path())
}
