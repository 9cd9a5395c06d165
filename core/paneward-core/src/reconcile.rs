//! Startup crash recovery.
//!
//! Runs once at activation. A snapshot written by the periodic pass is only
//! replayed if the host went away without a graceful exit and the snapshot
//! is recent. Any panes the host restored on its own are replaced, because
//! they come back with the wrong directories and names.
//!
//! Replay is best-effort per pane and [`Reconciler::run`] never fails: the
//! worst case is fewer panes than were saved.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::{ReplayTimings, Settings};
use crate::grid::{split_plan, GridSize};
use crate::host::{CreateTerminal, NoticeLevel, TerminalHost, TerminalId};
use crate::session::display_name_for;
use crate::store::{SavedSession, Snapshot, SnapshotStore};
use crate::tracker::SessionTracker;

/// Inputs the reconciler takes from configuration.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub restore_on_crash: bool,
    pub launch_command: Option<String>,
    pub resume_prompt: Option<String>,
    pub auto_name: bool,
    pub editor_area: bool,
    pub stale_after: chrono::Duration,
    pub timings: ReplayTimings,
}

impl ReplayOptions {
    /// `launch_command` is passed in already validated; a misconfigured
    /// custom preset arrives here as `None`.
    pub fn from_settings(settings: &Settings, launch_command: Option<String>) -> Self {
        Self {
            restore_on_crash: settings.restore_on_crash,
            launch_command,
            resume_prompt: settings.resume_prompt().map(str::to_string),
            auto_name: settings.auto_name,
            editor_area: settings.editor_area,
            stale_after: settings.stale_after(),
            timings: settings.timings.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredSession {
    pub id: TerminalId,
    pub cwd: PathBuf,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedSession {
    pub cwd: PathBuf,
    pub error: String,
}

/// What a replay did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Sessions in the snapshot, before deduplication.
    pub saved: usize,
    /// Host-restored panes that were disposed first.
    pub disposed: usize,
    /// Grid rebuilt before creating panes, if any.
    pub layout: Option<GridSize>,
    pub restored: Vec<RestoredSession>,
    pub failed: Vec<FailedSession>,
}

impl ReplayReport {
    pub fn restored_count(&self) -> usize {
        self.restored.len()
    }

    pub fn all_successful(&self) -> bool {
        self.failed.is_empty()
    }

    /// One-line notification text.
    pub fn summary(&self) -> String {
        format!("Paneward: restored {} terminal(s)", self.restored_count())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Disabled,
    NoSnapshot,
    /// Host exited cleanly; its own restore is trusted.
    GracefulExit,
    Stale { saved_at: i64 },
    Empty,
    Replayed(ReplayReport),
}

impl ReconcileOutcome {
    pub fn report(&self) -> Option<&ReplayReport> {
        match self {
            ReconcileOutcome::Replayed(report) => Some(report),
            _ => None,
        }
    }
}

/// Collapses sessions sharing a `cwd`; the first occurrence wins and order
/// is kept.
pub fn dedupe_by_cwd(sessions: &[SavedSession]) -> Vec<SavedSession> {
    let mut seen = HashSet::new();
    sessions
        .iter()
        .filter(|session| seen.insert(session.cwd.clone()))
        .cloned()
        .collect()
}

pub struct Reconciler<'a> {
    host: &'a dyn TerminalHost,
    snapshots: &'a SnapshotStore,
    tracker: &'a SessionTracker,
    options: &'a ReplayOptions,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        host: &'a dyn TerminalHost,
        snapshots: &'a SnapshotStore,
        tracker: &'a SessionTracker,
        options: &'a ReplayOptions,
    ) -> Self {
        Self {
            host,
            snapshots,
            tracker,
            options,
        }
    }

    pub fn run(&self, now: DateTime<Utc>) -> ReconcileOutcome {
        if !self.options.restore_on_crash {
            debug!("Crash restore disabled");
            return ReconcileOutcome::Disabled;
        }

        let Some(snapshot) = self.snapshots.read() else {
            debug!("No snapshot to reconcile");
            return ReconcileOutcome::NoSnapshot;
        };

        if snapshot.graceful_exit {
            debug!("Previous session exited gracefully; deferring to host restore");
            self.clear_snapshot();
            return ReconcileOutcome::GracefulExit;
        }

        if snapshot.is_stale(now, self.options.stale_after) {
            debug!(saved_at = snapshot.saved_at, "Discarding stale snapshot");
            self.clear_snapshot();
            return ReconcileOutcome::Stale {
                saved_at: snapshot.saved_at,
            };
        }

        if snapshot.sessions.is_empty() {
            debug!("Snapshot has no sessions");
            return ReconcileOutcome::Empty;
        }

        let report = self.replay(&snapshot);
        self.clear_snapshot();

        info!(
            restored = report.restored_count(),
            failed = report.failed.len(),
            disposed = report.disposed,
            "Crash recovery finished"
        );
        self.host.notify(NoticeLevel::Info, &report.summary());
        ReconcileOutcome::Replayed(report)
    }

    fn replay(&self, snapshot: &Snapshot) -> ReplayReport {
        let sessions = dedupe_by_cwd(&snapshot.sessions);
        let mut report = ReplayReport {
            saved: snapshot.sessions.len(),
            ..ReplayReport::default()
        };

        report.disposed = self.dispose_host_restored();
        if report.disposed > 0 {
            std::thread::sleep(self.options.timings.settle());
        }

        report.layout = self.rebuild_layout(snapshot);

        for saved in &sessions {
            match self.replay_one(saved) {
                Ok(restored) => report.restored.push(restored),
                Err(err) => {
                    warn!(cwd = %saved.cwd.display(), error = %err, "Skipping session that failed to restore");
                    report.failed.push(FailedSession {
                        cwd: saved.cwd.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
        report
    }

    fn dispose_host_restored(&self) -> usize {
        let existing = self.host.terminals();
        let mut disposed = 0;
        for terminal in &existing {
            match self.host.dispose_terminal(terminal.id) {
                Ok(()) => disposed += 1,
                Err(err) => warn!(id = terminal.id, error = %err, "Failed to dispose host-restored terminal"),
            }
        }
        if disposed > 0 {
            debug!(disposed, "Disposed host-restored terminals");
        }
        disposed
    }

    fn rebuild_layout(&self, snapshot: &Snapshot) -> Option<GridSize> {
        if !self.options.editor_area {
            return None;
        }
        let size = snapshot.editor_layout.as_ref()?.dimensions();
        if size.cells() <= 1 || self.host.group_count() > 1 {
            return None;
        }

        for op in split_plan(size.rows, size.cols) {
            if let Err(err) = self.host.apply_layout_op(&op) {
                warn!(op = ?op, error = %err, "Layout rebuild stopped early");
                return None;
            }
        }
        debug!(rows = size.rows, cols = size.cols, "Rebuilt editor grid");
        Some(size)
    }

    fn replay_one(&self, saved: &SavedSession) -> crate::error::Result<RestoredSession> {
        let base = display_name_for(&saved.cwd, saved.name.as_deref(), self.options.auto_name);
        // Known-correct directory; don't wait for a live signal.
        let claim = self.tracker.claim_name(&base, None, &saved.cwd);
        let name = claim.name.clone();
        let request = CreateTerminal {
            cwd: saved.cwd.clone(),
            name: name.clone(),
            icon: None,
            view_column: saved.view_column,
            editor_area: self.options.editor_area,
        };
        let id = match self.host.create_terminal(&request) {
            Ok(id) => id,
            Err(err) => {
                if claim.inserted {
                    self.tracker.evict(&claim.identity);
                }
                return Err(err);
            }
        };

        if let Some(command) = &self.options.launch_command {
            if let Err(err) = self
                .host
                .send_text(id, command, self.options.timings.launch_delay())
            {
                warn!(id, error = %err, "Failed to send launch command");
            } else if let Some(prompt) = &self.options.resume_prompt {
                if let Err(err) = self
                    .host
                    .send_text(id, prompt, self.options.timings.resume_delay())
                {
                    warn!(id, error = %err, "Failed to send resume prompt");
                }
            }
        }

        Ok(RestoredSession {
            id,
            cwd: saved.cwd.clone(),
            name,
        })
    }

    fn clear_snapshot(&self) {
        if let Err(err) = self.snapshots.clear() {
            warn!(error = %err, "Failed to clear snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GridLayout, LayoutOp};
    use crate::host::{MemoryHost, TerminalInfo};
    use crate::session::SessionIdentity;
    use crate::store::{KeyValueStore, MemoryKeyValueStore};
    use std::path::Path;
    use std::sync::Arc;

    struct Fixture {
        host: MemoryHost,
        snapshots: SnapshotStore,
        tracker: SessionTracker,
        options: ReplayOptions,
    }

    impl Fixture {
        fn new() -> Self {
            let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
            let mut settings = Settings::default();
            settings.timings = ReplayTimings::immediate();
            Self {
                host: MemoryHost::new(),
                snapshots: SnapshotStore::new(kv),
                tracker: SessionTracker::new(Some(PathBuf::from("/home/u"))),
                options: ReplayOptions::from_settings(&settings, None),
            }
        }

        fn run(&self) -> ReconcileOutcome {
            Reconciler::new(&self.host, &self.snapshots, &self.tracker, &self.options).run(Utc::now())
        }
    }

    fn saved(cwd: &str, name: &str) -> SavedSession {
        SavedSession::new(cwd, Some(name))
    }

    #[test]
    fn test_dedupe_keeps_first_and_is_idempotent() {
        let sessions = vec![saved("/p/a", "a"), saved("/p/a", "a-dup"), saved("/p/b", "b")];
        let once = dedupe_by_cwd(&sessions);
        assert_eq!(once, vec![saved("/p/a", "a"), saved("/p/b", "b")]);
        assert_eq!(dedupe_by_cwd(&once), once);
    }

    #[test]
    fn test_disabled_does_nothing() {
        let mut fixture = Fixture::new();
        fixture.options.restore_on_crash = false;
        fixture
            .snapshots
            .write(&Snapshot::new(vec![saved("/p/a", "a")], Utc::now()))
            .unwrap();
        assert_eq!(fixture.run(), ReconcileOutcome::Disabled);
        assert!(fixture.snapshots.read().is_some());
    }

    #[test]
    fn test_missing_snapshot() {
        assert_eq!(Fixture::new().run(), ReconcileOutcome::NoSnapshot);
    }

    #[test]
    fn test_graceful_snapshot_is_consumed_not_replayed() {
        let fixture = Fixture::new();
        let mut snapshot = Snapshot::new(vec![saved("/p/a", "a")], Utc::now());
        snapshot.graceful_exit = true;
        fixture.snapshots.write(&snapshot).unwrap();
        fixture.host.open(TerminalInfo::new(0, "zsh"));

        assert_eq!(fixture.run(), ReconcileOutcome::GracefulExit);
        assert!(fixture.host.created().is_empty());
        assert!(fixture.host.disposed().is_empty());
        assert!(fixture.snapshots.read().is_none());
    }

    #[test]
    fn test_stale_snapshot_is_cleared() {
        let fixture = Fixture::new();
        let saved_at = Utc::now() - chrono::Duration::hours(2);
        fixture
            .snapshots
            .write(&Snapshot::new(vec![saved("/p/a", "a")], saved_at))
            .unwrap();
        assert!(matches!(fixture.run(), ReconcileOutcome::Stale { .. }));
        assert!(fixture.host.created().is_empty());
        assert!(fixture.snapshots.read().is_none());
    }

    #[test]
    fn test_empty_snapshot_terminates() {
        let fixture = Fixture::new();
        fixture
            .snapshots
            .write(&Snapshot::new(Vec::new(), Utc::now()))
            .unwrap();
        assert_eq!(fixture.run(), ReconcileOutcome::Empty);
        assert!(fixture.host.created().is_empty());
    }

    #[test]
    fn test_replay_disposes_host_restored_panes_first() {
        let fixture = Fixture::new();
        let stale_a = fixture.host.open(TerminalInfo::new(0, "zsh"));
        let stale_b = fixture.host.open(TerminalInfo::new(0, "zsh"));
        fixture
            .snapshots
            .write(&Snapshot::new(vec![saved("/p/a", "a")], Utc::now()))
            .unwrap();

        let outcome = fixture.run();
        let report = outcome.report().unwrap();
        assert_eq!(report.disposed, 2);
        assert_eq!(fixture.host.disposed(), vec![stale_a, stale_b]);
        let open: Vec<String> = fixture.host.terminals().into_iter().map(|t| t.name).collect();
        assert_eq!(open, vec!["a".to_string()]);
    }

    #[test]
    fn test_dispose_failure_does_not_stop_replay() {
        let mut fixture = Fixture::new();
        fixture.options.timings.settle_ms = 40;
        let first = fixture.host.open(TerminalInfo::new(0, "zsh"));
        let stuck = fixture.host.open(TerminalInfo::new(0, "zsh"));
        let third = fixture.host.open(TerminalInfo::new(0, "zsh"));
        fixture.host.fail_disposal_of(stuck);
        fixture
            .snapshots
            .write(&Snapshot::new(vec![saved("/p/a", "a")], Utc::now()))
            .unwrap();

        let started = std::time::Instant::now();
        let outcome = fixture.run();
        assert!(started.elapsed() >= std::time::Duration::from_millis(40));

        let report = outcome.report().unwrap();
        assert_eq!(report.disposed, 2);
        assert_eq!(fixture.host.disposed(), vec![first, third]);
        assert_eq!(report.restored_count(), 1);
        let open: Vec<String> = fixture.host.terminals().into_iter().map(|t| t.name).collect();
        assert_eq!(open, vec!["zsh".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_no_settle_pause_without_host_restored_panes() {
        let mut fixture = Fixture::new();
        fixture.options.timings.settle_ms = 5_000;
        fixture
            .snapshots
            .write(&Snapshot::new(vec![saved("/p/a", "a")], Utc::now()))
            .unwrap();

        let started = std::time::Instant::now();
        let outcome = fixture.run();
        assert!(started.elapsed() < std::time::Duration::from_millis(2_500));
        assert_eq!(outcome.report().unwrap().disposed, 0);
    }

    #[test]
    fn test_replay_keeps_same_named_directories_apart() {
        let fixture = Fixture::new();
        fixture
            .snapshots
            .write(&Snapshot::new(
                vec![saved("/x/api", "api"), saved("/y/api", "api")],
                Utc::now(),
            ))
            .unwrap();

        let outcome = fixture.run();
        let names: Vec<String> = outcome
            .report()
            .unwrap()
            .restored
            .iter()
            .map(|restored| restored.name.clone())
            .collect();
        assert_eq!(names, vec!["api".to_string(), "api (2)".to_string()]);
        assert_eq!(
            fixture.tracker.get(&SessionIdentity::from("api-default")),
            Some(PathBuf::from("/x/api"))
        );
        assert_eq!(
            fixture.tracker.get(&SessionIdentity::from("api (2)-default")),
            Some(PathBuf::from("/y/api"))
        );
    }

    #[test]
    fn test_replay_records_cwd_and_notifies() {
        let fixture = Fixture::new();
        fixture
            .snapshots
            .write(&Snapshot::new(vec![saved("/p/api", "whatever")], Utc::now()))
            .unwrap();

        let outcome = fixture.run();
        let report = outcome.report().unwrap();
        assert_eq!(report.restored[0].name, "api");
        assert_eq!(
            fixture.tracker.get(&SessionIdentity::from("api-default")),
            Some(PathBuf::from("/p/api"))
        );
        assert_eq!(
            fixture.host.notices(),
            vec![(NoticeLevel::Info, "Paneward: restored 1 terminal(s)".to_string())]
        );
        assert!(fixture.snapshots.read().is_none());
    }

    #[test]
    fn test_failed_pane_is_skipped() {
        let fixture = Fixture::new();
        fixture.host.fail_creation_in("/p/broken");
        fixture
            .snapshots
            .write(&Snapshot::new(
                vec![saved("/p/a", "a"), saved("/p/broken", "x"), saved("/p/b", "b")],
                Utc::now(),
            ))
            .unwrap();

        let outcome = fixture.run();
        let report = outcome.report().unwrap();
        assert_eq!(report.restored_count(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].cwd, Path::new("/p/broken"));
        assert!(!report.all_successful());
    }

    #[test]
    fn test_launch_and_resume_are_sent_with_delays() {
        let mut fixture = Fixture::new();
        fixture.options.launch_command = Some("claude".to_string());
        fixture.options.resume_prompt = Some("continue".to_string());
        fixture.options.timings = ReplayTimings::default();
        fixture
            .snapshots
            .write(&Snapshot::new(vec![saved("/p/a", "a")], Utc::now()))
            .unwrap();

        let outcome = fixture.run();
        let id = outcome.report().unwrap().restored[0].id;
        let sent = fixture.host.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!((sent[0].id, sent[0].text.as_str()), (id, "claude"));
        assert_eq!(sent[1].text, "continue");
        assert!(sent[1].delay > sent[0].delay);
    }

    #[test]
    fn test_no_launch_command_means_no_text() {
        let mut fixture = Fixture::new();
        fixture.options.resume_prompt = Some("continue".to_string());
        fixture
            .snapshots
            .write(&Snapshot::new(vec![saved("/p/a", "a")], Utc::now()))
            .unwrap();
        fixture.run();
        assert!(fixture.host.sent().is_empty());
    }

    #[test]
    fn test_saved_grid_is_rebuilt_before_panes() {
        let fixture = Fixture::new();
        let mut snapshot = Snapshot::new(vec![saved("/p/a", "a"), saved("/p/b", "b")], Utc::now());
        snapshot.editor_layout = Some(GridLayout::uniform(1, 2));
        fixture.snapshots.write(&snapshot).unwrap();

        let outcome = fixture.run();
        assert_eq!(outcome.report().unwrap().layout, Some(GridSize::new(1, 2)));
        assert_eq!(fixture.host.layout_ops(), vec![LayoutOp::SplitRight]);
    }
}
