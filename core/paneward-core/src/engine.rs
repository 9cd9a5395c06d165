//! Engine - the entry point a host adapter drives.
//!
//! The engine wires the components together around one shared
//! [`SessionTracker`]:
//! - **activate**: first-run setup, crash reconciliation, snapshot timer
//! - **events**: `on_*` methods the adapter calls as panes open, close, and
//!   report new directories
//! - **commands**: refresh, grid arrangement, new session, status line
//!
//! Like the rest of the core it is synchronous. Host calls go through the
//! [`TerminalHost`] trait and never block on timers.
//!
//! ```rust,ignore
//! let engine = Engine::new(Arc::new(adapter), settings);
//! let report = engine.activate(chrono::Utc::now());
//! // ... host events call engine.on_terminal_opened(&info), etc.
//! engine.deactivate();
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::activity::{ActivityClassifier, ActivitySummary};
use crate::config::Settings;
use crate::error::{KeeperError, Result};
use crate::grid::{arrange_plan, split_plan, GridSize};
use crate::host::{CreateTerminal, NoticeLevel, TerminalHost, TerminalId, TerminalInfo};
use crate::process::{LiveProcesses, ProcessSource};
use crate::reconcile::{ReconcileOutcome, Reconciler, ReplayOptions};
use crate::resolver::{CwdResolver, ResolveInputs, Resolution};
use crate::scheduler::SnapshotScheduler;
use crate::session::{display_name_for, folder_name, home_dir, SessionIdentity, TrackedSession};
use crate::setup::{SetupChecker, SetupStatus};
use crate::storage::StorageConfig;
use crate::store::{
    CwdMapStore, FileKeyValueStore, KeyValueStore, SavedSession, Snapshot, SnapshotStore,
};
use crate::tracker::SessionTracker;

const MISSING_COMMAND_NOTICE: &str =
    "Paneward: custom launch command is empty; new terminals open without it";

/// Result of one refresh for one pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedSession {
    pub id: TerminalId,
    pub identity: SessionIdentity,
    pub resolution: Option<Resolution>,
    /// New pane name when auto-naming renamed it.
    pub renamed_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    pub setup: SetupStatus,
    pub reconcile: ReconcileOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrangeReport {
    pub size: GridSize,
    /// Whether the split plan ran (only from a single group).
    pub built_grid: bool,
    pub moved: usize,
}

/// Everything the snapshot worker shares with the engine.
struct Shared {
    host: Arc<dyn TerminalHost>,
    settings: Settings,
    tracker: Arc<SessionTracker>,
    resolver: CwdResolver,
    snapshots: SnapshotStore,
    cwd_maps: CwdMapStore,
    processes: Arc<dyn ProcessSource>,
}

impl Shared {
    fn refresh_session(
        &self,
        info: TerminalInfo,
        inputs: &ResolveInputs,
    ) -> RefreshedSession {
        let session = TrackedSession::from_info(info);
        let resolution = self.resolver.refresh(&session, inputs);
        let renamed_to = resolution
            .as_ref()
            .and_then(|resolution| self.auto_rename(&session, &resolution.cwd));

        let identity = match &renamed_to {
            Some(name) => {
                SessionIdentity::derive(name, session.info.creation_label.as_deref())
            }
            None => session.identity.clone(),
        };
        RefreshedSession {
            id: session.info.id,
            identity,
            resolution,
            renamed_to,
        }
    }

    fn auto_rename(&self, session: &TrackedSession, cwd: &Path) -> Option<String> {
        if !self.settings.auto_name {
            return None;
        }
        let base = folder_name(cwd)?;
        let claim = self
            .tracker
            .claim_name(&base, session.info.creation_label.as_deref(), cwd);
        if claim.name == session.display_name() {
            return None;
        }
        if let Err(err) = self.host.rename_terminal(session.info.id, &claim.name) {
            warn!(id = session.info.id, error = %err, "Failed to auto-name terminal");
            if claim.inserted {
                self.tracker.evict(&claim.identity);
            }
            return None;
        }
        if claim.identity != session.identity {
            self.tracker.evict(&session.identity);
        }
        debug!(from = %session.identity, to = %claim.identity, "Auto-named terminal");
        Some(claim.name)
    }

    fn refresh_all(&self) -> Vec<RefreshedSession> {
        let table = self.processes.capture();
        let folders = self.host.workspace_folders();
        let inputs = ResolveInputs {
            processes: table.as_ref(),
            workspace_folders: &folders,
        };
        self.host
            .terminals()
            .into_iter()
            .map(|info| self.refresh_session(info, &inputs))
            .collect()
    }

    fn build_snapshot(&self, now: DateTime<Utc>, graceful_exit: bool) -> Snapshot {
        let refreshed = self.refresh_all();
        let view_columns: Vec<(TerminalId, Option<u32>, String)> = self
            .host
            .terminals()
            .into_iter()
            .map(|info| (info.id, info.view_column, info.name))
            .collect();

        let mut sessions = Vec::with_capacity(refreshed.len());
        for entry in refreshed {
            // Unknown directories fall back to home so the pane isn't lost.
            let cwd = entry
                .resolution
                .map(|resolution| resolution.cwd)
                .or_else(|| self.tracker.home().map(Path::to_path_buf));
            let Some(cwd) = cwd else {
                debug!(identity = %entry.identity, "No directory and no home; not saved");
                continue;
            };
            let (view_column, name) = view_columns
                .iter()
                .find(|(id, _, _)| *id == entry.id)
                .map(|(_, column, name)| (*column, Some(name.clone())))
                .unwrap_or((None, None));
            sessions.push(SavedSession {
                cwd,
                name,
                view_column,
            });
        }

        let mut snapshot = Snapshot::new(sessions, now);
        snapshot.graceful_exit = graceful_exit;
        if self.settings.editor_area {
            snapshot.editor_layout = self.host.editor_layout();
        }
        snapshot
    }

    fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        self.snapshots.write(snapshot)?;
        self.cwd_maps.write(&self.tracker.to_map())
    }

    fn snapshot_pass(&self, now: DateTime<Utc>) -> Snapshot {
        let snapshot = self.build_snapshot(now, false);
        match self.persist(&snapshot) {
            Ok(()) => debug!(sessions = snapshot.sessions.len(), "Wrote snapshot"),
            Err(err) => warn!(error = %err, "Snapshot write failed"),
        }
        snapshot
    }
}

pub struct Engine {
    shared: Arc<Shared>,
    kv: Arc<dyn KeyValueStore>,
    classifier: ActivityClassifier,
    scheduler: SnapshotScheduler,
    launch_warning_shown: AtomicBool,
}

impl Engine {
    /// Engine over `~/.paneward` storage and the live process table.
    pub fn new(host: Arc<dyn TerminalHost>, settings: Settings) -> Self {
        let kv: Arc<dyn KeyValueStore> =
            Arc::new(FileKeyValueStore::new(StorageConfig::default()));
        Self::with_components(host, kv, settings, Arc::new(LiveProcesses), home_dir())
    }

    /// Engine with every dependency injected. Used by tests and the CLI.
    pub fn with_components(
        host: Arc<dyn TerminalHost>,
        kv: Arc<dyn KeyValueStore>,
        settings: Settings,
        processes: Arc<dyn ProcessSource>,
        home: Option<PathBuf>,
    ) -> Self {
        let snapshots = SnapshotStore::new(Arc::clone(&kv));
        let cwd_maps = CwdMapStore::new(Arc::clone(&kv));
        let tracker = Arc::new(match cwd_maps.read() {
            Some(map) => SessionTracker::from_map(home, map),
            None => SessionTracker::new(home),
        });
        let resolver = CwdResolver::new(Arc::clone(&tracker), settings.project_roots.clone());
        let classifier = ActivityClassifier::new(settings.tool_name.clone());

        Self {
            shared: Arc::new(Shared {
                host,
                settings,
                tracker,
                resolver,
                snapshots,
                cwd_maps,
                processes,
            }),
            kv,
            classifier,
            scheduler: SnapshotScheduler::new(),
            launch_warning_shown: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.shared.settings
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.shared.tracker
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.shared.snapshots
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────────

    /// Runs first-run setup and crash reconciliation, then arms the
    /// snapshot timer.
    pub fn activate(&self, now: DateTime<Utc>) -> ActivationReport {
        self.launch_warning_shown.store(false, Ordering::SeqCst);
        let shared = &self.shared;

        let setup = SetupChecker::new(Arc::clone(&self.kv))
            .ensure_configured(shared.host.as_ref(), &shared.settings);

        let options = ReplayOptions::from_settings(&shared.settings, self.launch_command());
        let reconcile = Reconciler::new(
            shared.host.as_ref(),
            &shared.snapshots,
            &shared.tracker,
            &options,
        )
        .run(now);

        self.start_scheduler();
        info!(setup = ?setup, outcome = ?reconcile, "Activated");
        ActivationReport { setup, reconcile }
    }

    pub fn start_scheduler(&self) {
        let shared = Arc::clone(&self.shared);
        self.scheduler
            .start(self.shared.settings.snapshot_interval(), move || {
                shared.snapshot_pass(Utc::now());
            });
    }

    /// Stops the timer and saves the cwd map. No snapshot is written here;
    /// see [`Engine::mark_graceful_exit`].
    pub fn deactivate(&self) {
        self.scheduler.stop();
        if let Err(err) = self.shared.cwd_maps.write(&self.shared.tracker.to_map()) {
            warn!(error = %err, "Failed to save cwd map on deactivate");
        }
        info!("Deactivated");
    }

    /// Writes a snapshot marked as a clean exit, for hosts that give the
    /// add-on time during shutdown. The next activation consumes it
    /// without replaying.
    /// A pass already in flight is waited for, so it can't overwrite the
    /// marker afterwards.
    pub fn mark_graceful_exit(&self, now: DateTime<Utc>) -> Result<()> {
        self.scheduler.stop_and_join();
        let snapshot = self.shared.build_snapshot(now, true);
        self.shared.persist(&snapshot)
    }

    pub fn is_scheduler_running(&self) -> bool {
        self.scheduler.is_running()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Passes
    // ─────────────────────────────────────────────────────────────────────────────

    /// Re-resolves every open pane.
    pub fn refresh_all(&self) -> Vec<RefreshedSession> {
        self.shared.refresh_all()
    }

    /// One periodic pass: refresh, then write the snapshot and cwd map.
    pub fn snapshot_pass(&self, now: DateTime<Utc>) -> Snapshot {
        self.shared.snapshot_pass(now)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Host events
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn on_terminal_opened(&self, info: &TerminalInfo) -> RefreshedSession {
        self.refresh_one(info)
    }

    /// Evicts the in-memory entry only; the durable store is untouched.
    pub fn on_terminal_closed(&self, info: &TerminalInfo) {
        let session = TrackedSession::from_info(info.clone());
        if self.shared.tracker.evict(&session.identity).is_some() {
            debug!(identity = %session.identity, "Evicted closed terminal");
        }
    }

    pub fn on_shell_integration_changed(&self, info: &TerminalInfo) -> RefreshedSession {
        self.refresh_one(info)
    }

    /// A command may have changed directory.
    pub fn on_command_finished(&self, info: &TerminalInfo) -> RefreshedSession {
        self.refresh_one(info)
    }

    fn refresh_one(&self, info: &TerminalInfo) -> RefreshedSession {
        let table = self.shared.processes.capture();
        let folders = self.shared.host.workspace_folders();
        let inputs = ResolveInputs {
            processes: table.as_ref(),
            workspace_folders: &folders,
        };
        self.shared.refresh_session(info.clone(), &inputs)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────────────

    /// Builds a `rows` x `cols` editor grid and moves open panes into it in
    /// reading order.
    pub fn arrange_grid(&self, rows: u32, cols: u32) -> Result<ArrangeReport> {
        let size = GridSize::new(rows.max(1), cols.max(1));
        let host = self.shared.host.as_ref();

        let built_grid = size.cells() > 1 && host.group_count() == 1;
        if built_grid {
            for op in split_plan(size.rows, size.cols) {
                host.apply_layout_op(&op)?;
            }
        } else if host.group_count() < size.cells() {
            warn!(
                groups = host.group_count(),
                rows = size.rows,
                cols = size.cols,
                "Editor already split; arranging into existing groups"
            );
        }

        let terminals = host.terminals();
        let targets = arrange_plan(terminals.len(), size.rows, size.cols);
        for (terminal, group) in terminals.iter().zip(targets) {
            host.move_terminal_to_group(terminal.id, group)?;
        }
        info!(rows = size.rows, cols = size.cols, moved = terminals.len(), "Arranged terminals");
        Ok(ArrangeReport {
            size,
            built_grid,
            moved: terminals.len(),
        })
    }

    /// Opens a pane in `cwd` and types the launch command into it.
    pub fn new_session(&self, cwd: &Path) -> Result<TerminalId> {
        let settings = &self.shared.settings;
        let claim = self
            .shared
            .tracker
            .claim_name(&display_name_for(cwd, None, true), None, cwd);
        let request = CreateTerminal {
            cwd: cwd.to_path_buf(),
            name: claim.name.clone(),
            icon: None,
            view_column: None,
            editor_area: settings.editor_area,
        };
        let id = match self.shared.host.create_terminal(&request) {
            Ok(id) => id,
            Err(err) => {
                if claim.inserted {
                    self.shared.tracker.evict(&claim.identity);
                }
                return Err(err);
            }
        };

        if let Some(command) = self.launch_command() {
            self.shared
                .host
                .send_text(id, &command, settings.timings.launch_delay())?;
        }
        self.shared.host.show_terminal(id)?;
        Ok(id)
    }

    /// Status line over all open panes.
    pub fn activity_summary(&self) -> ActivitySummary {
        let table = self.shared.processes.capture();
        let mut summary = ActivitySummary::new(self.classifier.tool_name());
        for info in self.shared.host.terminals() {
            summary.add(self.classifier.status(table.as_ref(), info.pid));
        }
        summary
    }

    /// Validated launch command. A custom preset without a command warns
    /// once per activation and launches nothing.
    fn launch_command(&self) -> Option<String> {
        match self.shared.settings.launch_command() {
            Ok(command) => command,
            Err(KeeperError::MissingLaunchCommand) => {
                if !self.launch_warning_shown.swap(true, Ordering::SeqCst) {
                    warn!("Custom launch preset has no command");
                    self.shared
                        .host
                        .notify(NoticeLevel::Warning, MISSING_COMMAND_NOTICE);
                }
                None
            }
            Err(err) => {
                warn!(error = %err, "Launch command unavailable");
                None
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.scheduler.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LaunchPreset, ReplayTimings};
    use crate::grid::{GridLayout, LayoutOp};
    use crate::host::MemoryHost;
    use crate::process::{ProcessEntry, StaticProcessTable};
    use crate::resolver::CwdSource;
    use crate::store::MemoryKeyValueStore;

    const HOME: &str = "/home/u";

    fn settings() -> Settings {
        Settings {
            timings: ReplayTimings::immediate(),
            ..Settings::default()
        }
    }

    fn engine_with(
        host: &Arc<MemoryHost>,
        kv: &Arc<MemoryKeyValueStore>,
        settings: Settings,
        processes: StaticProcessTable,
    ) -> Engine {
        Engine::with_components(
            host.clone(),
            kv.clone(),
            settings,
            Arc::new(processes),
            Some(PathBuf::from(HOME)),
        )
    }

    fn engine(host: &Arc<MemoryHost>) -> Engine {
        engine_with(
            host,
            &Arc::new(MemoryKeyValueStore::new()),
            settings(),
            StaticProcessTable::default(),
        )
    }

    #[test]
    fn test_opened_terminal_is_resolved_and_auto_named() {
        let host = Arc::new(MemoryHost::new());
        let engine = engine(&host);
        let id = host.open(TerminalInfo::new(0, "zsh").with_creation_cwd("/p/api"));
        let info = host.terminals()[0].clone();

        let refreshed = engine.on_terminal_opened(&info);
        assert_eq!(refreshed.id, id);
        assert_eq!(refreshed.renamed_to.as_deref(), Some("api"));
        assert_eq!(host.terminals()[0].name, "api");
        assert_eq!(
            engine.tracker().get(&SessionIdentity::from("api-default")),
            Some(PathBuf::from("/p/api"))
        );
        assert_eq!(engine.tracker().get(&SessionIdentity::from("zsh-default")), None);
    }

    #[test]
    fn test_auto_naming_can_be_disabled() {
        let host = Arc::new(MemoryHost::new());
        let settings = Settings {
            auto_name: false,
            ..settings()
        };
        let engine = engine_with(
            &host,
            &Arc::new(MemoryKeyValueStore::new()),
            settings,
            StaticProcessTable::default(),
        );
        host.open(TerminalInfo::new(0, "zsh").with_creation_cwd("/p/api"));
        let refreshed = engine.on_terminal_opened(&host.terminals()[0]);
        assert_eq!(refreshed.renamed_to, None);
        assert_eq!(host.terminals()[0].name, "zsh");
    }

    #[test]
    fn test_shell_integration_update_moves_directory() {
        let host = Arc::new(MemoryHost::new());
        let engine = engine(&host);
        host.open(TerminalInfo::new(0, "api").with_creation_cwd("/p/api"));
        engine.on_terminal_opened(&host.terminals()[0]);

        let moved = host.terminals()[0].clone().with_shell_cwd("/p/api/web");
        host.update(moved.clone());
        let refreshed = engine.on_shell_integration_changed(&moved);
        assert_eq!(
            refreshed.resolution.map(|r| r.source),
            Some(CwdSource::ShellIntegration)
        );
        assert_eq!(refreshed.renamed_to.as_deref(), Some("web"));
    }

    #[test]
    fn test_closing_evicts_memory_only() {
        let host = Arc::new(MemoryHost::new());
        let kv = Arc::new(MemoryKeyValueStore::new());
        let engine = engine_with(&host, &kv, settings(), StaticProcessTable::default());
        host.open(TerminalInfo::new(0, "api").with_creation_cwd("/p/api"));
        let info = host.terminals()[0].clone();
        engine.on_terminal_opened(&info);
        engine.snapshot_pass(Utc::now());

        engine.on_terminal_closed(&info);
        assert!(engine.tracker().is_empty());
        assert_eq!(engine.snapshots().read().map(|s| s.sessions.len()), Some(1));
        assert_eq!(CwdMapStore::new(kv).read().map(|m| m.len()), Some(1));
    }

    #[test]
    fn test_snapshot_pass_falls_back_to_home() {
        let host = Arc::new(MemoryHost::new());
        let engine = engine(&host);
        host.open(TerminalInfo::new(0, "api").with_creation_cwd("/p/api").with_view_column(2));
        host.open(TerminalInfo::new(0, "zsh"));

        let snapshot = engine.snapshot_pass(Utc::now());
        assert!(!snapshot.graceful_exit);
        let cwds: Vec<PathBuf> = snapshot.sessions.iter().map(|s| s.cwd.clone()).collect();
        assert_eq!(cwds, vec![PathBuf::from("/p/api"), PathBuf::from(HOME)]);
        assert_eq!(snapshot.sessions[0].view_column, Some(2));
        assert_eq!(engine.snapshots().read(), Some(snapshot));
    }

    #[test]
    fn test_snapshot_captures_editor_layout() {
        let host = Arc::new(MemoryHost::new());
        host.set_editor_layout(Some(GridLayout::uniform(2, 2)));
        let engine = engine(&host);
        let snapshot = engine.snapshot_pass(Utc::now());
        assert_eq!(snapshot.editor_layout, Some(GridLayout::uniform(2, 2)));
    }

    #[test]
    fn test_process_tree_feeds_refresh() {
        let host = Arc::new(MemoryHost::new());
        let table = StaticProcessTable::new([
            ProcessEntry::new(500, Some(1), "zsh").with_cwd(HOME),
            ProcessEntry::new(501, Some(500), "vim").with_cwd("/p/notes"),
        ]);
        let engine = engine_with(&host, &Arc::new(MemoryKeyValueStore::new()), settings(), table);
        host.open(TerminalInfo::new(0, "zsh").with_pid(500));
        let refreshed = engine.refresh_all();
        assert_eq!(
            refreshed[0].resolution.as_ref().map(|r| r.cwd.clone()),
            Some(PathBuf::from("/p/notes"))
        );
    }

    #[test]
    fn test_graceful_exit_round_trip_skips_replay() {
        let host = Arc::new(MemoryHost::new());
        let kv = Arc::new(MemoryKeyValueStore::new());
        let engine = engine_with(&host, &kv, settings(), StaticProcessTable::default());
        host.open(TerminalInfo::new(0, "api").with_creation_cwd("/p/api"));
        engine.mark_graceful_exit(Utc::now()).unwrap();
        drop(engine);

        let next_host = Arc::new(MemoryHost::new());
        let next = engine_with(&next_host, &kv, settings(), StaticProcessTable::default());
        let report = next.activate(Utc::now());
        assert_eq!(report.reconcile, ReconcileOutcome::GracefulExit);
        assert!(next_host.created().is_empty());
        // The cwd map survived and seeded the new tracker.
        assert_eq!(
            next.tracker().get(&SessionIdentity::from("api-default")),
            Some(PathBuf::from("/p/api"))
        );
        next.deactivate();
        assert!(!next.is_scheduler_running());
    }

    #[test]
    fn test_same_basename_panes_keep_their_directories() {
        let host = Arc::new(MemoryHost::new());
        let engine = engine(&host);
        host.open(TerminalInfo::new(0, "zsh").with_creation_cwd("/x/api"));
        host.open(TerminalInfo::new(0, "zsh").with_creation_cwd("/y/api"));

        engine.snapshot_pass(Utc::now());
        let snapshot = engine.snapshot_pass(Utc::now());
        let cwds: Vec<PathBuf> = snapshot.sessions.iter().map(|s| s.cwd.clone()).collect();
        assert_eq!(cwds, vec![PathBuf::from("/x/api"), PathBuf::from("/y/api")]);

        let names: Vec<String> = host.terminals().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["api".to_string(), "api (2)".to_string()]);
        assert_eq!(
            engine.tracker().get(&SessionIdentity::from("api (2)-default")),
            Some(PathBuf::from("/y/api"))
        );
    }

    #[test]
    fn test_new_session_does_not_clobber_same_basename() {
        let host = Arc::new(MemoryHost::new());
        let engine = engine(&host);
        engine.new_session(Path::new("/x/api")).unwrap();
        engine.new_session(Path::new("/y/api")).unwrap();
        let names: Vec<String> = host.created().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["api".to_string(), "api (2)".to_string()]);
        assert_eq!(
            engine.tracker().get(&SessionIdentity::from("api-default")),
            Some(PathBuf::from("/x/api"))
        );
    }

    /// First capture blocks long enough to still be running when the test
    /// marks a graceful exit.
    struct SlowFirstCapture {
        entered: AtomicBool,
        table: StaticProcessTable,
    }

    impl ProcessSource for SlowFirstCapture {
        fn capture(&self) -> Box<dyn crate::process::ProcessTable> {
            if !self.entered.swap(true, Ordering::SeqCst) {
                std::thread::sleep(std::time::Duration::from_millis(400));
            }
            Box::new(self.table.clone())
        }
    }

    #[test]
    fn test_graceful_exit_waits_for_in_flight_pass() {
        let host = Arc::new(MemoryHost::new());
        let kv = Arc::new(MemoryKeyValueStore::new());
        let processes = Arc::new(SlowFirstCapture {
            entered: AtomicBool::new(false),
            table: StaticProcessTable::default(),
        });
        let settings = Settings {
            snapshot_interval_secs: 1,
            ..settings()
        };
        let engine = Engine::with_components(
            host.clone(),
            kv.clone(),
            settings,
            processes.clone(),
            Some(PathBuf::from(HOME)),
        );
        host.open(TerminalInfo::new(0, "api").with_creation_cwd("/p/api"));

        engine.start_scheduler();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while !processes.entered.load(Ordering::SeqCst) && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(processes.entered.load(Ordering::SeqCst));

        engine.mark_graceful_exit(Utc::now()).unwrap();
        assert!(!engine.is_scheduler_running());
        std::thread::sleep(std::time::Duration::from_millis(500));
        let stored = SnapshotStore::new(kv).read().expect("snapshot");
        assert!(stored.graceful_exit);
    }

    #[test]
    fn test_activation_configures_then_replays() {
        let host = Arc::new(MemoryHost::new());
        let kv = Arc::new(MemoryKeyValueStore::new());
        let engine = engine_with(&host, &kv, settings(), StaticProcessTable::default());
        SnapshotStore::new(kv.clone())
            .write(&Snapshot::new(vec![SavedSession::new("/p/a", Some("a"))], Utc::now()))
            .unwrap();

        let report = engine.activate(Utc::now());
        assert!(matches!(report.setup, SetupStatus::Configured { .. }));
        assert_eq!(report.reconcile.report().map(|r| r.restored_count()), Some(1));
        assert!(engine.is_scheduler_running());
        engine.deactivate();
    }

    #[test]
    fn test_missing_custom_command_warns_once() {
        let host = Arc::new(MemoryHost::new());
        let settings = Settings {
            launch_preset: LaunchPreset::Custom,
            ..settings()
        };
        let engine = engine_with(
            &host,
            &Arc::new(MemoryKeyValueStore::new()),
            settings,
            StaticProcessTable::default(),
        );
        engine.new_session(Path::new("/p/a")).unwrap();
        engine.new_session(Path::new("/p/b")).unwrap();

        let warnings: Vec<_> = host
            .notices()
            .into_iter()
            .filter(|(level, _)| *level == NoticeLevel::Warning)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(host.sent().is_empty());
        assert_eq!(host.created().len(), 2);
    }

    #[test]
    fn test_new_session_sends_launch_command() {
        let host = Arc::new(MemoryHost::new());
        let settings = Settings {
            launch_preset: LaunchPreset::Claude,
            ..settings()
        };
        let engine = engine_with(
            &host,
            &Arc::new(MemoryKeyValueStore::new()),
            settings,
            StaticProcessTable::default(),
        );
        let id = engine.new_session(Path::new("/p/svc")).unwrap();
        assert_eq!(host.created()[0].name, "svc");
        assert_eq!(host.sent()[0].id, id);
        assert_eq!(host.sent()[0].text, "claude");
    }

    #[test]
    fn test_arrange_grid_splits_and_moves() {
        let host = Arc::new(MemoryHost::new());
        let engine = engine(&host);
        for _ in 0..5 {
            host.open(TerminalInfo::new(0, "zsh"));
        }
        let report = engine.arrange_grid(2, 2).unwrap();
        assert!(report.built_grid);
        assert_eq!(
            host.layout_ops(),
            vec![
                LayoutOp::SplitRight,
                LayoutOp::FocusGroup(1),
                LayoutOp::SplitDown,
                LayoutOp::FocusGroup(2),
                LayoutOp::SplitDown,
            ]
        );
        let groups: Vec<u32> = host.moves().into_iter().map(|(_, group)| group).collect();
        assert_eq!(groups, vec![1, 2, 3, 4, 1]);
    }

    #[test]
    fn test_activity_summary_counts_tool_sessions() {
        let host = Arc::new(MemoryHost::new());
        let table = StaticProcessTable::new([
            ProcessEntry::new(10, Some(1), "zsh"),
            ProcessEntry::new(11, Some(10), "claude"),
            ProcessEntry::new(12, Some(11), "git"),
            ProcessEntry::new(20, Some(1), "zsh"),
            ProcessEntry::new(21, Some(20), "claude"),
        ]);
        let engine = engine_with(&host, &Arc::new(MemoryKeyValueStore::new()), settings(), table);
        host.open(TerminalInfo::new(0, "a").with_pid(10));
        host.open(TerminalInfo::new(0, "b").with_pid(20));
        host.open(TerminalInfo::new(0, "c"));

        let summary = engine.activity_summary();
        assert_eq!((summary.working, summary.idle, summary.absent), (1, 1, 1));
        assert_eq!(summary.to_string(), "claude: 1 working, 1 idle");
    }
}
