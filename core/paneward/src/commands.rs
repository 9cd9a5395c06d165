//! Subcommand bodies. Each returns the text to print so tests can check it
//! without capturing stdout.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use paneward_core::process::{is_pid_alive, ProcessSource, SysinfoProcessTable};
use paneward_core::resolver::ResolveInputs;
use paneward_core::store::{FileKeyValueStore, KeyValueStore};
use paneward_core::{
    dimensions, split_plan, ActivityClassifier, ActivityStatus, CwdMapStore, CwdResolver,
    GridLayout, KeeperError, SessionTracker, Settings, SnapshotStore, StorageConfig, TerminalInfo,
    ToolActivity, TrackedSession,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] KeeperError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid layout: {0}")]
    InvalidLayout(String),

    #[error("Grid must be at least 1x1")]
    EmptyGrid,
}

pub type CliResult<T> = Result<T, CliError>;

/// Paths and settings every command works against.
pub struct Context {
    pub storage: StorageConfig,
    pub settings: Settings,
}

impl Context {
    fn kv(&self) -> Arc<dyn KeyValueStore> {
        Arc::new(FileKeyValueStore::new(self.storage.clone()))
    }
}

pub struct ResolveArgs {
    pub name: String,
    pub label: Option<String>,
    pub pid: Option<u32>,
    pub shell_cwd: Option<PathBuf>,
    pub creation_cwd: Option<PathBuf>,
    pub workspace: Vec<PathBuf>,
}

pub fn resolve(
    ctx: &Context,
    args: ResolveArgs,
    processes: &dyn ProcessSource,
) -> CliResult<String> {
    let mut info = TerminalInfo::new(0, args.name);
    info.creation_label = args.label;
    info.pid = args.pid;
    if let Some(cwd) = args.shell_cwd {
        info = info.with_shell_cwd(cwd);
    }
    info.creation_cwd = args.creation_cwd;
    let session = TrackedSession::from_info(info);

    let home = dirs::home_dir();
    let tracker = match CwdMapStore::new(ctx.kv()).read() {
        Some(map) => SessionTracker::from_map(home, map),
        None => SessionTracker::new(home),
    };
    let resolver = CwdResolver::new(Arc::new(tracker), ctx.settings.project_roots.clone());

    let table = processes.capture();
    let inputs = ResolveInputs {
        processes: table.as_ref(),
        workspace_folders: &args.workspace,
    };
    Ok(match resolver.resolve(&session, &inputs) {
        Some(resolution) => format!(
            "{}\t{}\t{:?}",
            session.identity,
            resolution.cwd.display(),
            resolution.source
        ),
        None => format!("{}\tunknown", session.identity),
    })
}

pub fn classify(ctx: &Context, pid: u32, tool: Option<String>) -> CliResult<String> {
    let tool = tool.unwrap_or_else(|| ctx.settings.tool_name.clone());
    let classifier = ActivityClassifier::new(tool);
    let activity = if is_pid_alive(pid) {
        classifier.classify(&SysinfoProcessTable::capture(), pid)
    } else {
        tracing::warn!(pid, "No such process");
        ToolActivity::default()
    };
    let status = ActivityStatus::from(activity);
    Ok(serde_json::to_string_pretty(&serde_json::json!({
        "pid": pid,
        "tool": classifier.tool_name(),
        "hasForegroundTool": activity.has_foreground_tool,
        "isActive": activity.is_active,
        "status": status,
    }))?)
}

pub fn snapshot_show(ctx: &Context) -> CliResult<String> {
    let kv = ctx.kv();
    let snapshot = SnapshotStore::new(Arc::clone(&kv)).read();
    let cwd_map = CwdMapStore::new(kv).read();
    Ok(serde_json::to_string_pretty(&serde_json::json!({
        "snapshot": snapshot,
        "cwdMap": cwd_map,
    }))?)
}

pub fn snapshot_clear(ctx: &Context, include_cwd_map: bool) -> CliResult<String> {
    let kv = ctx.kv();
    SnapshotStore::new(Arc::clone(&kv)).clear()?;
    if include_cwd_map {
        CwdMapStore::new(kv).clear()?;
        return Ok("Cleared snapshot and cwd map".to_string());
    }
    Ok("Cleared snapshot".to_string())
}

pub fn plan(rows: u32, cols: u32) -> CliResult<String> {
    if rows == 0 || cols == 0 {
        return Err(CliError::EmptyGrid);
    }
    Ok(serde_json::to_string_pretty(&split_plan(rows, cols))?)
}

/// Reads a host editor layout from `--file`, or treats `input` as inline JSON.
pub fn dimensions_of(input: Option<&str>, file: Option<&Path>) -> CliResult<String> {
    let content = match (file, input) {
        (Some(path), _) => fs_err::read_to_string(path)?,
        (None, Some(json)) => json.to_string(),
        (None, None) => return Err(CliError::InvalidLayout("no layout given".to_string())),
    };
    let layout: GridLayout =
        serde_json::from_str(&content).map_err(|err| CliError::InvalidLayout(err.to_string()))?;
    let size = dimensions(&layout);
    Ok(format!("{}x{}", size.rows, size.cols))
}
