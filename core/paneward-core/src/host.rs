//! Boundary to the host IDE.
//!
//! The core never talks to the editor directly. A thin adapter implements
//! [`TerminalHost`] over the real extension API and forwards host events to
//! [`crate::engine::Engine`]'s `on_*` methods. [`MemoryHost`] is an
//! in-process implementation used by tests and CLI dry runs.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{KeeperError, Result};
use crate::grid::{GridLayout, LayoutOp};

pub type TerminalId = u64;

/// Optional shell-integration capability reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShellIntegration {
    pub cwd: Option<PathBuf>,
}

/// A terminal pane as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalInfo {
    pub id: TerminalId,
    pub name: String,
    /// Creation-time label (part of the session identity).
    pub creation_label: Option<String>,
    /// Shell pid, once the host has resolved it.
    pub pid: Option<u32>,
    /// Directory the pane was created with.
    pub creation_cwd: Option<PathBuf>,
    pub shell_integration: Option<ShellIntegration>,
    /// 1-based editor group the pane sits in.
    pub view_column: Option<u32>,
}

impl TerminalInfo {
    pub fn new(id: TerminalId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            creation_label: None,
            pid: None,
            creation_cwd: None,
            shell_integration: None,
            view_column: None,
        }
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn with_creation_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.creation_cwd = Some(cwd.into());
        self
    }

    pub fn with_shell_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.shell_integration = Some(ShellIntegration {
            cwd: Some(cwd.into()),
        });
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.creation_label = Some(label.into());
        self
    }

    pub fn with_view_column(mut self, column: u32) -> Self {
        self.view_column = Some(column);
        self
    }

    /// Shell-integration cwd, when the capability is present and populated.
    pub fn shell_cwd(&self) -> Option<&PathBuf> {
        self.shell_integration.as_ref()?.cwd.as_ref()
    }
}

/// Request to open a new terminal pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTerminal {
    pub cwd: PathBuf,
    pub name: String,
    pub icon: Option<String>,
    pub view_column: Option<u32>,
    /// Place the pane in the editor area rather than the panel.
    pub editor_area: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
}

/// Host capabilities the core relies on.
pub trait TerminalHost: Send + Sync {
    fn terminals(&self) -> Vec<TerminalInfo>;

    fn create_terminal(&self, request: &CreateTerminal) -> Result<TerminalId>;

    /// Types `text` (followed by Enter) into a terminal once `delay` elapses.
    /// The adapter owns the timer; the call itself must not block.
    fn send_text(&self, id: TerminalId, text: &str, delay: Duration) -> Result<()>;

    fn show_terminal(&self, id: TerminalId) -> Result<()>;

    fn dispose_terminal(&self, id: TerminalId) -> Result<()>;

    fn rename_terminal(&self, id: TerminalId, name: &str) -> Result<()>;

    fn move_terminal_to_group(&self, id: TerminalId, group: u32) -> Result<()>;

    fn editor_layout(&self) -> Option<GridLayout>;

    /// Number of editor groups currently open.
    fn group_count(&self) -> u32;

    fn apply_layout_op(&self, op: &LayoutOp) -> Result<()>;

    /// Currently open project roots.
    fn workspace_folders(&self) -> Vec<PathBuf>;

    /// One-line, non-modal notification.
    fn notify(&self, level: NoticeLevel, message: &str);

    fn update_setting(&self, key: &str, value: serde_json::Value) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-memory host
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentText {
    pub id: TerminalId,
    pub text: String,
    pub delay: Duration,
}

#[derive(Debug, Default)]
struct MemoryHostState {
    terminals: Vec<TerminalInfo>,
    next_id: TerminalId,
    created: Vec<CreateTerminal>,
    disposed: Vec<TerminalId>,
    sent: Vec<SentText>,
    notices: Vec<(NoticeLevel, String)>,
    layout_ops: Vec<LayoutOp>,
    moves: Vec<(TerminalId, u32)>,
    settings: BTreeMap<String, serde_json::Value>,
    layout: Option<GridLayout>,
    groups: u32,
    folders: Vec<PathBuf>,
    failing_cwds: Vec<PathBuf>,
    failing_disposals: Vec<TerminalId>,
}

/// Host that keeps everything in memory and records every call.
#[derive(Debug)]
pub struct MemoryHost {
    state: Mutex<MemoryHostState>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryHostState {
                next_id: 1,
                groups: 1,
                ..MemoryHostState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryHostState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds a pane as if the host had opened it; returns its id.
    pub fn open(&self, mut info: TerminalInfo) -> TerminalId {
        let mut state = self.lock();
        if info.id == 0 {
            info.id = state.next_id;
        }
        state.next_id = state.next_id.max(info.id) + 1;
        let id = info.id;
        state.terminals.push(info);
        id
    }

    /// Replaces a pane's info in place (e.g. the shell pid arrived).
    pub fn update(&self, info: TerminalInfo) {
        let mut state = self.lock();
        if let Some(slot) = state.terminals.iter_mut().find(|t| t.id == info.id) {
            *slot = info;
        }
    }

    pub fn set_workspace_folders(&self, folders: Vec<PathBuf>) {
        self.lock().folders = folders;
    }

    pub fn set_editor_layout(&self, layout: Option<GridLayout>) {
        self.lock().layout = layout;
    }

    /// Makes `create_terminal` fail for this directory.
    pub fn fail_creation_in(&self, cwd: impl Into<PathBuf>) {
        self.lock().failing_cwds.push(cwd.into());
    }

    /// Makes `dispose_terminal` fail for this pane, leaving it open.
    pub fn fail_disposal_of(&self, id: TerminalId) {
        self.lock().failing_disposals.push(id);
    }

    pub fn created(&self) -> Vec<CreateTerminal> {
        self.lock().created.clone()
    }

    pub fn disposed(&self) -> Vec<TerminalId> {
        self.lock().disposed.clone()
    }

    pub fn sent(&self) -> Vec<SentText> {
        self.lock().sent.clone()
    }

    pub fn notices(&self) -> Vec<(NoticeLevel, String)> {
        self.lock().notices.clone()
    }

    pub fn layout_ops(&self) -> Vec<LayoutOp> {
        self.lock().layout_ops.clone()
    }

    pub fn moves(&self) -> Vec<(TerminalId, u32)> {
        self.lock().moves.clone()
    }

    pub fn settings(&self) -> BTreeMap<String, serde_json::Value> {
        self.lock().settings.clone()
    }
}

impl TerminalHost for MemoryHost {
    fn terminals(&self) -> Vec<TerminalInfo> {
        self.lock().terminals.clone()
    }

    fn create_terminal(&self, request: &CreateTerminal) -> Result<TerminalId> {
        let mut state = self.lock();
        if state.failing_cwds.contains(&request.cwd) {
            return Err(KeeperError::host(
                "create_terminal",
                format!("cannot open terminal in {}", request.cwd.display()),
            ));
        }
        let id = state.next_id;
        state.next_id += 1;
        let mut info =
            TerminalInfo::new(id, request.name.clone()).with_creation_cwd(request.cwd.clone());
        info.view_column = request.view_column;
        state.terminals.push(info);
        state.created.push(request.clone());
        Ok(id)
    }

    fn send_text(&self, id: TerminalId, text: &str, delay: Duration) -> Result<()> {
        let mut state = self.lock();
        if !state.terminals.iter().any(|t| t.id == id) {
            return Err(KeeperError::TerminalNotFound(id));
        }
        state.sent.push(SentText {
            id,
            text: text.to_string(),
            delay,
        });
        Ok(())
    }

    fn show_terminal(&self, id: TerminalId) -> Result<()> {
        if self.lock().terminals.iter().any(|t| t.id == id) {
            Ok(())
        } else {
            Err(KeeperError::TerminalNotFound(id))
        }
    }

    fn dispose_terminal(&self, id: TerminalId) -> Result<()> {
        let mut state = self.lock();
        if state.failing_disposals.contains(&id) {
            return Err(KeeperError::host(
                "dispose_terminal",
                format!("terminal {} refused to close", id),
            ));
        }
        let before = state.terminals.len();
        state.terminals.retain(|t| t.id != id);
        if state.terminals.len() == before {
            return Err(KeeperError::TerminalNotFound(id));
        }
        state.disposed.push(id);
        Ok(())
    }

    fn rename_terminal(&self, id: TerminalId, name: &str) -> Result<()> {
        let mut state = self.lock();
        let terminal = state
            .terminals
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(KeeperError::TerminalNotFound(id))?;
        terminal.name = name.to_string();
        Ok(())
    }

    fn move_terminal_to_group(&self, id: TerminalId, group: u32) -> Result<()> {
        let mut state = self.lock();
        let terminal = state
            .terminals
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(KeeperError::TerminalNotFound(id))?;
        terminal.view_column = Some(group);
        state.moves.push((id, group));
        Ok(())
    }

    fn editor_layout(&self) -> Option<GridLayout> {
        self.lock().layout.clone()
    }

    fn group_count(&self) -> u32 {
        self.lock().groups
    }

    fn apply_layout_op(&self, op: &LayoutOp) -> Result<()> {
        let mut state = self.lock();
        match op {
            LayoutOp::SplitRight | LayoutOp::SplitDown => state.groups += 1,
            LayoutOp::FocusGroup(n) if *n == 0 || *n > state.groups => {
                return Err(KeeperError::host(
                    "focus_group",
                    format!("group {} does not exist", n),
                ));
            }
            LayoutOp::FocusGroup(_) => {}
        }
        state.layout_ops.push(*op);
        Ok(())
    }

    fn workspace_folders(&self) -> Vec<PathBuf> {
        self.lock().folders.clone()
    }

    fn notify(&self, level: NoticeLevel, message: &str) {
        self.lock().notices.push((level, message.to_string()));
    }

    fn update_setting(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.lock().settings.insert(key.to_string(), value);
        Ok(())
    }
}
