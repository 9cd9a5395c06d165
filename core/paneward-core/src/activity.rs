//! Idle/working detection for the foreground tool in each terminal.
//!
//! The tool is found under the terminal's shell pid. While it waits for
//! input its only children are long-lived helpers (language servers, MCP
//! servers, the node runtime it ships with). Anything else running under it
//! means it is busy.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::debug;

use crate::process::{ProcessEntry, ProcessTable};

/// How deep below the shell the tool may sit (wrappers, `exec` chains).
const TOOL_SEARCH_DEPTH: usize = 4;

/// Fragments naming helpers the tool keeps alive while idle.
static IDLE_HELPER_FRAGMENTS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "node",
        "npm",
        "npx",
        "python",
        "uv",
        "bun",
        "deno",
        "mcp",
        "language-server",
        "langserver",
        "lsp",
    ]
});

static SHELLS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["sh", "bash", "zsh", "fish", "dash", "ksh", "tcsh", "csh", "nu"]
        .into_iter()
        .collect()
});

static UTILITIES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "git", "rg", "grep", "find", "fd", "cat", "ls", "sed", "awk", "head", "tail", "diff",
        "curl", "wget", "ssh", "scp", "rsync", "make", "cargo", "go", "tar", "gh",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ToolActivity {
    pub has_foreground_tool: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Working,
    Idle,
    Absent,
}

impl From<ToolActivity> for ActivityStatus {
    fn from(activity: ToolActivity) -> Self {
        match (activity.has_foreground_tool, activity.is_active) {
            (false, _) => ActivityStatus::Absent,
            (true, true) => ActivityStatus::Working,
            (true, false) => ActivityStatus::Idle,
        }
    }
}

/// What a child of the tool looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChildKind {
    IdleHelper,
    Shell,
    Utility,
    Unrecognized,
}

impl ChildKind {
    fn of(entry: &ProcessEntry) -> Self {
        let name = executable_name(entry);
        if IDLE_HELPER_FRAGMENTS
            .iter()
            .any(|fragment| name.contains(fragment))
        {
            ChildKind::IdleHelper
        } else if SHELLS.contains(name.as_str()) {
            ChildKind::Shell
        } else if UTILITIES.contains(name.as_str()) {
            ChildKind::Utility
        } else {
            ChildKind::Unrecognized
        }
    }

    fn counts_as_work(self) -> bool {
        self != ChildKind::IdleHelper
    }
}

/// Lowercased process name, or argv[0]'s basename when the name is empty.
fn executable_name(entry: &ProcessEntry) -> String {
    let name = if entry.name.is_empty() {
        entry
            .cmd
            .first()
            .and_then(|arg0| Path::new(arg0).file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        entry.name.clone()
    };
    name.trim_start_matches('-').to_ascii_lowercase()
}

pub struct ActivityClassifier {
    tool_name: String,
}

impl ActivityClassifier {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into().trim().to_ascii_lowercase(),
        }
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Exact name, or an argv entry equal to the name or ending in
    /// `/<name>`. `claude-helper` is not `claude`.
    pub fn is_tool(&self, entry: &ProcessEntry) -> bool {
        if self.tool_name.is_empty() {
            return false;
        }
        if entry.name.eq_ignore_ascii_case(&self.tool_name) {
            return true;
        }
        let suffix = format!("/{}", self.tool_name);
        entry.cmd.iter().any(|arg| {
            let arg = arg.to_ascii_lowercase();
            arg == self.tool_name || arg.ends_with(&suffix)
        })
    }

    pub fn classify(&self, processes: &dyn ProcessTable, shell_pid: u32) -> ToolActivity {
        let Some(tool) = processes
            .descendants(shell_pid, TOOL_SEARCH_DEPTH)
            .into_iter()
            .find(|entry| self.is_tool(entry))
        else {
            return ToolActivity::default();
        };

        let busy_child = processes
            .children(tool.pid)
            .into_iter()
            .map(|child| (child, ChildKind::of(child)))
            .find(|(_, kind)| kind.counts_as_work());

        if let Some((child, kind)) = busy_child {
            debug!(
                shell_pid,
                tool_pid = tool.pid,
                child = %child.name,
                kind = ?kind,
                "Tool is working"
            );
        }

        ToolActivity {
            has_foreground_tool: true,
            is_active: busy_child.is_some(),
        }
    }

    pub fn status(&self, processes: &dyn ProcessTable, shell_pid: Option<u32>) -> ActivityStatus {
        match shell_pid {
            Some(pid) => self.classify(processes, pid).into(),
            None => ActivityStatus::Absent,
        }
    }
}

/// Aggregate over all open terminals, rendered as the status line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivitySummary {
    pub tool_name: String,
    pub working: usize,
    pub idle: usize,
    pub absent: usize,
}

impl ActivitySummary {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            ..Self::default()
        }
    }

    pub fn add(&mut self, status: ActivityStatus) {
        match status {
            ActivityStatus::Working => self.working += 1,
            ActivityStatus::Idle => self.idle += 1,
            ActivityStatus::Absent => self.absent += 1,
        }
    }

    pub fn sessions_with_tool(&self) -> usize {
        self.working + self.idle
    }
}

impl fmt::Display for ActivitySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sessions_with_tool() == 0 {
            return write!(f, "{}: none running", self.tool_name);
        }
        write!(
            f,
            "{}: {} working, {} idle",
            self.tool_name, self.working, self.idle
        )
    }
}
