//! Process-tree inspection.
//!
//! The resolver and the activity classifier both walk the tree under a
//! terminal's shell pid. They do it through [`ProcessTable`] so tests can
//! hand in a fixed tree; production captures one [`SysinfoProcessTable`]
//! per pass. A full `sysinfo` refresh is a single bounded scan, so a pass
//! never waits on an individual process.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use sysinfo::{ProcessRefreshKind, System, UpdateKind};
use tracing::debug;

/// What the core needs to know about one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub parent: Option<u32>,
    pub name: String,
    pub cmd: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl ProcessEntry {
    pub fn new(pid: u32, parent: Option<u32>, name: impl Into<String>) -> Self {
        Self {
            pid,
            parent,
            name: name.into(),
            cmd: Vec::new(),
            cwd: None,
        }
    }

    pub fn with_cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = cmd.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

pub trait ProcessTable {
    fn process(&self, pid: u32) -> Option<&ProcessEntry>;

    /// Direct children of `pid`, ordered by pid.
    fn children(&self, pid: u32) -> Vec<&ProcessEntry>;

    fn cwd(&self, pid: u32) -> Option<PathBuf> {
        self.process(pid).and_then(|entry| entry.cwd.clone())
    }

    /// Breadth-first descendants of `pid` down to `max_depth` levels
    /// (1 = children only).
    fn descendants(&self, pid: u32, max_depth: usize) -> Vec<&ProcessEntry> {
        let mut found = Vec::new();
        let mut queue = VecDeque::from([(pid, 0usize)]);
        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for child in self.children(current) {
                // Guard against pid reuse producing a cycle.
                if child.pid == pid || found.iter().any(|e: &&ProcessEntry| e.pid == child.pid) {
                    continue;
                }
                queue.push_back((child.pid, depth + 1));
                found.push(child);
            }
        }
        found
    }
}

/// Fixed process table, keyed by pid.
#[derive(Debug, Clone, Default)]
pub struct StaticProcessTable {
    entries: HashMap<u32, ProcessEntry>,
}

impl StaticProcessTable {
    pub fn new(entries: impl IntoIterator<Item = ProcessEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|entry| (entry.pid, entry)).collect(),
        }
    }

    pub fn insert(&mut self, entry: ProcessEntry) {
        self.entries.insert(entry.pid, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ProcessTable for StaticProcessTable {
    fn process(&self, pid: u32) -> Option<&ProcessEntry> {
        self.entries.get(&pid)
    }

    fn children(&self, pid: u32) -> Vec<&ProcessEntry> {
        let mut children: Vec<&ProcessEntry> = self
            .entries
            .values()
            .filter(|entry| entry.parent == Some(pid))
            .collect();
        children.sort_by_key(|entry| entry.pid);
        children
    }
}

/// Live process table captured from `sysinfo`.
#[derive(Debug, Clone, Default)]
pub struct SysinfoProcessTable {
    table: StaticProcessTable,
}

impl SysinfoProcessTable {
    /// One scan of every process with argv and cwd.
    pub fn capture() -> Self {
        let mut sys = System::new();
        sys.refresh_processes_specifics(
            ProcessRefreshKind::new()
                .with_cmd(UpdateKind::Always)
                .with_cwd(UpdateKind::Always),
        );

        let entries = sys.processes().iter().map(|(pid, process)| {
            ProcessEntry {
                pid: pid.as_u32(),
                parent: process.parent().map(|parent| parent.as_u32()),
                name: process.name().to_string(),
                cmd: process.cmd().to_vec(),
                cwd: process
                    .cwd()
                    .filter(|cwd| !cwd.as_os_str().is_empty())
                    .map(Path::to_path_buf),
            }
        });
        let table = StaticProcessTable::new(entries);
        debug!(processes = table.len(), "Captured process table");
        Self { table }
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn process(&self, pid: u32) -> Option<&ProcessEntry> {
        self.table.process(pid)
    }

    fn children(&self, pid: u32) -> Vec<&ProcessEntry> {
        self.table.children(pid)
    }

    fn cwd(&self, pid: u32) -> Option<PathBuf> {
        self.table.cwd(pid).or_else(|| proc_cwd(pid))
    }
}

/// Produces a fresh process table for each pass.
pub trait ProcessSource: Send + Sync {
    fn capture(&self) -> Box<dyn ProcessTable>;
}

/// The running system, via `sysinfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveProcesses;

impl ProcessSource for LiveProcesses {
    fn capture(&self) -> Box<dyn ProcessTable> {
        Box::new(SysinfoProcessTable::capture())
    }
}

impl ProcessSource for StaticProcessTable {
    fn capture(&self) -> Box<dyn ProcessTable> {
        Box::new(self.clone())
    }
}

/// Reads `/proc/<pid>/cwd` when sysinfo couldn't report it.
#[cfg(target_os = "linux")]
fn proc_cwd(pid: u32) -> Option<PathBuf> {
    std::fs::read_link(format!("/proc/{}/cwd", pid)).ok()
}

#[cfg(not(target_os = "linux"))]
fn proc_cwd(_pid: u32) -> Option<PathBuf> {
    None
}

pub fn is_pid_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let Ok(pid) = libc::pid_t::try_from(pid) else {
            return false;
        };
        // SAFETY: signal 0 performs only the existence/permission check.
        unsafe { libc::kill(pid, 0) == 0 }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}
