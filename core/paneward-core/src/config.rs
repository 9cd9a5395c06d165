//! Settings loading and the launch-command contract.
//!
//! Hosts normally hand the engine a `Settings` built from their own settings
//! API. The CLI reads `~/.paneward/config.toml` instead; a missing file means
//! defaults and a corrupt one means defaults plus a warning.

use std::path::{Path, PathBuf};
use std::time::Duration;

use fs_err as fs;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{KeeperError, Result};

pub const DEFAULT_TOOL_NAME: &str = "claude";
pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_STALE_AFTER_SECS: u64 = 60 * 60;

/// What to run in a freshly created terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LaunchPreset {
    /// Plain shell, nothing is sent.
    #[default]
    Shell,
    /// The foreground tool itself (`toolName`).
    Claude,
    /// Whatever `customCommand` holds.
    Custom,
}

/// Delays used while replaying sessions. Tests zero these out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReplayTimings {
    /// Pause after disposing host-restored panes.
    pub settle_ms: u64,
    /// Delay before the launch command reaches a new pane's shell.
    pub launch_delay_ms: u64,
    /// Delay before the resume prompt reaches the launched tool.
    pub resume_delay_ms: u64,
}

impl Default for ReplayTimings {
    fn default() -> Self {
        Self {
            settle_ms: 500,
            launch_delay_ms: 1_500,
            resume_delay_ms: 6_000,
        }
    }
}

impl ReplayTimings {
    pub fn immediate() -> Self {
        Self {
            settle_ms: 0,
            launch_delay_ms: 0,
            resume_delay_ms: 0,
        }
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn launch_delay(&self) -> Duration {
        Duration::from_millis(self.launch_delay_ms)
    }

    pub fn resume_delay(&self) -> Duration {
        Duration::from_millis(self.resume_delay_ms)
    }
}

/// Recognized configuration options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub launch_preset: LaunchPreset,
    /// Used when `launch_preset` is `Custom`; empty means "not set".
    pub custom_command: String,
    /// Project roots offered for new sessions and searched by name matching.
    pub project_roots: Vec<PathBuf>,
    /// Open terminals in the editor area (grid of editor groups).
    pub editor_area: bool,
    /// Leave the host's own persistent terminal sessions switched on.
    pub persistent_sessions: bool,
    /// Push recommended host settings on first run.
    pub auto_configure: bool,
    /// Name panes after the last component of their cwd.
    pub auto_name: bool,
    /// Replay the last snapshot after an unexpected host exit.
    pub restore_on_crash: bool,
    /// Foreground tool watched by the activity classifier.
    pub tool_name: String,
    /// Sent to the relaunched tool after crash recovery; empty disables it.
    pub resume_prompt: String,
    pub snapshot_interval_secs: u64,
    pub stale_after_secs: u64,
    pub timings: ReplayTimings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            launch_preset: LaunchPreset::default(),
            custom_command: String::new(),
            project_roots: Vec::new(),
            editor_area: true,
            persistent_sessions: false,
            auto_configure: true,
            auto_name: true,
            restore_on_crash: true,
            tool_name: DEFAULT_TOOL_NAME.to_string(),
            resume_prompt: "continue".to_string(),
            snapshot_interval_secs: DEFAULT_SNAPSHOT_INTERVAL_SECS,
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            timings: ReplayTimings::default(),
        }
    }
}

impl Settings {
    /// The command typed into new panes, if any.
    ///
    /// Errors only when the custom preset is selected without a command; the
    /// caller surfaces that once and skips auto-launch.
    pub fn launch_command(&self) -> Result<Option<String>> {
        match self.launch_preset {
            LaunchPreset::Shell => Ok(None),
            LaunchPreset::Claude => Ok(Some(self.tool_name.clone())),
            LaunchPreset::Custom => {
                let command = self.custom_command.trim();
                if command.is_empty() {
                    Err(KeeperError::MissingLaunchCommand)
                } else {
                    Ok(Some(command.to_string()))
                }
            }
        }
    }

    /// Resume prompt, only when there is a launched tool to receive it.
    pub fn resume_prompt(&self) -> Option<&str> {
        let prompt = self.resume_prompt.trim();
        (!prompt.is_empty()).then_some(prompt)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs.max(1))
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_after_secs.min(i64::MAX as u64) as i64)
    }
}

/// Parses settings from TOML text.
pub fn parse_settings(path: &Path, content: &str) -> Result<Settings> {
    toml::from_str(content).map_err(|e| KeeperError::ConfigMalformed {
        path: path.to_path_buf(),
        details: e.to_string(),
    })
}

/// Loads settings, returning defaults if the file doesn't exist or is corrupt.
pub fn load_settings(path: &Path) -> Settings {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Settings::default(),
        Err(err) => {
            warn!(error = %err, "Failed to read settings; using defaults");
            return Settings::default();
        }
    };

    parse_settings(path, &content).unwrap_or_else(|err| {
        warn!(error = %err, "Settings file malformed; using defaults");
        Settings::default()
    })
}

/// Saves settings as TOML.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| KeeperError::Io {
            context: "create config directory".to_string(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(settings).map_err(|e| KeeperError::ConfigMalformed {
        path: path.to_path_buf(),
        details: e.to_string(),
    })?;
    fs::write(path, content).map_err(|source| KeeperError::Io {
        context: "write config".to_string(),
        source,
    })
}
