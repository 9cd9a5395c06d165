//! paneward: inspect terminal tracking state outside the editor.
//!
//! ## Subcommands
//!
//! - `resolve`: Run the cwd resolution chain for a described terminal
//! - `classify`: Report whether the tool under a shell pid is working
//! - `snapshot show|clear`: Inspect or discard the crash-recovery records
//! - `plan`: Print the split plan for a rows x cols grid
//! - `dimensions`: Compute rows x cols of a host editor layout

mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use paneward_core::process::LiveProcesses;
use paneward_core::{load_settings, StorageConfig};

use crate::commands::{Context, ResolveArgs};

#[derive(Parser)]
#[command(name = "paneward")]
#[command(about = "Terminal cwd tracking and crash-recovery inspector")]
#[command(version)]
struct Cli {
    /// Storage root (defaults to ~/.paneward)
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Settings file (defaults to <root>/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the working directory of a terminal
    Resolve {
        /// Terminal display name
        name: String,

        /// Creation-time label
        #[arg(long)]
        label: Option<String>,

        /// Shell process ID
        #[arg(long)]
        pid: Option<u32>,

        /// Directory reported by shell integration
        #[arg(long, value_name = "PATH")]
        shell_cwd: Option<PathBuf>,

        /// Directory the terminal was created with
        #[arg(long, value_name = "PATH")]
        creation_cwd: Option<PathBuf>,

        /// Open project root (repeatable)
        #[arg(long = "workspace", value_name = "PATH")]
        workspace: Vec<PathBuf>,
    },

    /// Classify the foreground tool under a shell pid
    Classify {
        #[arg(value_name = "PID")]
        pid: u32,

        /// Tool name (defaults to toolName from settings)
        #[arg(long)]
        tool: Option<String>,
    },

    /// Inspect or discard the saved snapshot
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },

    /// Print the split plan for a grid
    Plan { rows: u32, cols: u32 },

    /// Compute the grid size of a host editor layout
    Dimensions {
        /// Layout JSON
        #[arg(value_name = "JSON")]
        layout: Option<String>,

        /// Read the layout JSON from a file
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// Print the snapshot and cwd map
    Show,
    /// Delete the snapshot
    Clear {
        /// Also delete the cwd map
        #[arg(long)]
        all: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    let storage = cli
        .root
        .clone()
        .map(StorageConfig::with_root)
        .unwrap_or_default();
    let _logging_guard = logging::init(&storage.logs_dir());

    let config_path = cli.config.clone().unwrap_or_else(|| storage.config_file());
    let ctx = Context {
        settings: load_settings(&config_path),
        storage,
    };

    let result = match cli.command {
        Commands::Resolve {
            name,
            label,
            pid,
            shell_cwd,
            creation_cwd,
            workspace,
        } => commands::resolve(
            &ctx,
            ResolveArgs {
                name,
                label,
                pid,
                shell_cwd,
                creation_cwd,
                workspace,
            },
            &LiveProcesses,
        ),
        Commands::Classify { pid, tool } => commands::classify(&ctx, pid, tool),
        Commands::Snapshot { action } => match action {
            SnapshotAction::Show => commands::snapshot_show(&ctx),
            SnapshotAction::Clear { all } => commands::snapshot_clear(&ctx, all),
        },
        Commands::Plan { rows, cols } => commands::plan(rows, cols),
        Commands::Dimensions { layout, file } => {
            commands::dimensions_of(layout.as_deref(), file.as_deref())
        }
    };

    match result {
        Ok(output) => println!("{}", output),
        Err(e) => {
            tracing::error!(error = %e, "paneward command failed");
            std::process::exit(1);
        }
    }
}
