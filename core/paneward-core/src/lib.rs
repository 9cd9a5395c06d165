//! # paneward-core
//!
//! Terminal session tracking and crash recovery for an IDE add-on.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. The only background work is the
//!   snapshot timer thread.
//! - **Host behind a trait**: Everything the editor does goes through
//!   [`host::TerminalHost`]; a thin adapter implements it and forwards events
//!   to [`Engine`].
//! - **Graceful degradation**: Unavailable signals, unreadable records and
//!   failed panes become "no information", never errors at the host boundary.
//! - **One tracker**: The identity → cwd map is owned by the engine and shared
//!   by `Arc`, never global.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use paneward_core::{Engine, Settings};
//!
//! let engine = Engine::new(host, Settings::default());
//! let report = engine.activate(chrono::Utc::now());
//! ```

pub mod activity;
pub mod config;
pub mod engine;
pub mod error;
pub mod grid;
pub mod host;
pub mod process;
pub mod reconcile;
pub mod resolver;
pub mod scheduler;
pub mod session;
pub mod setup;
pub mod storage;
pub mod store;
pub mod tracker;

pub use activity::{ActivityClassifier, ActivityStatus, ActivitySummary, ToolActivity};
pub use config::{load_settings, save_settings, LaunchPreset, ReplayTimings, Settings};
pub use engine::{ActivationReport, ArrangeReport, Engine, RefreshedSession};
pub use error::{KeeperError, Result};
pub use grid::{
    arrange_plan, cell_group_number, dimensions, split_plan, GridLayout, GridSize, LayoutOp,
    Orientation,
};
pub use host::{CreateTerminal, NoticeLevel, TerminalHost, TerminalId, TerminalInfo};
pub use reconcile::{dedupe_by_cwd, ReconcileOutcome, ReplayReport};
pub use resolver::{CwdResolver, CwdSource, Resolution};
pub use session::{SessionIdentity, TrackedSession};
pub use storage::StorageConfig;
pub use store::{CwdMap, CwdMapStore, SavedSession, Snapshot, SnapshotStore};
pub use tracker::{NameClaim, SessionTracker};
