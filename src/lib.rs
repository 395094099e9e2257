//! # ddiff
//!
//! Discrepancy detection between the result sets of two SQL queries, run against
//! the same or different databases, with recursive drill-down and a two-pass
//! filter for discrepancies that do not reproduce.

pub mod cli;
pub mod commands;
pub mod config;
pub mod data;
pub mod dialect;
pub mod drill;
pub mod error;
pub mod flake;
pub mod orchestrator;
pub mod output;
pub mod progress;
pub mod pump;
pub mod report;
pub mod selector;
pub mod source;
pub mod spec;
pub mod staging;

pub use config::Config;
pub use error::{DdiffError, Result};
pub use orchestrator::{Orchestrator, RunOptions};
pub use report::{RunSummary, SpecResult};

/// Value columns of the snapshot table
pub const SNAPSHOT_WIDTH: usize = 50;

/// Value columns of the persisted-discrepancy table
pub const PERSISTED_WIDTH: usize = 100;

/// Default number of rows fetched per batch
pub const DEFAULT_FETCH_BATCH: usize = 5000;

/// Default ceiling of rows pumped per side
pub const DEFAULT_MAX_FETCH_ROWS: u64 = 1_000_000;

/// Default discrepancy count up to which a nested spec is drilled into
pub const DEFAULT_DRILL_DOWN_LIMIT: usize = 1000;

/// Default multiplier of the drill-down limit in two-pass mode
pub const DEFAULT_TWO_PASS_MULTIPLIER: usize = 100;

/// Default number of parameter rows rendered into one query
pub const DEFAULT_PARAM_BATCH: usize = 200;
