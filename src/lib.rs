//! Track code quality metrics across the history of a git repository.
//!
//! `generate` walks the first-parent history of a repository, runs the
//! configured metric parsers over each commit's diff and stores per-commit
//! deltas plus running totals in SQLite. `serve` exposes the stored history
//! as JSON.

pub mod accumulator;
pub mod cli;
pub mod config;
pub mod database;
pub mod diff_stat;
pub mod error;
pub mod generate;
pub mod git;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod pool;
pub mod server;

pub use error::{DebtError, Result};
