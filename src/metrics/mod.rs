//! Metric parsers and the engine that runs them over a commit's diff.
//!
//! A parser declares the metrics it produces up front ([`MetricParser::metrics_info`])
//! and, for every commit, turns the commit's file changes into deltas for those
//! metrics ([`MetricParser::metrics_from_stat`]). Parsers are instantiated once per
//! process through the [`ParserRegistry`] and shared across worker threads.

pub mod engine;
pub mod parsers;
pub mod registry;

pub use engine::MetricEngine;
pub use registry::{ParserRegistry, ParserSelection};

use crate::diff_stat::FileDiffStat;
use crate::error::Result;
use crate::model::{Commit, Metric, MetricInfo};

pub trait MetricParser: Send + Sync {
    /// Registry name of the parser.
    fn name(&self) -> &str;

    /// Every metric this parser may emit.
    fn metrics_info(&self) -> Vec<MetricInfo>;

    /// Deltas contributed by one commit. Zero-valued metrics may be omitted.
    fn metrics_from_stat(&self, commit: &Commit, stats: &[FileDiffStat]) -> Result<Vec<Metric>>;
}

/// Net line delta of `stats` for lines satisfying `pred`.
pub(crate) fn count_lines<F>(stats: &[&FileDiffStat], pred: F) -> i64
where
    F: Fn(&str) -> bool,
{
    stats
        .iter()
        .map(|stat| {
            let added = stat.lines_added.iter().filter(|l| pred(l.as_str())).count() as i64;
            let removed = stat.lines_removed.iter().filter(|l| pred(l.as_str())).count() as i64;
            added - removed
        })
        .sum()
}
