use super::MetricParser;
use crate::diff_stat::{parse_unified_diff, FileDiffStat};
use crate::error::{DebtError, Result};
use crate::model::{Commit, Metric, MetricInfo};
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

/// Runs every configured parser over a commit's diff.
pub struct MetricEngine {
    parsers: Vec<Box<dyn MetricParser>>,
    exclude: Regex,
    info: Vec<MetricInfo>,
    declared: HashSet<String>,
}

impl MetricEngine {
    /// Fails if two parsers (or one parser twice) declare the same metric name.
    pub fn new(parsers: Vec<Box<dyn MetricParser>>, exclude: Regex) -> Result<Self> {
        let mut info = Vec::new();
        let mut declared = HashSet::new();
        for parser in &parsers {
            for metric in parser.metrics_info() {
                if !declared.insert(metric.name.clone()) {
                    return Err(DebtError::DuplicateMetric(metric.name));
                }
                info.push(metric);
            }
        }
        info.sort();

        Ok(Self {
            parsers,
            exclude,
            info,
            declared,
        })
    }

    /// Declared metrics of all parsers, sorted by name.
    pub fn metrics_info(&self) -> &[MetricInfo] {
        &self.info
    }

    pub fn parser_names(&self) -> Vec<&str> {
        self.parsers.iter().map(|p| p.name()).collect()
    }

    /// Parse `diff` and compute the commit's metric deltas.
    pub fn compute(&self, commit: &Commit, diff: &str) -> Result<Vec<Metric>> {
        let stats = parse_unified_diff(diff)?;
        self.compute_from_stats(commit, stats)
    }

    pub fn compute_from_stats(
        &self,
        commit: &Commit,
        stats: Vec<FileDiffStat>,
    ) -> Result<Vec<Metric>> {
        let stats: Vec<FileDiffStat> = stats
            .into_iter()
            .filter(|stat| !self.exclude.is_match(&stat.path))
            .collect();

        let mut metrics = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for parser in &self.parsers {
            let emitted = parser
                .metrics_from_stat(commit, &stats)
                .map_err(|e| match e {
                    err @ DebtError::Computation { .. } => err,
                    other => DebtError::computation(parser.name(), other.to_string()),
                })?;

            for metric in emitted {
                if !self.declared.contains(&metric.name) {
                    return Err(DebtError::UnknownMetric(metric.name));
                }
                if !seen.insert(metric.name.clone()) {
                    return Err(DebtError::DuplicateMetric(metric.name));
                }
                metrics.push(metric);
            }
        }

        debug!(
            commit = commit.short_sha(),
            files = stats.len(),
            metrics = metrics.len(),
            "computed metrics"
        );
        Ok(metrics)
    }
}
