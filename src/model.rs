use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: u32 = 1;

/// A commit as seen by the pipeline: its sha and committer time in unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub timestamp: i64,
}

impl Commit {
    pub fn new(sha: impl Into<String>, timestamp: i64) -> Self {
        Self {
            sha: sha.into(),
            timestamp,
        }
    }

    pub fn short_sha(&self) -> &str {
        self.sha.get(..8).unwrap_or(&self.sha)
    }
}

/// One named delta produced by a metric parser for a single commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: i64,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A metric declared by a parser.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MetricInfo {
    pub name: String,
    pub description: String,
}

impl MetricInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A row of the `metric_names` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub has_data: bool,
}

/// One sample of a metric's running value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub value: i64,
    pub date: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MajorChange {
    pub timestamp: i64,
    pub sha: String,
    pub value: i64,
}
