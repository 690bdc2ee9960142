use crate::diff_stat::FileDiffStat;
use crate::error::Result;
use crate::metrics::{count_lines, MetricParser};
use crate::model::{Commit, Metric, MetricInfo};

/// Tracks the net number of lines matching a predicate, optionally limited to
/// files with particular extensions.
pub struct LinePatternParser {
    name: &'static str,
    metric: &'static str,
    description: &'static str,
    extensions: Option<&'static [&'static str]>,
    matches: fn(&str) -> bool,
}

impl LinePatternParser {
    pub fn todo() -> Self {
        Self {
            name: "todo",
            metric: "TODOCount",
            description: "Number of lines containing TODO.",
            extensions: None,
            matches: |line| line.contains("TODO"),
        }
    }

    pub fn python_imports() -> Self {
        Self {
            name: "python_imports",
            metric: "PythonImportCount",
            description: "Number of import statements in python files.",
            extensions: Some(&["py", "pyi"]),
            matches: is_python_import,
        }
    }

    fn applies_to(&self, stat: &FileDiffStat) -> bool {
        if stat.binary {
            return false;
        }
        match self.extensions {
            None => true,
            Some(exts) => stat
                .extension()
                .is_some_and(|ext| exts.iter().any(|e| e.eq_ignore_ascii_case(ext))),
        }
    }
}

fn is_python_import(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("import ") || (line.starts_with("from ") && line.contains(" import "))
}

impl MetricParser for LinePatternParser {
    fn name(&self) -> &str {
        self.name
    }

    fn metrics_info(&self) -> Vec<MetricInfo> {
        vec![MetricInfo::new(self.metric, self.description)]
    }

    fn metrics_from_stat(&self, _commit: &Commit, stats: &[FileDiffStat]) -> Result<Vec<Metric>> {
        let relevant: Vec<&FileDiffStat> = stats.iter().filter(|s| self.applies_to(s)).collect();
        Ok(vec![Metric::new(
            self.metric,
            count_lines(&relevant, self.matches),
        )])
    }
}
