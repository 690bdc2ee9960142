use crate::diff_stat::FileDiffStat;
use crate::error::Result;
use crate::metrics::MetricParser;
use crate::model::{Commit, Metric, MetricInfo};
use std::collections::BTreeMap;

pub const TOTAL_LINES_OF_CODE: &str = "TotalLinesOfCode";

/// Extension to language name; the language forms the per-language metric suffix.
const LANGUAGES: &[(&str, &str)] = &[
    ("c", "C"),
    ("h", "C"),
    ("cc", "Cpp"),
    ("cpp", "Cpp"),
    ("hpp", "Cpp"),
    ("css", "CSS"),
    ("go", "Go"),
    ("html", "HTML"),
    ("java", "Java"),
    ("js", "JavaScript"),
    ("json", "JSON"),
    ("md", "Markdown"),
    ("py", "Python"),
    ("rb", "Ruby"),
    ("rs", "Rust"),
    ("sh", "Shell"),
    ("sql", "SQL"),
    ("toml", "TOML"),
    ("ts", "TypeScript"),
    ("yaml", "YAML"),
    ("yml", "YAML"),
];

fn language_for(stat: &FileDiffStat) -> Option<&'static str> {
    let ext = stat.extension()?.to_ascii_lowercase();
    LANGUAGES
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map(|(_, lang)| *lang)
}

fn language_metric(language: &str) -> String {
    format!("{TOTAL_LINES_OF_CODE}_{language}")
}

/// Counts lines of text across the tree, overall and per language.
pub struct LinesOfCodeParser;

impl LinesOfCodeParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LinesOfCodeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricParser for LinesOfCodeParser {
    fn name(&self) -> &str {
        "lines_of_code"
    }

    fn metrics_info(&self) -> Vec<MetricInfo> {
        let mut info = vec![MetricInfo::new(
            TOTAL_LINES_OF_CODE,
            "Total number of lines of text in the repository.",
        )];
        let mut languages: Vec<&str> = LANGUAGES.iter().map(|(_, lang)| *lang).collect();
        languages.sort_unstable();
        languages.dedup();
        info.extend(languages.into_iter().map(|lang| {
            MetricInfo::new(
                language_metric(lang),
                format!("Total number of lines of {lang} in the repository."),
            )
        }));
        info
    }

    fn metrics_from_stat(&self, _commit: &Commit, stats: &[FileDiffStat]) -> Result<Vec<Metric>> {
        let mut total = 0i64;
        let mut by_language: BTreeMap<&'static str, i64> = BTreeMap::new();

        for stat in stats.iter().filter(|s| !s.binary && !s.is_symlink()) {
            let delta = stat.added_count() as i64 - stat.removed_count() as i64;
            total += delta;
            if let Some(lang) = language_for(stat) {
                *by_language.entry(lang).or_insert(0) += delta;
            }
        }

        let mut metrics = vec![Metric::new(TOTAL_LINES_OF_CODE, total)];
        metrics.extend(
            by_language
                .into_iter()
                .map(|(lang, delta)| Metric::new(language_metric(lang), delta)),
        );
        Ok(metrics)
    }
}
