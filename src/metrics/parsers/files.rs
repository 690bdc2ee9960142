use crate::diff_stat::{FileDiffStat, FileStatus};
use crate::error::Result;
use crate::metrics::MetricParser;
use crate::model::{Commit, Metric, MetricInfo};

/// Counts files of a given kind: +1 when one is added, -1 when one is deleted.
pub struct FileKindParser {
    name: &'static str,
    metric: &'static str,
    description: &'static str,
    kind: fn(&FileDiffStat) -> bool,
}

impl FileKindParser {
    pub fn binary_files() -> Self {
        Self {
            name: "binary_files",
            metric: "BinaryFileCount",
            description: "Number of binary files in the repository.",
            kind: |stat| stat.binary,
        }
    }

    pub fn symlinks() -> Self {
        Self {
            name: "symlinks",
            metric: "SymlinkCount",
            description: "Number of symlinks in the repository.",
            kind: FileDiffStat::is_symlink,
        }
    }

    pub fn file_count() -> Self {
        Self {
            name: "file_count",
            metric: "TotalFileCount",
            description: "Number of files in the repository.",
            kind: |_| true,
        }
    }
}

impl MetricParser for FileKindParser {
    fn name(&self) -> &str {
        self.name
    }

    fn metrics_info(&self) -> Vec<MetricInfo> {
        vec![MetricInfo::new(self.metric, self.description)]
    }

    fn metrics_from_stat(&self, _commit: &Commit, stats: &[FileDiffStat]) -> Result<Vec<Metric>> {
        let delta: i64 = stats
            .iter()
            .filter(|stat| (self.kind)(*stat))
            .map(|stat| match stat.status {
                FileStatus::Added => 1,
                FileStatus::Deleted => -1,
                FileStatus::Modified | FileStatus::Renamed => 0,
            })
            .sum();
        Ok(vec![Metric::new(self.metric, delta)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff_stat::parse_unified_diff;

    const DIFF: &str = "\
diff --git a/logo.png b/logo.png
new file mode 100644
Binary files /dev/null and b/logo.png differ
diff --git a/old.png b/old.png
deleted file mode 100644
Binary files a/old.png and /dev/null differ
diff --git a/font.ttf b/font.ttf
new file mode 100644
Binary files /dev/null and b/font.ttf differ
diff --git a/current b/current
new file mode 120000
--- /dev/null
+++ b/current
@@ -0,0 +1 @@
+logo.png
diff --git a/README b/README
index 1111111..2222222 100644
--- a/README
+++ b/README
@@ -1 +1 @@
-a
+b
";

    fn value(parser: FileKindParser) -> i64 {
        let stats = parse_unified_diff(DIFF).unwrap();
        parser
            .metrics_from_stat(&Commit::new("e".repeat(40), 0), &stats)
            .unwrap()[0]
            .value
    }

    #[test]
    fn counts_each_file_kind() {
        assert_eq!(value(FileKindParser::binary_files()), 1);
        assert_eq!(value(FileKindParser::symlinks()), 1);
        assert_eq!(value(FileKindParser::file_count()), 2);
    }
}
