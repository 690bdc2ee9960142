//! Structured per-file records parsed out of git's unified diff output.

use crate::error::{DebtError, Result};
use serde::Serialize;

const DEV_NULL: &str = "/dev/null";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Deleted,
    Modified,
    Renamed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiffStat {
    pub path: String,
    /// Source path when the file was renamed.
    pub old_path: Option<String>,
    pub status: FileStatus,
    /// Git file mode of the new side (old side for deletions), e.g. `100644`.
    pub mode: Option<String>,
    pub binary: bool,
    pub lines_added: Vec<String>,
    pub lines_removed: Vec<String>,
}

impl FileDiffStat {
    fn new(path: String) -> Self {
        Self {
            path,
            old_path: None,
            status: FileStatus::Modified,
            mode: None,
            binary: false,
            lines_added: Vec::new(),
            lines_removed: Vec::new(),
        }
    }

    pub fn added_count(&self) -> usize {
        self.lines_added.len()
    }

    pub fn removed_count(&self) -> usize {
        self.lines_removed.len()
    }

    pub fn extension(&self) -> Option<&str> {
        let name = self.path.rsplit('/').next()?;
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() {
            None
        } else {
            Some(ext)
        }
    }

    pub fn is_symlink(&self) -> bool {
        self.mode.as_deref() == Some("120000")
    }
}

/// Parse the output of `git diff` (or an equivalent rendering) into one record per file.
pub fn parse_unified_diff(diff: &str) -> Result<Vec<FileDiffStat>> {
    let mut stats = Vec::new();
    let mut current: Option<FileDiffStat> = None;
    let mut in_hunk = false;

    for (lineno, line) in diff.lines().enumerate() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            if let Some(done) = current.take() {
                stats.push(done);
            }
            current = Some(FileDiffStat::new(path_from_git_header(rest)));
            in_hunk = false;
            continue;
        }

        let stat = current.as_mut().ok_or_else(|| {
            DebtError::DiffParse(format!(
                "line {}: content before any `diff --git` header",
                lineno + 1
            ))
        })?;

        if in_hunk {
            if let Some(added) = line.strip_prefix('+') {
                stat.lines_added.push(added.to_string());
                continue;
            }
            if let Some(removed) = line.strip_prefix('-') {
                stat.lines_removed.push(removed.to_string());
                continue;
            }
            if line.starts_with(' ') || line.starts_with('\\') || line.is_empty() {
                continue;
            }
        }

        if line.starts_with("@@") {
            in_hunk = true;
        } else if let Some(mode) = line.strip_prefix("new file mode ") {
            stat.status = FileStatus::Added;
            stat.mode = Some(mode.trim().to_string());
        } else if let Some(mode) = line.strip_prefix("deleted file mode ") {
            stat.status = FileStatus::Deleted;
            stat.mode = Some(mode.trim().to_string());
        } else if let Some(mode) = line.strip_prefix("new mode ") {
            stat.mode = Some(mode.trim().to_string());
        } else if let Some(from) = line.strip_prefix("rename from ") {
            stat.status = FileStatus::Renamed;
            stat.old_path = Some(from.to_string());
        } else if let Some(to) = line.strip_prefix("rename to ") {
            stat.status = FileStatus::Renamed;
            stat.path = to.to_string();
        } else if let Some(mode) = line.strip_prefix("index ") {
            // `index abc..def 100644`
            if stat.mode.is_none() {
                if let Some((_, mode)) = mode.split_once(' ') {
                    stat.mode = Some(mode.trim().to_string());
                }
            }
        } else if line.starts_with("Binary files ") {
            stat.binary = true;
        } else if let Some(old) = line.strip_prefix("--- ") {
            match path_from_file_line(old, "a/") {
                Some(path) => stat.path = path.to_string(),
                None if old.trim() == DEV_NULL => stat.status = FileStatus::Added,
                None => {}
            }
        } else if let Some(new) = line.strip_prefix("+++ ") {
            match path_from_file_line(new, "b/") {
                Some(path) => stat.path = path.to_string(),
                None if new.trim() == DEV_NULL => stat.status = FileStatus::Deleted,
                None => {}
            }
        }
    }

    if let Some(done) = current.take() {
        stats.push(done);
    }
    Ok(stats)
}

/// `a/src/lib.rs b/src/lib.rs` -> `src/lib.rs`. Both halves name the same
/// path unless the file was renamed, so a header whose halves match is split in
/// the middle; otherwise the last ` b/` wins. `---`/`+++` lines refine it later.
fn path_from_git_header(rest: &str) -> String {
    if rest.len() % 2 == 1 {
        let mid = rest.len() / 2;
        let left = rest.get(..mid).and_then(|l| l.strip_prefix("a/"));
        let right = rest.get(mid..).and_then(|r| r.strip_prefix(" b/"));
        if let (Some(left), Some(right)) = (left, right) {
            if left == right {
                return right.to_string();
            }
        }
    }
    if let Some(idx) = rest.rfind(" b/") {
        return rest[idx + 3..].to_string();
    }
    rest.split_whitespace()
        .last()
        .map(|p| p.trim_start_matches("b/").to_string())
        .unwrap_or_default()
}

/// Path out of a `--- a/x` or `+++ b/x` line, `None` for `/dev/null`.
fn path_from_file_line<'a>(rest: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = rest.trim_end_matches(['\t', '\r']);
    if rest == DEV_NULL {
        return None;
    }
    rest.strip_prefix(prefix).filter(|p| !p.is_empty())
}
