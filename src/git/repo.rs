use super::CommitSource;
use crate::error::{DebtError, Result};
use crate::model::Commit;
use gix::object::tree::diff::ChangeDetached;
use gix::objs::tree::{EntryKind, EntryMode};
use gix::{discover, ObjectId, Repository, ThreadSafeRepository};
use similar::TextDiff;
use std::path::{Path, PathBuf};
use tracing::debug;

const DEV_NULL: &str = "/dev/null";
const BINARY_SNIFF_LEN: usize = 8000;

pub struct GitRepo {
    repo: ThreadSafeRepository,
    path: PathBuf,
}

impl GitRepo {
    /// Open a repository at `path`, or current dir if `None`
    pub fn open<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let repo_path = match path {
            Some(p) => p.as_ref().to_path_buf(),
            None => std::env::current_dir()?,
        };

        let repo = discover(&repo_path)?;
        let path = repo.workdir().unwrap_or_else(|| repo.path()).to_path_buf();
        debug!(path = %path.display(), "opened repository");

        Ok(Self {
            repo: repo.into_sync(),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn local(&self) -> Repository {
        self.repo.to_thread_local()
    }

    fn render_changes(&self, repo: &Repository, changes: Vec<ChangeDetached>) -> Result<String> {
        let mut out = String::new();
        for change in changes {
            match change {
                ChangeDetached::Addition {
                    location,
                    entry_mode,
                    id,
                    ..
                } => {
                    let new = load_side(repo, location.to_string(), entry_mode, id)?;
                    render_change(&mut out, None, new);
                }
                ChangeDetached::Deletion {
                    location,
                    entry_mode,
                    id,
                    ..
                } => {
                    let old = load_side(repo, location.to_string(), entry_mode, id)?;
                    render_change(&mut out, old, None);
                }
                ChangeDetached::Modification {
                    location,
                    previous_entry_mode,
                    previous_id,
                    entry_mode,
                    id,
                    ..
                } => {
                    let path = location.to_string();
                    let old = load_side(repo, path.clone(), previous_entry_mode, previous_id)?;
                    let new = load_side(repo, path, entry_mode, id)?;
                    render_change(&mut out, old, new);
                }
                ChangeDetached::Rewrite {
                    source_location,
                    source_entry_mode,
                    source_id,
                    entry_mode,
                    id,
                    location,
                    copy,
                    ..
                } => {
                    // A rename is the source going away plus the target appearing;
                    // a copy leaves the source in place.
                    if !copy {
                        let source = source_location.to_string();
                        let old = load_side(repo, source, source_entry_mode, source_id)?;
                        render_change(&mut out, old, None);
                    }
                    let new = load_side(repo, location.to_string(), entry_mode, id)?;
                    render_change(&mut out, None, new);
                }
            }
        }
        Ok(out)
    }
}

/// `None` for trees and submodules, whose ids are not blobs in this repository.
fn load_side(
    repo: &Repository,
    path: String,
    mode: EntryMode,
    id: ObjectId,
) -> Result<Option<Side>> {
    if !is_file(mode) {
        return Ok(None);
    }
    let data = repo.find_object(id)?.detach().data;
    Ok(Some(Side::new(path, mode, id, data)))
}

impl CommitSource for GitRepo {
    fn list_commits(&self, since: Option<&str>) -> Result<Vec<Commit>> {
        let repo = self.local();
        let mut head = repo.head()?;
        if head.is_unborn() {
            return Ok(Vec::new());
        }
        let head_commit = head.peel_to_commit_in_place()?;

        let mut commits = Vec::new();
        let mut next: Option<ObjectId> = Some(head_commit.id);
        let mut found_since = since.is_none();

        while let Some(commit_id) = next {
            let commit = repo.find_commit(commit_id)?;
            let sha = commit_id.to_string();
            let timestamp = commit.time()?.seconds;
            next = commit.parent_ids().next().map(|id| id.detach());

            let is_since = since == Some(sha.as_str());
            commits.push(Commit::new(sha, timestamp));
            if is_since {
                found_since = true;
                break;
            }
        }

        if !found_since {
            return Err(DebtError::GitRepo(format!(
                "commit {} is not in the first-parent history of HEAD",
                since.unwrap_or_default()
            )));
        }

        commits.reverse();
        debug!(count = commits.len(), "listed commits");
        Ok(commits)
    }

    fn initial_import_diff(&self, sha: &str) -> Result<String> {
        let repo = self.local();
        let tree = repo.find_commit(parse_sha(sha)?)?.tree()?;
        let changes: Vec<ChangeDetached> = repo.diff_tree_to_tree(None, Some(&tree), None)?;
        self.render_changes(&repo, changes)
    }

    fn diff_between(&self, from: &str, to: &str) -> Result<String> {
        let repo = self.local();
        let old_tree = repo.find_commit(parse_sha(from)?)?.tree()?;
        let new_tree = repo.find_commit(parse_sha(to)?)?.tree()?;
        let changes: Vec<ChangeDetached> =
            repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), None)?;
        self.render_changes(&repo, changes)
    }
}

fn parse_sha(sha: &str) -> Result<ObjectId> {
    ObjectId::from_hex(sha.as_bytes())
        .map_err(|e| DebtError::GitRepo(format!("Invalid commit ID '{sha}': {e}")))
}

/// Trees and submodules carry no file content.
fn is_file(mode: EntryMode) -> bool {
    !mode.is_tree() && !mode.is_commit()
}

fn mode_str(mode: EntryMode) -> &'static str {
    match mode.kind() {
        EntryKind::Tree => "040000",
        EntryKind::Blob => "100644",
        EntryKind::BlobExecutable => "100755",
        EntryKind::Link => "120000",
        EntryKind::Commit => "160000",
    }
}

fn is_binary(data: &[u8]) -> bool {
    data.iter().take(BINARY_SNIFF_LEN).any(|&b| b == 0)
}

/// One side of a file change.
struct Side {
    path: String,
    mode: EntryMode,
    id: ObjectId,
    data: Vec<u8>,
}

impl Side {
    fn new(path: String, mode: EntryMode, id: ObjectId, data: Vec<u8>) -> Self {
        Self {
            path,
            mode,
            id,
            data,
        }
    }
}

/// Switching between text and binary, or between a file and a symlink.
fn is_type_change(old: &Side, new: &Side) -> bool {
    is_binary(&old.data) != is_binary(&new.data) || old.mode.is_link() != new.mode.is_link()
}

/// Append the sections for one change. Type changes are written as a
/// deletion followed by an addition.
fn render_change(out: &mut String, old: Option<Side>, new: Option<Side>) {
    match (old, new) {
        (Some(old), Some(new)) if is_type_change(&old, &new) => {
            render_file(out, Some(&old), None);
            render_file(out, None, Some(&new));
        }
        (old, new) => render_file(out, old.as_ref(), new.as_ref()),
    }
}

/// Append one file's section in `git diff` format, with zero context lines.
/// When both sides are given they share a path.
fn render_file(out: &mut String, old: Option<&Side>, new: Option<&Side>) {
    let Some(path) = new.or(old).map(|side| side.path.as_str()) else {
        return;
    };
    out.push_str(&format!("diff --git a/{path} b/{path}\n"));

    let mut same_mode = None;
    match (old, new) {
        (None, Some(n)) => out.push_str(&format!("new file mode {}\n", mode_str(n.mode))),
        (Some(o), None) => out.push_str(&format!("deleted file mode {}\n", mode_str(o.mode))),
        (Some(o), Some(n)) => {
            if o.mode == n.mode {
                same_mode = Some(mode_str(n.mode));
            } else {
                out.push_str(&format!("old mode {}\n", mode_str(o.mode)));
                out.push_str(&format!("new mode {}\n", mode_str(n.mode)));
            }
            if o.id == n.id {
                return;
            }
        }
        (None, None) => return,
    }

    let short = |side: Option<&Side>| {
        side.map(|s| s.id.to_hex_with_len(7).to_string())
            .unwrap_or_else(|| "0000000".to_string())
    };
    out.push_str(&format!("index {}..{}", short(old), short(new)));
    if let Some(mode) = same_mode {
        out.push_str(&format!(" {mode}"));
    }
    out.push('\n');

    let a_label = old.map_or_else(|| DEV_NULL.to_string(), |o| format!("a/{}", o.path));
    let b_label = new.map_or_else(|| DEV_NULL.to_string(), |n| format!("b/{}", n.path));

    let old_data = old.map_or(&[][..], |o| o.data.as_slice());
    let new_data = new.map_or(&[][..], |n| n.data.as_slice());
    if is_binary(old_data) || is_binary(new_data) {
        out.push_str(&format!("Binary files {a_label} and {b_label} differ\n"));
        return;
    }

    let old_text = String::from_utf8_lossy(old_data);
    let new_text = String::from_utf8_lossy(new_data);
    let diff = TextDiff::from_lines(old_text.as_ref(), new_text.as_ref());
    let body = diff
        .unified_diff()
        .context_radius(0)
        .header(&a_label, &b_label)
        .to_string();
    out.push_str(&body);
    if !body.is_empty() && !body.ends_with('\n') {
        out.push('\n');
    }
}
