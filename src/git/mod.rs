pub mod repo;

pub use repo::GitRepo;

use crate::error::Result;
use crate::model::Commit;

/// Supplies the ordered commit sequence and per-commit diffs to the pipeline.
///
/// Implementations are shared across worker threads, hence `Sync`.
pub trait CommitSource: Sync {
    /// First-parent history of HEAD, oldest first. With `since`, the list
    /// starts at that commit.
    fn list_commits(&self, since: Option<&str>) -> Result<Vec<Commit>>;

    /// The whole tree of `sha` rendered as additions.
    fn initial_import_diff(&self, sha: &str) -> Result<String>;

    /// Unified diff from `from` to `to`.
    fn diff_between(&self, from: &str, to: &str) -> Result<String>;
}
