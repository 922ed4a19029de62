//! Sync/rebase engine: scoped git operations on a worktree.
//!
//! Every operation restores the caller's original checked-out branch on every
//! exit path, and operations on the same worktree are mutually exclusive.
//! Conflicts are recovered locally: the merge or rebase is aborted and the
//! conflicting files are returned as data, never as a hard error.

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;

use crate::error::Result;
use crate::exec::{Cmd, DEFAULT_TIMEOUT};

/// Describes a merge or rebase conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictInfo {
    /// Branch carrying the conflicting work.
    pub branch: String,
    /// Branch it conflicts with.
    pub base_branch: String,
    /// Conflicting files.
    pub files: Vec<String>,
    /// Associated PR number, when known.
    pub pr_number: Option<u64>,
}

/// Result of a rebase operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebaseResult {
    pub branch: String,
    pub base_branch: String,
    pub success: bool,
    pub conflicts: Option<ConflictInfo>,
    /// Number of commits carried by the rebase.
    pub commit_count: usize,
    pub message: String,
}

fn worktree_locks() -> &'static StdMutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>> {
    static LOCKS: OnceLock<StdMutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>> = OnceLock::new();
    LOCKS.get_or_init(Default::default)
}

fn lock_for(work_dir: &Path) -> Arc<AsyncMutex<()>> {
    worktree_locks()
        .lock()
        .unwrap()
        .entry(work_dir.to_path_buf())
        .or_default()
        .clone()
}

/// Restores the original branch when dropped, so a panic or cancellation
/// mid-operation still leaves HEAD where the caller had it.
struct BranchGuard {
    work_dir: PathBuf,
    branch: String,
}

impl Drop for BranchGuard {
    fn drop(&mut self) {
        let _ = std::process::Command::new("git")
            .args(["checkout", self.branch.as_str()])
            .current_dir(&self.work_dir)
            .output();
    }
}

/// Git sync operations scoped to worktrees.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    timeout: Duration,
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SyncEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the per-command deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn git<I, S>(&self, work_dir: &Path, args: I) -> Cmd
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Cmd::new("git").dir(work_dir).args(args).timeout(self.timeout)
    }

    /// Fetch updates from a remote.
    pub async fn fetch(&self, work_dir: &Path, remote: &str) -> Result<()> {
        self.git(work_dir, ["fetch", remote]).run().await?;
        Ok(())
    }

    /// Name of the currently checked-out branch.
    pub async fn current_branch(&self, work_dir: &Path) -> Result<String> {
        self.git(work_dir, ["branch", "--show-current"]).run().await
    }

    /// Probe whether `branch` conflicts with `base_branch` via a dry merge.
    /// Returns `None` when the merge is clean.
    pub async fn conflict_probe(
        &self,
        work_dir: &Path,
        branch: &str,
        base_branch: &str,
    ) -> Result<Option<ConflictInfo>> {
        let lock = lock_for(work_dir);
        let _guard = lock.lock().await;

        let orig = self.current_branch(work_dir).await?;
        self.git(work_dir, ["checkout", branch]).run().await?;
        let _restore = BranchGuard {
            work_dir: work_dir.to_path_buf(),
            branch: orig,
        };

        let merge = self
            .git(work_dir, ["merge", "--no-commit", "--no-ff", base_branch])
            .output()
            .await?;
        let conflict = if merge.status.success() {
            None
        } else {
            Some(ConflictInfo {
                branch: branch.to_string(),
                base_branch: base_branch.to_string(),
                files: self.conflicting_files(work_dir).await.unwrap_or_default(),
                pr_number: None,
            })
        };

        // Abort regardless of outcome; a clean --no-commit merge still leaves
        // MERGE_HEAD behind.
        let _ = self.git(work_dir, ["merge", "--abort"]).output().await;

        Ok(conflict)
    }

    /// Rebase `branch` onto `onto_branch`. Conflicts abort the rebase and are
    /// returned in the result rather than as an error.
    pub async fn rebase(
        &self,
        work_dir: &Path,
        branch: &str,
        onto_branch: &str,
    ) -> Result<RebaseResult> {
        let lock = lock_for(work_dir);
        let _guard = lock.lock().await;

        let orig = self.current_branch(work_dir).await?;
        self.git(work_dir, ["checkout", branch]).run().await?;
        let _restore = BranchGuard {
            work_dir: work_dir.to_path_buf(),
            branch: orig,
        };

        let range = format!("{onto_branch}..{branch}");
        let commit_count = self
            .git(work_dir, ["rev-list", "--count", range.as_str()])
            .run()
            .await
            .ok()
            .and_then(|out| out.parse::<usize>().ok())
            .unwrap_or(0);

        let rebase = self.git(work_dir, ["rebase", onto_branch]).output().await?;
        if !rebase.status.success() {
            let files = self.conflicting_files(work_dir).await.unwrap_or_default();
            let _ = self.git(work_dir, ["rebase", "--abort"]).output().await;

            let message = format!("Rebase failed with conflicts in {} file(s)", files.len());
            return Ok(RebaseResult {
                branch: branch.to_string(),
                base_branch: onto_branch.to_string(),
                success: false,
                conflicts: Some(ConflictInfo {
                    branch: branch.to_string(),
                    base_branch: onto_branch.to_string(),
                    files,
                    pr_number: None,
                }),
                commit_count: 0,
                message,
            });
        }

        Ok(RebaseResult {
            branch: branch.to_string(),
            base_branch: onto_branch.to_string(),
            success: true,
            conflicts: None,
            commit_count,
            message: format!("Rebased {commit_count} commit(s) onto {onto_branch}"),
        })
    }

    /// Force-push a branch, refusing to clobber unseen remote work.
    pub async fn force_push(&self, work_dir: &Path, remote: &str, branch: &str) -> Result<()> {
        self.git(work_dir, ["push", "--force-with-lease", remote, branch])
            .run()
            .await?;
        Ok(())
    }

    /// Files in conflicted (unmerged) state.
    async fn conflicting_files(&self, work_dir: &Path) -> Result<Vec<String>> {
        let out = self
            .git(work_dir, ["diff", "--name-only", "--diff-filter=U"])
            .run()
            .await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }
}
