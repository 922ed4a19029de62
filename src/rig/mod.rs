//! Rig layout and worktree provisioning.
//!
//! A rig is a per-repository workspace under the town root: a bare canonical
//! repo at `.repo.git`, durable runtime state under `.runtime`, issue-store
//! data under `.beads`, and one worktree per agent under `<role>/rig` or
//! `{crew,polecats}/<worker>/rig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GtError, Result};
use crate::exec::{Cmd, DEFAULT_TIMEOUT};
use crate::session::env::Role;

/// A per-repository workspace under the town root.
#[derive(Debug, Clone)]
pub struct Rig {
    pub name: String,
    pub path: PathBuf,
    timeout: Duration,
}

impl Rig {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The bare canonical repository backing all worktrees.
    pub fn bare_repo_path(&self) -> PathBuf {
        self.path.join(".repo.git")
    }

    /// Durable runtime state (refinery queue and friends).
    pub fn runtime_dir(&self) -> PathBuf {
        self.path.join(".runtime")
    }

    /// Issue-store data directory (opaque to the engine).
    pub fn beads_dir(&self) -> PathBuf {
        self.path.join(".beads")
    }

    /// Canonical worktree path for a role or worker.
    pub fn work_dir(&self, role: Role, worker: Option<&str>) -> PathBuf {
        match worker {
            Some(worker) => self.path.join(role.plural()).join(worker).join("rig"),
            None => self.path.join(role.as_str()).join("rig"),
        }
    }

    fn git<I, S>(&self, args: I) -> Cmd
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Cmd::new("git").args(args).timeout(self.timeout)
    }

    /// Default branch of the bare repo (`main`/`master` fallback when HEAD
    /// is unset).
    pub async fn default_branch(&self) -> Result<String> {
        let bare = self.bare_repo_path();
        let git_dir = format!("--git-dir={}", bare.display());

        if let Ok(head) = self
            .git([git_dir.as_str(), "symbolic-ref", "--short", "HEAD"])
            .run()
            .await
        {
            // HEAD can point at a branch that was never pushed; verify it.
            if !head.is_empty()
                && self
                    .git([git_dir.as_str(), "rev-parse", "--verify", head.as_str()])
                    .run()
                    .await
                    .is_ok()
            {
                return Ok(head);
            }
        }
        for candidate in ["main", "master"] {
            if self
                .git([git_dir.as_str(), "rev-parse", "--verify", candidate])
                .run()
                .await
                .is_ok()
            {
                return Ok(candidate.to_string());
            }
        }
        Err(GtError::NoCanonicalRepo(bare))
    }

    /// Ensure the worktree for `(role, worker)` exists, creating it from the
    /// bare canonical repo when absent.
    ///
    /// Idempotent: an existing worktree is returned without running git. A
    /// racing creator observes the existing worktree and succeeds. Only the
    /// first worktree can hold the default branch itself; later ones check
    /// out the same commit detached.
    pub async fn ensure_worktree(&self, role: Role, worker: Option<&str>) -> Result<PathBuf> {
        let work_dir = self.work_dir(role, worker);
        if work_dir.is_dir() {
            return Ok(work_dir);
        }

        let bare = self.bare_repo_path();
        if !bare.is_dir() {
            return Err(GtError::NoCanonicalRepo(bare));
        }

        let branch = self.default_branch().await?;
        if let Some(parent) = work_dir.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let git_dir = format!("--git-dir={}", bare.display());
        let target = work_dir.to_string_lossy().to_string();
        let attempt = self
            .git([
                git_dir.as_str(),
                "worktree",
                "add",
                target.as_str(),
                branch.as_str(),
            ])
            .run()
            .await;

        match attempt {
            Ok(_) => {}
            Err(_) if work_dir.is_dir() => {
                // Lost the race; the other creator's worktree is fine.
            }
            Err(_) => {
                self.git([
                    git_dir.as_str(),
                    "worktree",
                    "add",
                    "--detach",
                    target.as_str(),
                    branch.as_str(),
                ])
                .run()
                .await?;
            }
        }

        tracing::info!(rig = %self.name, path = %work_dir.display(), "created worktree");
        Ok(work_dir)
    }
}

/// True when `path` looks like a rig directory (has the bare canonical repo).
pub fn is_rig_dir(path: &Path) -> bool {
    path.join(".repo.git").is_dir()
}
