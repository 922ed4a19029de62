//! Shared git-repository fixtures for integration tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// A scratch git repository.
pub struct TestRepo {
    _dir: TempDir,
    pub path: PathBuf,
}

impl TestRepo {
    /// New working repository with user config set for commits.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("repo");
        std::fs::create_dir_all(&path).expect("mkdir repo");

        let repo = Self { _dir: dir, path };
        repo.run(&["init", "--initial-branch=main"]);
        repo.run(&["config", "user.email", "test@example.com"]);
        repo.run(&["config", "user.name", "Test User"]);
        repo
    }

    /// New bare repository (simulating a remote).
    pub fn new_bare() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("remote.git");
        std::fs::create_dir_all(&path).expect("mkdir bare");

        let repo = Self { _dir: dir, path };
        repo.run(&["init", "--bare", "--initial-branch=main"]);
        repo
    }

    pub fn run(&self, args: &[&str]) {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.path)
            .output()
            .expect("run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    pub fn run_output(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.path)
            .output()
            .expect("run git");
        assert!(output.status.success(), "git {args:?} failed");
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// Initial commit with a README; returns the commit sha.
    pub fn initial_commit(&self) -> String {
        self.write_files(&HashMap::from([("README.md", "# Test\n")]));
        self.run(&["add", "README.md"]);
        self.run(&["commit", "-m", "Initial commit"]);
        self.run_output(&["rev-parse", "HEAD"])
    }

    /// `main` or `master`, whichever this git created.
    pub fn main_branch(&self) -> String {
        self.run_output(&["branch", "--show-current"])
    }

    /// Create `branch` from `base` and commit the given files on it.
    pub fn branch_with_commit(
        &self,
        branch: &str,
        base: &str,
        message: &str,
        files: &HashMap<&str, &str>,
    ) {
        self.run(&["checkout", "-b", branch, base]);
        self.add_commit(message, files);
    }

    /// Commit files on the current branch.
    pub fn add_commit(&self, message: &str, files: &HashMap<&str, &str>) {
        self.write_files(files);
        for name in files.keys() {
            self.run(&["add", name]);
        }
        self.run(&["commit", "-m", message]);
    }

    pub fn checkout(&self, branch: &str) {
        self.run(&["checkout", branch]);
    }

    fn write_files(&self, files: &HashMap<&str, &str>) {
        for (name, content) in files {
            let full = self.path.join(name);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).expect("mkdir");
            }
            std::fs::write(full, content).expect("write file");
        }
    }
}

/// Working tree is clean (no staged, unstaged, or untracked changes).
pub fn is_clean(path: &Path) -> bool {
    let output = Command::new("git")
        .args(["status", "--porcelain"])
        .current_dir(path)
        .output()
        .expect("git status");
    output.status.success() && output.stdout.is_empty()
}
