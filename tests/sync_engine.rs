//! End-to-end sync engine tests against real git repositories.

mod common;

use std::collections::HashMap;

use common::{is_clean, TestRepo};
use gastown::epic::SyncEngine;

#[tokio::test]
async fn fetch_from_remote() {
    let remote = TestRepo::new_bare();
    let local = TestRepo::new();
    local.initial_commit();
    let main = local.main_branch();
    local.run(&["remote", "add", "origin", &remote.path.to_string_lossy()]);
    local.run(&["push", "-u", "origin", &main]);

    let sync = SyncEngine::new();
    sync.fetch(&local.path, "origin").await.unwrap();
}

#[tokio::test]
async fn fetch_invalid_remote_surfaces_stderr() {
    let repo = TestRepo::new();
    repo.initial_commit();

    let err = SyncEngine::new()
        .fetch(&repo.path, "nonexistent")
        .await
        .unwrap_err();
    assert!(matches!(err, gastown::GtError::Upstream { .. }));
}

#[tokio::test]
async fn current_branch_tracks_checkout() {
    let repo = TestRepo::new();
    repo.initial_commit();
    let main = repo.main_branch();

    let sync = SyncEngine::new();
    assert_eq!(sync.current_branch(&repo.path).await.unwrap(), main);

    repo.branch_with_commit(
        "feature",
        &main,
        "feature commit",
        &HashMap::from([("feature.txt", "feature content")]),
    );
    assert_eq!(sync.current_branch(&repo.path).await.unwrap(), "feature");
}

#[tokio::test]
async fn conflict_probe_clean_merge() {
    let repo = TestRepo::new();
    repo.initial_commit();
    let main = repo.main_branch();
    repo.branch_with_commit(
        "feature",
        &main,
        "feature commit",
        &HashMap::from([("feature.txt", "feature content")]),
    );
    repo.checkout(&main);

    let sync = SyncEngine::new();
    let conflict = sync
        .conflict_probe(&repo.path, "feature", &main)
        .await
        .unwrap();
    assert!(conflict.is_none());

    // Probe restored the original branch and left the tree clean.
    assert_eq!(sync.current_branch(&repo.path).await.unwrap(), main);
    assert!(is_clean(&repo.path));
}

#[tokio::test]
async fn conflict_probe_detects_conflicting_files() {
    let repo = TestRepo::new();
    repo.initial_commit();
    let main = repo.main_branch();
    repo.branch_with_commit(
        "feature",
        &main,
        "feature commit",
        &HashMap::from([("README.md", "feature content")]),
    );
    repo.checkout(&main);
    repo.add_commit("main commit", &HashMap::from([("README.md", "main content")]));

    let sync = SyncEngine::new();
    let conflict = sync
        .conflict_probe(&repo.path, "feature", &main)
        .await
        .unwrap()
        .expect("conflict expected");

    assert_eq!(conflict.branch, "feature");
    assert_eq!(conflict.base_branch, main);
    assert_eq!(conflict.files, vec!["README.md"]);

    assert_eq!(sync.current_branch(&repo.path).await.unwrap(), main);
    assert!(is_clean(&repo.path));
}

#[tokio::test]
async fn rebase_success_counts_commits() {
    let repo = TestRepo::new();
    repo.initial_commit();
    let main = repo.main_branch();

    repo.branch_with_commit(
        "feature",
        &main,
        "commit 1",
        &HashMap::from([("a.txt", "a")]),
    );
    repo.add_commit("commit 2", &HashMap::from([("b.txt", "b")]));
    repo.add_commit("commit 3", &HashMap::from([("c.txt", "c")]));

    repo.checkout(&main);
    repo.add_commit("main advance", &HashMap::from([("main.txt", "m")]));

    let sync = SyncEngine::new();
    let result = sync.rebase(&repo.path, "feature", &main).await.unwrap();

    assert!(result.success, "rebase failed: {}", result.message);
    assert_eq!(result.commit_count, 3);
    assert!(result.conflicts.is_none());
    assert_eq!(sync.current_branch(&repo.path).await.unwrap(), main);
}

#[tokio::test]
async fn rebase_conflict_aborts_and_reports_files() {
    let repo = TestRepo::new();
    repo.initial_commit();
    let main = repo.main_branch();

    repo.branch_with_commit(
        "feature",
        &main,
        "feature commit",
        &HashMap::from([("README.md", "feature content")]),
    );
    repo.checkout(&main);
    repo.add_commit("main commit", &HashMap::from([("README.md", "main content")]));

    let sync = SyncEngine::new();
    let result = sync.rebase(&repo.path, "feature", &main).await.unwrap();

    assert!(!result.success);
    let conflicts = result.conflicts.expect("conflict info");
    assert_eq!(conflicts.files, vec!["README.md"]);

    // The failed rebase was aborted: clean tree, original branch restored.
    assert!(is_clean(&repo.path));
    assert_eq!(sync.current_branch(&repo.path).await.unwrap(), main);
}

#[tokio::test]
async fn force_push_with_lease() {
    let remote = TestRepo::new_bare();
    let local = TestRepo::new();
    local.initial_commit();
    let main = local.main_branch();
    local.run(&["remote", "add", "origin", &remote.path.to_string_lossy()]);
    local.run(&["push", "-u", "origin", &main]);

    local.branch_with_commit(
        "feature",
        &main,
        "feature commit",
        &HashMap::from([("feature.txt", "feature content")]),
    );
    local.run(&["push", "-u", "origin", "feature"]);

    // Rewrite the branch, then force-push the new history.
    local.run(&["commit", "--amend", "-m", "amended feature"]);

    let sync = SyncEngine::new();
    sync.force_push(&local.path, "origin", "feature").await.unwrap();
}
