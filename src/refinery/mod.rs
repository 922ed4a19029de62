//! Refinery: the per-rig durable queue of branch-merge requests.
//!
//! Agents land finished work as merge requests; the refinery rebases each
//! branch onto the target and force-pushes (with lease) the result. Queue
//! state is one JSON file per rig, rewritten atomically on every mutation,
//! and all mutations for a rig are serialized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::epic::sync::SyncEngine;
use crate::error::{GtError, Result};
use crate::rig::Rig;
use crate::session::env::Role;

/// Retry ceiling for transient (timeout/upstream) failures.
pub const MAX_ATTEMPTS: u32 = 3;

/// Lifecycle status of a merge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MrStatus {
    Open,
    Merged,
    Closed,
    Abandoned,
}

/// A branch ready for integration, queued by a worker.
///
/// A nonempty `error` marks the request as failed; `retry` clears it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    pub id: String,
    pub branch: String,
    pub worker: String,
    #[serde(default)]
    pub issue_id: Option<String>,
    pub target_branch: String,
    pub created_at: DateTime<Utc>,
    pub status: MrStatus,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub attempts: u32,
}

impl MergeRequest {
    pub fn is_failed(&self) -> bool {
        !self.error.is_empty()
    }
}

/// Durable refinery state, persisted as `<rig>/.runtime/refinery.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Refinery {
    #[serde(default)]
    pub pending_mrs: HashMap<String, MergeRequest>,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
}

/// Generate a merge-request ID: `<prefix>-mr-<hash>`.
pub fn new_mr_id(prefix: &str) -> String {
    let hash = Uuid::new_v4().simple().to_string();
    format!("{prefix}-mr-{}", &hash[..7])
}

/// Manages one rig's merge-request queue.
pub struct RefineryManager {
    rig: Rig,
    sync: SyncEngine,
    remote: String,
    backoff_base: Duration,
    // Serializes register/retry per rig; the state file is the source of
    // truth and is reloaded under this lock before every mutation.
    state_lock: Mutex<()>,
}

impl RefineryManager {
    pub fn new(rig: Rig) -> Self {
        Self {
            rig,
            sync: SyncEngine::new(),
            remote: "origin".into(),
            backoff_base: Duration::from_secs(1),
            state_lock: Mutex::new(()),
        }
    }

    pub fn with_sync_engine(mut self, sync: SyncEngine) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    #[cfg(test)]
    fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Path of the durable state file.
    pub fn state_path(&self) -> PathBuf {
        self.rig.runtime_dir().join("refinery.json")
    }

    fn load_state(&self) -> Result<Refinery> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(Refinery::default());
        }
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Persist the whole state atomically: write a temp file in the same
    /// directory, then rename over the target.
    fn save_state(&self, state: &Refinery) -> Result<()> {
        let dir = self.rig.runtime_dir();
        std::fs::create_dir_all(&dir)?;

        let tmp = dir.join(format!(".refinery.json.{}", Uuid::new_v4().simple()));
        std::fs::write(&tmp, serde_json::to_string_pretty(state)?)?;
        std::fs::rename(&tmp, self.state_path())?;
        Ok(())
    }

    /// Add or replace a merge request and flush the queue to disk.
    pub async fn register_mr(&self, mr: MergeRequest) -> Result<()> {
        let _guard = self.state_lock.lock().await;
        let mut state = self.load_state()?;
        state.pending_mrs.insert(mr.id.clone(), mr);
        state.last_update = Some(Utc::now());
        self.save_state(&state)
    }

    /// Fetch a merge request by ID.
    pub async fn get_mr(&self, mr_id: &str) -> Result<MergeRequest> {
        let _guard = self.state_lock.lock().await;
        let state = self.load_state()?;
        state
            .pending_mrs
            .get(mr_id)
            .cloned()
            .ok_or_else(|| GtError::MrNotFound(mr_id.to_string()))
    }

    /// All queued merge requests, newest first.
    pub async fn list_mrs(&self) -> Result<Vec<MergeRequest>> {
        let _guard = self.state_lock.lock().await;
        let state = self.load_state()?;
        let mut mrs: Vec<MergeRequest> = state.pending_mrs.into_values().collect();
        mrs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(mrs)
    }

    /// Retry a failed merge request: clear its error, bump `attempts`, and,
    /// when `process` is set, run a fresh rebase and push.
    ///
    /// Retrying a request whose `error` is empty fails with `MrNotFailed`.
    pub async fn retry(&self, mr_id: &str, process: bool) -> Result<()> {
        {
            let _guard = self.state_lock.lock().await;
            let mut state = self.load_state()?;
            let mr = state
                .pending_mrs
                .get_mut(mr_id)
                .ok_or_else(|| GtError::MrNotFound(mr_id.to_string()))?;
            if !mr.is_failed() {
                return Err(GtError::MrNotFailed(mr_id.to_string()));
            }
            mr.error.clear();
            mr.attempts += 1;
            state.last_update = Some(Utc::now());
            self.save_state(&state)?;
        }

        if process {
            self.process_mr(mr_id).await?;
        }
        Ok(())
    }

    /// Ensure the refinery's own worktree exists.
    pub async fn ensure_refinery_worktree(&self) -> Result<PathBuf> {
        self.rig.ensure_worktree(Role::Refinery, None).await
    }

    /// Rebase the MR branch onto the target and force-push it.
    ///
    /// Transient failures (timeout, upstream) retry with exponential backoff
    /// while `attempts` stays under [`MAX_ATTEMPTS`]; conflicts and exhausted
    /// retries store the failure in `error` and surface it.
    pub async fn process_mr(&self, mr_id: &str) -> Result<()> {
        let mut mr = self.get_mr(mr_id).await?;
        let work_dir = self.ensure_refinery_worktree().await?;

        loop {
            match self.attempt(&work_dir, &mr).await {
                Ok(()) => {
                    mr.error.clear();
                    self.put_mr(mr).await?;
                    return Ok(());
                }
                Err(err @ (GtError::Timeout(_) | GtError::Upstream { .. }))
                    if mr.attempts + 1 < MAX_ATTEMPTS =>
                {
                    mr.attempts += 1;
                    let backoff = self.backoff_base * 2u32.pow(mr.attempts - 1);
                    tracing::warn!(
                        mr = %mr.id,
                        attempts = mr.attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "transient failure; retrying"
                    );
                    self.put_mr(mr.clone()).await?;
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    mr.attempts += 1;
                    mr.error = err.to_string();
                    self.put_mr(mr).await?;
                    return Err(err);
                }
            }
        }
    }

    async fn attempt(&self, work_dir: &std::path::Path, mr: &MergeRequest) -> Result<()> {
        self.sync.fetch(work_dir, &self.remote).await?;

        let onto = format!("{}/{}", self.remote, mr.target_branch);
        let result = self.sync.rebase(work_dir, &mr.branch, &onto).await?;
        if !result.success {
            let mut conflict = result.conflicts.unwrap_or(crate::epic::sync::ConflictInfo {
                branch: mr.branch.clone(),
                base_branch: onto,
                files: Vec::new(),
                pr_number: None,
            });
            conflict.base_branch = mr.target_branch.clone();
            return Err(GtError::ConflictDetected(conflict));
        }

        self.sync.force_push(work_dir, &self.remote, &mr.branch).await
    }

    async fn put_mr(&self, mr: MergeRequest) -> Result<()> {
        let _guard = self.state_lock.lock().await;
        let mut state = self.load_state()?;
        state.pending_mrs.insert(mr.id.clone(), mr);
        state.last_update = Some(Utc::now());
        self.save_state(&state)
    }

    /// Drop merged and closed requests older than `max_age`. Returns the
    /// number pruned. Retention is the operator's call; nothing prunes
    /// automatically.
    pub async fn purge(&self, max_age: chrono::Duration) -> Result<usize> {
        let _guard = self.state_lock.lock().await;
        let mut state = self.load_state()?;
        let cutoff = Utc::now() - max_age;
        let before = state.pending_mrs.len();
        state.pending_mrs.retain(|_, mr| {
            !(matches!(mr.status, MrStatus::Merged | MrStatus::Closed) && mr.created_at < cutoff)
        });
        let pruned = before - state.pending_mrs.len();
        if pruned > 0 {
            state.last_update = Some(Utc::now());
            self.save_state(&state)?;
        }
        Ok(pruned)
    }
}
