//! Issue types and the issue-store contract.
//!
//! The store itself (the beads daemon) is an external collaborator; this
//! module defines the types and the trait the engine consumes. Tests run
//! against the in-memory implementation in [`crate::beads::memory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::Result;

/// Kind of a tracked issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Epic,
    Task,
    Subtask,
    Bug,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Epic => "epic",
            IssueType::Task => "task",
            IssueType::Subtask => "subtask",
            IssueType::Bug => "bug",
        }
    }
}

/// Lifecycle status of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    InProgress,
    Merged,
    Landed,
    Closed,
    Failed,
}

impl IssueStatus {
    /// Terminal statuses satisfy dependency edges.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IssueStatus::Merged | IssueStatus::Landed | IssueStatus::Closed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Open => "open",
            IssueStatus::InProgress => "in_progress",
            IssueStatus::Merged => "merged",
            IssueStatus::Landed => "landed",
            IssueStatus::Closed => "closed",
            IssueStatus::Failed => "failed",
        }
    }
}

/// A tracked issue (epic, task, subtask, or bug).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub priority: i32,
    pub status: IssueStatus,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parent: Option<String>,
    /// Explicit blocking dependencies (issue IDs this one waits on).
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

/// Options for creating a new issue.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub title: String,
    pub issue_type: Option<IssueType>,
    pub priority: i32,
    pub description: String,
    pub parent: Option<String>,
    pub assignee: Option<String>,
}

/// Kind of a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepKind {
    /// `from` is blocked until `to` reaches a terminal status.
    Blocks,
    /// Structural parent/child link; does not block scheduling.
    ParentChild,
}

/// A directed dependency edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepEdge {
    pub from: String,
    pub to: String,
    pub kind: DepKind,
}

/// Query for listing issues.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub parent: Option<String>,
    pub issue_type: Option<IssueType>,
    pub status: Option<IssueStatus>,
}

/// Contract for the issue store. Every call is transactional on the store
/// side; `list` returns a single consistent snapshot.
#[async_trait]
pub trait IssueStore: Send + Sync {
    async fn create(&self, opts: CreateOptions) -> Result<Issue>;

    async fn show(&self, id: &str) -> Result<Issue>;

    async fn close(&self, id: &str) -> Result<()>;

    async fn set_status(&self, id: &str, status: IssueStatus) -> Result<()>;

    async fn link(&self, from: &str, to: &str, kind: DepKind) -> Result<()>;

    /// Apply a batch of edges atomically. A batch that would create a
    /// dependency cycle fails with `CycleDetected` and commits nothing.
    async fn link_batch(&self, edges: &[DepEdge]) -> Result<()>;

    /// Whether the issue has any open blocking dependency.
    async fn blocked(&self, id: &str) -> Result<bool>;

    async fn list(&self, query: ListQuery) -> Result<Vec<Issue>>;
}
