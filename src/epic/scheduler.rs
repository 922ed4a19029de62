//! Dependency scheduler for epic subtasks.
//!
//! Operates on a single `list` snapshot of an epic's children, so sibling
//! statuses are read from one store transaction. Bonding keeps the graph
//! acyclic by construction, but the scheduler re-checks defensively and
//! refuses to dispatch when a cycle is observed.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::beads::{Issue, IssueStatus, IssueStore, ListQuery};
use crate::error::{GtError, Result};
use crate::molecule::bond::Bond;
use crate::molecule::parser::parse_molecule_steps;

/// Counts of subtask statuses under an epic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub open: usize,
    pub in_progress: usize,
    pub merged: usize,
    pub landed: usize,
    pub closed: usize,
    pub failed: usize,
}

/// Derived state of an epic's subtask set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollupState {
    Empty,
    NotStarted,
    InProgress,
    Failed,
    Complete,
}

/// Aggregated subtask status for an epic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusRollup {
    pub counts: StatusCounts,
    pub state: RollupState,
}

/// Scheduler over an issue store.
pub struct Scheduler<'a, S: IssueStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: IssueStore + ?Sized> Scheduler<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// One consistent snapshot of the epic's subtasks, in creation order.
    pub async fn subtasks(&self, epic_id: &str) -> Result<Vec<Issue>> {
        self.store
            .list(ListQuery {
                parent: Some(epic_id.to_string()),
                ..Default::default()
            })
            .await
    }

    /// Subtasks with no open dependency.
    pub async fn roots(&self, epic_id: &str) -> Result<Vec<Issue>> {
        let snapshot = self.subtasks(epic_id).await?;
        Ok(roots_of(&snapshot).into_iter().cloned().collect())
    }

    /// Subtasks whose dependencies are all terminal and whose wait
    /// conditions are satisfied.
    pub async fn ready(&self, epic_id: &str) -> Result<Vec<Issue>> {
        let snapshot = self.subtasks(epic_id).await?;
        Ok(ready_of(&snapshot).into_iter().cloned().collect())
    }

    /// Ready subtasks in dispatch order. Refuses when the snapshot contains
    /// a dependency cycle.
    pub async fn dispatch_order(&self, epic_id: &str) -> Result<Vec<Issue>> {
        let snapshot = self.subtasks(epic_id).await?;
        if let Some(members) = detect_cycle(&snapshot) {
            return Err(GtError::CycleDetected { members });
        }
        let mut ready: Vec<Issue> = ready_of(&snapshot).into_iter().cloned().collect();
        ready.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(ready)
    }

    /// Whether a task has an open blocking dependency, per the store.
    pub async fn is_blocked(&self, task_id: &str) -> Result<bool> {
        self.store.blocked(task_id).await
    }

    /// Aggregate subtask status for the epic.
    pub async fn status_rollup(&self, epic_id: &str) -> Result<StatusRollup> {
        let snapshot = self.subtasks(epic_id).await?;
        Ok(rollup_of(&snapshot))
    }
}

/// Defensive cycle check over the snapshot's dependency edges. Returns the
/// subset of subtask IDs that cannot be topologically ordered.
pub fn detect_cycle(snapshot: &[Issue]) -> Option<Vec<String>> {
    let ids: HashSet<&str> = snapshot.iter().map(|i| i.id.as_str()).collect();
    let mut unresolved: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for issue in snapshot {
        let deps: Vec<&str> = issue
            .depends_on
            .iter()
            .map(String::as_str)
            .filter(|d| ids.contains(d))
            .collect();
        unresolved.insert(issue.id.as_str(), deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(issue.id.as_str());
        }
    }

    let mut queue: Vec<&str> = unresolved
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut ordered = 0usize;
    while let Some(id) = queue.pop() {
        ordered += 1;
        for &dependent in dependents.get(id).into_iter().flatten() {
            let n = unresolved.get_mut(dependent).unwrap();
            *n -= 1;
            if *n == 0 {
                queue.push(dependent);
            }
        }
    }

    if ordered == snapshot.len() {
        return None;
    }
    let mut stuck: Vec<String> = unresolved
        .iter()
        .filter(|(_, n)| **n > 0)
        .map(|(id, _)| id.to_string())
        .collect();
    stuck.sort();
    Some(stuck)
}

/// Subtasks with no open dependency within the snapshot.
pub fn roots_of(snapshot: &[Issue]) -> Vec<&Issue> {
    let by_id: HashMap<&str, &Issue> = snapshot.iter().map(|i| (i.id.as_str(), i)).collect();
    snapshot
        .iter()
        .filter(|issue| {
            issue.depends_on.iter().all(|dep| {
                by_id
                    .get(dep.as_str())
                    .map(|d| d.status.is_terminal())
                    .unwrap_or(true)
            })
        })
        .collect()
}

/// Open subtasks whose dependencies are terminal and whose `all-children`
/// gate (if any) is satisfied over the observed sibling set.
pub fn ready_of(snapshot: &[Issue]) -> Vec<&Issue> {
    let by_id: HashMap<&str, &Issue> = snapshot.iter().map(|i| (i.id.as_str(), i)).collect();
    snapshot
        .iter()
        .filter(|issue| issue.status == IssueStatus::Open)
        .filter(|issue| {
            issue.depends_on.iter().all(|dep| {
                by_id
                    .get(dep.as_str())
                    .map(|d| d.status.is_terminal())
                    .unwrap_or(true)
            })
        })
        .filter(|issue| all_children_gate_satisfied(issue, snapshot))
        .collect()
}

/// Whether this subtask carries a `WaitsFor: all-children` condition.
fn waits_for_all_children(issue: &Issue) -> bool {
    parse_molecule_steps(&issue.description)
        .ok()
        .and_then(|steps| steps.into_iter().next())
        .map(|step| step.waits_for_all_children())
        .unwrap_or(false)
}

/// The fan-out gate: satisfied when every gating sibling is terminal.
///
/// Siblings from the same bond gate only if they come earlier in step order;
/// later same-bond steps (e.g. a summary step behind the aggregate) never
/// hold the gate. Children of any other bond (the dynamically hung
/// ornaments) gate regardless of when they were created. The check runs
/// over the observed sibling set at evaluation time: children bonded after
/// the gate fires do not retroactively unsatisfy it. An empty child set is
/// vacuously satisfied.
fn all_children_gate_satisfied(issue: &Issue, snapshot: &[Issue]) -> bool {
    if !waits_for_all_children(issue) {
        return true;
    }

    let my_bond = Bond::parse(&issue.description);
    let same_bond = |other: &Issue| match (&my_bond, Bond::parse(&other.description)) {
        (Some(mine), Some(theirs)) => {
            mine.molecule_id == theirs.molecule_id && mine.bond_ref == theirs.bond_ref
        }
        _ => false,
    };

    // Snapshot is creation-ordered, so position doubles as the order index.
    let my_index = snapshot.iter().position(|s| s.id == issue.id);

    for (index, sibling) in snapshot.iter().enumerate() {
        if sibling.id == issue.id || sibling.status.is_terminal() {
            continue;
        }
        if same_bond(sibling) {
            if Some(index) < my_index {
                return false;
            }
        } else {
            return false;
        }
    }
    true
}

/// Aggregate a snapshot into counts and a derived state.
pub fn rollup_of(snapshot: &[Issue]) -> StatusRollup {
    let mut counts = StatusCounts::default();
    for issue in snapshot {
        match issue.status {
            IssueStatus::Open => counts.open += 1,
            IssueStatus::InProgress => counts.in_progress += 1,
            IssueStatus::Merged => counts.merged += 1,
            IssueStatus::Landed => counts.landed += 1,
            IssueStatus::Closed => counts.closed += 1,
            IssueStatus::Failed => counts.failed += 1,
        }
    }

    let total = snapshot.len();
    let terminal = counts.merged + counts.landed + counts.closed;
    let state = if total == 0 {
        RollupState::Empty
    } else if counts.failed > 0 {
        RollupState::Failed
    } else if terminal == total {
        RollupState::Complete
    } else if counts.in_progress > 0 || terminal > 0 {
        RollupState::InProgress
    } else {
        RollupState::NotStarted
    };

    StatusRollup { counts, state }
}
