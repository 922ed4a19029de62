//! In-memory issue store.
//!
//! Backs the engine's tests the same way the stubbed PR provider backs CI
//! aggregation tests: full contract semantics, no daemon. Enforces the store
//! invariants: dependency edges stay acyclic, a child carries an implicit
//! structural edge to its parent, and closing a parent closes its children.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::beads::ids::new_issue_id;
use crate::beads::store::{
    CreateOptions, DepEdge, DepKind, Issue, IssueStatus, IssueStore, IssueType, ListQuery,
};
use crate::error::{GtError, Result};

#[derive(Default)]
struct Inner {
    issues: HashMap<String, Issue>,
    edges: Vec<DepEdge>,
    last_created: Option<DateTime<Utc>>,
}

/// In-memory [`IssueStore`] implementation.
pub struct MemoryStore {
    prefix: String,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// All edges currently committed (test inspection).
    pub fn edges(&self) -> Vec<DepEdge> {
        self.inner.lock().unwrap().edges.clone()
    }
}

/// Returns true when `edges` contain a directed cycle over `nodes`.
/// On a cycle, returns the subset of nodes that could not be ordered.
fn find_cycle(nodes: &HashSet<String>, edges: &[DepEdge]) -> Option<Vec<String>> {
    let mut out_degree: HashMap<&str, usize> = nodes.iter().map(|n| (n.as_str(), 0)).collect();
    let mut incoming: HashMap<&str, Vec<&str>> = HashMap::new();
    for e in edges {
        if nodes.contains(&e.from) && nodes.contains(&e.to) {
            *out_degree.get_mut(e.from.as_str()).unwrap() += 1;
            incoming.entry(e.to.as_str()).or_default().push(e.from.as_str());
        }
    }

    // Kahn's algorithm on the dependency direction; whatever cannot be
    // peeled off is part of (or downstream of) a cycle.
    let mut queue: Vec<&str> = out_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();
    let mut resolved = 0usize;
    while let Some(node) = queue.pop() {
        resolved += 1;
        if let Some(dependents) = incoming.get(node) {
            for &dep in dependents {
                let d = out_degree.get_mut(dep).unwrap();
                *d -= 1;
                if *d == 0 {
                    queue.push(dep);
                }
            }
        }
    }

    if resolved == nodes.len() {
        return None;
    }
    let mut stuck: Vec<String> = out_degree
        .iter()
        .filter(|(_, d)| **d > 0)
        .map(|(n, _)| n.to_string())
        .collect();
    stuck.sort();
    Some(stuck)
}

impl Inner {
    fn check_acyclic(&self, staged: &[DepEdge]) -> Result<()> {
        let nodes: HashSet<String> = self.issues.keys().cloned().collect();
        let mut combined: Vec<DepEdge> = self.edges.clone();
        combined.extend_from_slice(staged);
        if let Some(members) = find_cycle(&nodes, &combined) {
            return Err(GtError::CycleDetected { members });
        }
        Ok(())
    }

    fn commit_edges(&mut self, staged: Vec<DepEdge>) {
        for e in &staged {
            if e.kind == DepKind::Blocks {
                if let Some(issue) = self.issues.get_mut(&e.from) {
                    issue.depends_on.insert(e.to.clone());
                }
            }
        }
        self.edges.extend(staged);
    }
}

#[async_trait]
impl IssueStore for MemoryStore {
    async fn create(&self, opts: CreateOptions) -> Result<Issue> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(parent) = &opts.parent {
            if !inner.issues.contains_key(parent) {
                return Err(GtError::NotFound(format!("issue {parent}")));
            }
        }

        let issue_type = opts.issue_type.unwrap_or(IssueType::Task);
        let id = new_issue_id(&self.prefix, issue_type.as_str());

        // Monotonic creation times keep scheduler ordering stable even when
        // many issues are created within one clock tick.
        let mut created_at = Utc::now();
        if let Some(last) = inner.last_created {
            if created_at <= last {
                created_at = last + Duration::milliseconds(1);
            }
        }
        inner.last_created = Some(created_at);

        let issue = Issue {
            id: id.clone(),
            title: opts.title,
            issue_type,
            priority: opts.priority,
            status: IssueStatus::Open,
            assignee: opts.assignee,
            description: opts.description,
            parent: opts.parent.clone(),
            depends_on: Default::default(),
            created_at,
        };
        inner.issues.insert(id.clone(), issue.clone());

        if let Some(parent) = opts.parent {
            let edge = DepEdge {
                from: id,
                to: parent,
                kind: DepKind::ParentChild,
            };
            inner.check_acyclic(std::slice::from_ref(&edge))?;
            inner.commit_edges(vec![edge]);
        }

        Ok(issue)
    }

    async fn show(&self, id: &str) -> Result<Issue> {
        let inner = self.inner.lock().unwrap();
        inner
            .issues
            .get(id)
            .cloned()
            .ok_or_else(|| GtError::NotFound(format!("issue {id}")))
    }

    async fn close(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.issues.contains_key(id) {
            return Err(GtError::NotFound(format!("issue {id}")));
        }

        // Closing a parent closes its open children too.
        let mut pending = vec![id.to_string()];
        while let Some(current) = pending.pop() {
            if let Some(issue) = inner.issues.get_mut(&current) {
                issue.status = IssueStatus::Closed;
            }
            let children: Vec<String> = inner
                .issues
                .values()
                .filter(|i| i.parent.as_deref() == Some(current.as_str()))
                .filter(|i| !i.status.is_terminal())
                .map(|i| i.id.clone())
                .collect();
            pending.extend(children);
        }
        Ok(())
    }

    async fn set_status(&self, id: &str, status: IssueStatus) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let issue = inner
            .issues
            .get_mut(id)
            .ok_or_else(|| GtError::NotFound(format!("issue {id}")))?;
        issue.status = status;
        Ok(())
    }

    async fn link(&self, from: &str, to: &str, kind: DepKind) -> Result<()> {
        self.link_batch(&[DepEdge {
            from: from.to_string(),
            to: to.to_string(),
            kind,
        }])
        .await
    }

    async fn link_batch(&self, edges: &[DepEdge]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for e in edges {
            for id in [&e.from, &e.to] {
                if !inner.issues.contains_key(id) {
                    return Err(GtError::NotFound(format!("issue {id}")));
                }
            }
            if e.from == e.to {
                return Err(GtError::CycleDetected {
                    members: vec![e.from.clone()],
                });
            }
        }
        inner.check_acyclic(edges)?;
        inner.commit_edges(edges.to_vec());
        Ok(())
    }

    async fn blocked(&self, id: &str) -> Result<bool> {
        let inner = self.inner.lock().unwrap();
        let issue = inner
            .issues
            .get(id)
            .ok_or_else(|| GtError::NotFound(format!("issue {id}")))?;
        Ok(issue.depends_on.iter().any(|dep| {
            inner
                .issues
                .get(dep)
                .map(|d| !d.status.is_terminal())
                .unwrap_or(false)
        }))
    }

    async fn list(&self, query: ListQuery) -> Result<Vec<Issue>> {
        let inner = self.inner.lock().unwrap();
        let mut issues: Vec<Issue> = inner
            .issues
            .values()
            .filter(|i| match &query.parent {
                Some(p) => i.parent.as_deref() == Some(p.as_str()),
                None => true,
            })
            .filter(|i| match query.issue_type {
                Some(t) => i.issue_type == t,
                None => true,
            })
            .filter(|i| match query.status {
                Some(s) => i.status == s,
                None => true,
            })
            .cloned()
            .collect();
        issues.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(issues)
    }
}
