//! Molecule bonding: instantiating a step-graph template under a parent
//! issue.
//!
//! Bonding expands the template, parses its steps, creates one child issue
//! per step, and applies the sibling dependency edges in a single
//! transactional batch. Edges are cycle-checked before any issue is created,
//! so no reader ever observes a cyclic dependency graph.

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::beads::{CreateOptions, DepEdge, DepKind, Issue, IssueStore, IssueType};
use crate::error::{GtError, Result};
use crate::molecule::catalog::find_molecule;
use crate::molecule::parser::{parse_molecule_steps, serialize_step, MoleculeStep};
use crate::molecule::template::{expand_vars, unresolved_vars};

/// A molecule instantiation, as recorded in each bonded child's description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bond {
    pub molecule_id: String,
    pub parent_id: String,
    pub bond_ref: String,
    pub bonded_at: DateTime<Utc>,
}

impl Bond {
    /// The fenced metadata block appended to a bonded child's description.
    pub fn metadata_block(&self) -> String {
        format!(
            "---\nbonded_from: {}\nbonded_to: {}\nbonded_ref: {}\nbonded_at: {}\n",
            self.molecule_id,
            self.parent_id,
            self.bond_ref,
            self.bonded_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
    }

    /// Recover bonding metadata from an issue description, if present.
    pub fn parse(description: &str) -> Option<Bond> {
        let mut fields: HashMap<&str, &str> = HashMap::new();
        for line in description.lines() {
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim();
                if key.starts_with("bonded_") {
                    fields.insert(key, value.trim());
                }
            }
        }
        Some(Bond {
            molecule_id: fields.get("bonded_from")?.to_string(),
            parent_id: fields.get("bonded_to")?.to_string(),
            bond_ref: fields.get("bonded_ref")?.to_string(),
            bonded_at: DateTime::parse_from_rfc3339(fields.get("bonded_at")?)
                .ok()?
                .with_timezone(&Utc),
        })
    }
}

/// Cycle check over the step graph's `needs` edges. Returns the refs that
/// cannot be topologically ordered.
fn step_cycle(steps: &[MoleculeStep]) -> Option<Vec<String>> {
    let mut remaining: Vec<&MoleculeStep> = steps.iter().collect();
    let mut done: Vec<&str> = Vec::new();
    loop {
        let before = remaining.len();
        remaining.retain(|s| {
            let ready = s
                .needs
                .iter()
                .all(|n| done.contains(&n.as_str()) || !steps.iter().any(|o| o.ref_name == *n));
            if ready {
                done.push(s.ref_name.as_str());
            }
            !ready
        });
        if remaining.is_empty() {
            return None;
        }
        if remaining.len() == before {
            let mut stuck: Vec<String> = remaining.iter().map(|s| s.ref_name.clone()).collect();
            stuck.sort();
            return Some(stuck);
        }
    }
}

/// Bond a built-in molecule under `parent_id` with the given variable
/// binding. Returns the created child IDs in step order.
pub async fn bond(
    store: &dyn IssueStore,
    molecule_id: &str,
    parent_id: &str,
    bond_ref: &str,
    vars: &HashMap<String, String>,
) -> Result<Vec<String>> {
    let molecule = find_molecule(molecule_id)
        .ok_or_else(|| GtError::UnknownMolecule(molecule_id.to_string()))?;

    let expanded = expand_vars(molecule.description, vars);
    if let Some(unbound) = unresolved_vars(&expanded).into_iter().next() {
        return Err(GtError::UnboundTemplateVar(unbound));
    }

    let steps = parse_molecule_steps(&expanded)?;
    for step in &steps {
        for needed in &step.needs {
            if !steps.iter().any(|s| s.ref_name == *needed) {
                return Err(GtError::NotFound(format!(
                    "step {needed} needed by {}",
                    step.ref_name
                )));
            }
        }
    }
    if let Some(members) = step_cycle(&steps) {
        return Err(GtError::CycleDetected { members });
    }

    let parent = store.show(parent_id).await?;
    let bond = Bond {
        molecule_id: molecule_id.to_string(),
        parent_id: parent_id.to_string(),
        bond_ref: bond_ref.to_string(),
        bonded_at: Utc::now(),
    };

    let mut child_by_ref: HashMap<String, String> = HashMap::new();
    let mut child_ids = Vec::with_capacity(steps.len());
    for step in &steps {
        let description = format!("{}\n{}", serialize_step(step), bond.metadata_block());
        let child = store
            .create(CreateOptions {
                title: format!("{} ({bond_ref})", molecule.title),
                issue_type: Some(IssueType::Task),
                priority: parent.priority,
                description,
                parent: Some(parent_id.to_string()),
                assignee: None,
            })
            .await?;
        child_by_ref.insert(step.ref_name.clone(), child.id.clone());
        child_ids.push(child.id);
    }

    let mut edges = Vec::new();
    for step in &steps {
        for needed in &step.needs {
            edges.push(DepEdge {
                from: child_by_ref[&step.ref_name].clone(),
                to: child_by_ref[needed].clone(),
                kind: DepKind::Blocks,
            });
        }
    }
    if !edges.is_empty() {
        store.link_batch(&edges).await?;
    }

    tracing::debug!(
        molecule = molecule_id,
        parent = parent_id,
        bond_ref,
        children = child_ids.len(),
        "bonded molecule"
    );
    Ok(child_ids)
}

fn step_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^(?:##\s*)?step:\s*(\S+)").unwrap())
}

/// Recover a subtask's step ref: the `step:` line of its description, or the
/// kebab-cased title when no such line exists.
pub fn extract_step_ref(issue: &Issue) -> String {
    if let Some(caps) = step_ref_re().captures(&issue.description) {
        return caps[1].to_lowercase();
    }
    kebab_case(&issue.title)
}

fn kebab_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_dash = true;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    out.trim_end_matches('-').to_string()
}
