//! Parser for molecule step graphs.
//!
//! A molecule description is prose with `## Step: <ref>` blocks. Inside a
//! block, `Needs:`, `WaitsFor:`, and `Tier:` lines are structured fields;
//! everything else is the step's instructions. Field headers parse
//! case-insensitively. Cycle detection across steps happens at bond time,
//! not here.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{GtError, Result};

/// Wait condition satisfied when every earlier-bonded sibling is terminal.
pub const WAITS_ALL_CHILDREN: &str = "all-children";
/// Wait condition satisfied by an external signal.
pub const WAITS_EXTERNAL_SIGNAL: &str = "external-signal";
/// Wait condition satisfied by a timeout.
pub const WAITS_TIMEOUT: &str = "timeout";

/// One parsed step of a molecule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoleculeStep {
    /// Unique (within the molecule) lowercase-kebab ref.
    pub ref_name: String,
    /// Free-text instructions for the agent working the step.
    pub instructions: String,
    /// Refs of sibling steps this step depends on.
    pub needs: Vec<String>,
    /// Wait conditions gating readiness beyond `needs`.
    pub waits_for: Vec<String>,
    /// Agent capability hint (e.g. `opus`, `sonnet`, `haiku`).
    pub tier: Option<String>,
}

impl MoleculeStep {
    pub fn waits_for_all_children(&self) -> bool {
        self.waits_for.iter().any(|c| c == WAITS_ALL_CHILDREN)
    }
}

fn step_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^##\s*step:(.*)$").unwrap())
}

fn field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(needs|waitsfor|tier)\s*:\s*(.*)$").unwrap())
}

fn split_tokens(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Parse a molecule description into its ordered steps.
///
/// Text before the first step header (overview prose) is ignored. Fails with
/// `InvalidStepRef` on an empty ref and `DuplicateRef` on a repeated one.
pub fn parse_molecule_steps(description: &str) -> Result<Vec<MoleculeStep>> {
    let mut steps: Vec<MoleculeStep> = Vec::new();
    let mut current: Option<(MoleculeStep, Vec<String>)> = None;

    for line in description.lines() {
        if let Some(caps) = step_header_re().captures(line) {
            if let Some((step, body)) = current.take() {
                steps.push(finish_step(step, body)?);
            }
            let ref_name = caps[1].trim().to_lowercase();
            if ref_name.is_empty() {
                return Err(GtError::InvalidStepRef(line.trim().to_string()));
            }
            if steps.iter().any(|s| s.ref_name == ref_name) {
                return Err(GtError::DuplicateRef(ref_name));
            }
            current = Some((
                MoleculeStep {
                    ref_name,
                    instructions: String::new(),
                    needs: Vec::new(),
                    waits_for: Vec::new(),
                    tier: None,
                },
                Vec::new(),
            ));
            continue;
        }

        let Some((step, body)) = current.as_mut() else {
            continue;
        };

        if let Some(caps) = field_re().captures(line) {
            match caps[1].to_lowercase().as_str() {
                "needs" => step.needs = split_tokens(&caps[2]),
                "waitsfor" => step.waits_for = split_tokens(&caps[2]),
                "tier" => {
                    let tier = caps[2].trim().to_lowercase();
                    step.tier = (!tier.is_empty()).then_some(tier);
                }
                _ => unreachable!(),
            }
            continue;
        }

        body.push(line.to_string());
    }

    if let Some((step, body)) = current.take() {
        steps.push(finish_step(step, body)?);
    }

    Ok(steps)
}

fn finish_step(mut step: MoleculeStep, body: Vec<String>) -> Result<MoleculeStep> {
    if step.needs.iter().any(|n| *n == step.ref_name) {
        return Err(GtError::CycleDetected {
            members: vec![step.ref_name],
        });
    }
    step.instructions = body.join("\n").trim().to_string();
    Ok(step)
}

/// Re-emit steps as a molecule description.
///
/// Parsing the output reproduces the input steps exactly, so
/// parse-then-serialize is a fixed point on the recognized fields.
pub fn serialize_steps(steps: &[MoleculeStep]) -> String {
    let mut out = String::new();
    for step in steps {
        out.push_str(&serialize_step(step));
        out.push('\n');
    }
    out
}

/// Serialize a single step block.
pub fn serialize_step(step: &MoleculeStep) -> String {
    let mut out = format!("## Step: {}\n", step.ref_name);
    if !step.instructions.is_empty() {
        out.push_str(&step.instructions);
        out.push('\n');
    }
    if !step.needs.is_empty() {
        out.push_str(&format!("Needs: {}\n", step.needs.join(", ")));
    }
    if !step.waits_for.is_empty() {
        out.push_str(&format!("WaitsFor: {}\n", step.waits_for.join(", ")));
    }
    if let Some(tier) = &step.tier {
        out.push_str(&format!("Tier: {tier}\n"));
    }
    out
}
