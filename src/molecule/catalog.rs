//! Built-in molecule catalog.

/// A named, parameterized step-graph template. Immutable; instantiated by the
/// bonder with a concrete variable binding.
#[derive(Debug, Clone)]
pub struct BuiltinMolecule {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
}

const WITNESS_PATROL_DESCRIPTION: &str = "\
Patrol the workers of {{rig}} and keep them moving.

## Step: survey-workers
List every active polecat and crew session on {{rig}}. For each worker found,
bond a mol-polecat-arm under this patrol with ref arm-<worker> and vars
polecat_name=<worker>, rig={{rig}}. If no polecats are running, bond nothing
and move on; the patrol completes with an empty report.

## Step: aggregate
Collect the outcome of every bonded arm. Record for each worker whether it
was healthy, nudged, or escalated.
WaitsFor: all-children
Needs: survey-workers

## Step: generate-summary
Produce the patrol activity feed: Workers inspected, Nudges sent, Sessions
killed, Escalations. Squash per-worker noise into one digest entry per
patrol.
Needs: aggregate
";

const POLECAT_ARM_DESCRIPTION: &str = "\
Inspect one worker and decide what it needs.

## Step: capture
Capture the current pane contents and working directory of
{{polecat_name}}'s session on {{rig}}.

## Step: assess
Classify the worker as working, waiting for input, or idle from the captured
pane and the session activity timestamp.
Needs: capture

## Step: load-history
Load {{polecat_name}}'s recent ledger entries so repeated nudges escalate
instead of repeating.
Needs: capture

## Step: decide
Pick an action from the nudge matrix by idle time: 10-15min idle sends
nudge-1, 15-20min sends nudge-2, 20+min sends nudge-3 and prepares to
escalate. A worker that ignored nudge-3 on the previous patrol is escalated
to the witness.
Needs: assess, load-history
Tier: sonnet

## Step: execute
Carry out the decision. Before any session kill, run the pre-kill
verification in the worktree: git status must be clean and there must be no
unpushed commits; otherwise escalate instead of killing.
Needs: decide
";

const BUILTINS: &[BuiltinMolecule] = &[
    BuiltinMolecule {
        id: "mol-witness-patrol",
        title: "Witness Patrol",
        description: WITNESS_PATROL_DESCRIPTION,
    },
    BuiltinMolecule {
        id: "mol-polecat-arm",
        title: "Polecat Arm",
        description: POLECAT_ARM_DESCRIPTION,
    },
];

/// The built-in molecule catalog.
pub fn builtin_molecules() -> &'static [BuiltinMolecule] {
    BUILTINS
}

/// Look up a built-in molecule by id.
pub fn find_molecule(id: &str) -> Option<&'static BuiltinMolecule> {
    BUILTINS.iter().find(|m| m.id == id)
}
