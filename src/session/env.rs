//! Agent roles, session names, and the session environment contract.

use std::fmt;
use std::path::Path;

/// Agent roles in a town.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Town-level supervisor.
    Mayor,
    /// Receives nudges.
    Deacon,
    /// Patrols workers.
    Witness,
    /// Processes merge requests.
    Refinery,
    /// Named persistent worker.
    Crew,
    /// Ephemeral per-task worker.
    Polecat,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Mayor => "mayor",
            Role::Deacon => "deacon",
            Role::Witness => "witness",
            Role::Refinery => "refinery",
            Role::Crew => "crew",
            Role::Polecat => "polecat",
        }
    }

    /// Directory name grouping workers of this role under a rig.
    pub fn plural(&self) -> &'static str {
        match self {
            Role::Crew => "crew",
            Role::Polecat => "polecats",
            other => other.as_str(),
        }
    }

    /// Whether sessions of this role carry a worker identity.
    pub fn has_worker(&self) -> bool {
        matches!(self, Role::Crew | Role::Polecat)
    }

    /// Whether this role lives at the town level rather than under a rig.
    pub fn is_town_level(&self) -> bool {
        matches!(self, Role::Mayor | Role::Deacon)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Multiplexer session name: `gt-<rig>-<role>[-<worker>]`, with town-level
/// roles dropping the rig segment.
pub fn session_name(rig: &str, role: Role, worker: Option<&str>) -> String {
    if role.is_town_level() {
        return format!("gt-{}", role.as_str());
    }
    match worker {
        Some(worker) => format!("gt-{rig}-{}-{worker}", role.as_str()),
        None => format!("gt-{rig}-{}", role.as_str()),
    }
}

/// The AI agent an orchestrated session runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentProfile {
    pub binary: String,
    pub args: Vec<String>,
}

impl AgentProfile {
    pub fn claude() -> Self {
        Self {
            binary: "claude".into(),
            args: vec!["--dangerously-skip-permissions".into()],
        }
    }

    pub fn codex() -> Self {
        Self {
            binary: "codex".into(),
            args: vec!["--dangerously-bypass-approvals-and-sandbox".into()],
        }
    }

    pub fn custom(binary: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            args,
        }
    }

    /// Resolve an `--agent` selector. Unknown selectors run as bare binaries.
    pub fn from_selector(selector: &str) -> Self {
        match selector {
            "claude" => Self::claude(),
            "codex" => Self::codex(),
            other => Self::custom(other, Vec::new()),
        }
    }

    /// The agent command line without environment bindings.
    pub fn command_line(&self) -> String {
        let mut line = self.binary.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// The key/value set a newly created session must carry. All variables are
/// injected inline on the session command and re-broadcast via
/// `set-environment` so later panes inherit them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvContract {
    vars: Vec<(String, String)>,
}

impl EnvContract {
    pub fn new(
        town_root: &Path,
        rig: &str,
        role: Role,
        worker: Option<&str>,
        beads_dir: &Path,
    ) -> Self {
        let identity = worker.unwrap_or(role.as_str());
        let mut vars = vec![
            ("GT_ROLE".to_string(), role.as_str().to_string()),
            ("GT_RIG".to_string(), rig.to_string()),
        ];
        if role == Role::Polecat {
            if let Some(worker) = worker {
                vars.push(("GT_POLECAT".to_string(), worker.to_string()));
            }
        }
        vars.push((
            "GT_ROOT".to_string(),
            town_root.to_string_lossy().to_string(),
        ));
        vars.push((
            "BEADS_DIR".to_string(),
            beads_dir.to_string_lossy().to_string(),
        ));
        vars.push((
            "BD_ACTOR".to_string(),
            format!("{rig}/{}/{identity}", role.plural()),
        ));
        vars.push(("GIT_AUTHOR_NAME".to_string(), identity.to_string()));
        vars.push((
            "BEADS_AGENT_NAME".to_string(),
            format!("{rig}/{identity}"),
        ));
        vars.push(("BEADS_NO_DAEMON".to_string(), "1".to_string()));
        Self { vars }
    }

    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `K=V K=V <agent command>`: the command line handed to the
    /// multiplexer at session creation.
    pub fn prefixed_command(&self, agent: &AgentProfile) -> String {
        let mut line = String::new();
        for (key, value) in &self.vars {
            line.push_str(key);
            line.push('=');
            line.push_str(&shell_quote(value));
            line.push(' ');
        }
        line.push_str(&agent.command_line());
        line
    }
}

fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=".contains(c))
    {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}
