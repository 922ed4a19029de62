//! Multiplexer session management for agent processes.
//!
//! Each long-running agent lives in its own tmux session whose single pane
//! runs the agent binary inside a per-agent worktree. The manager creates,
//! inspects, and kills sessions; it never interprets agent output.

pub mod env;
pub mod signal;

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{GtError, Result};
use crate::exec::{Cmd, DEFAULT_TIMEOUT};
use env::{AgentProfile, EnvContract};

/// Everything needed to create an agent session.
#[derive(Debug, Clone)]
pub struct SessionSpec {
    pub name: String,
    pub work_dir: PathBuf,
    pub agent: AgentProfile,
    pub env: EnvContract,
}

/// Thin wrapper over the tmux binary. The binary path is injectable so tests
/// can substitute a recording stub.
#[derive(Debug, Clone)]
pub struct Tmux {
    bin: String,
    timeout: Duration,
}

impl Default for Tmux {
    fn default() -> Self {
        Self {
            bin: "tmux".into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Tmux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bin(mut self, bin: impl Into<String>) -> Self {
        self.bin = bin.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn cmd<I, S>(&self, args: I) -> Cmd
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Cmd::new(&self.bin).args(args).timeout(self.timeout)
    }

    /// Whether a session with this exact name exists.
    pub async fn has_session(&self, name: &str) -> bool {
        match self
            .cmd(["display-message", "-p", "-t", name, "#{session_name}"])
            .run()
            .await
        {
            Ok(out) => !out.is_empty(),
            Err(_) => false,
        }
    }

    /// Create a detached session running the agent in its worktree.
    ///
    /// The environment contract rides inline on the command line and is then
    /// re-broadcast via `set-environment` so later panes inherit it. The
    /// multiplexer is single-writer per name: creating an existing session
    /// fails with `SessionExists`.
    pub async fn new_session(&self, spec: &SessionSpec) -> Result<()> {
        if self.has_session(&spec.name).await {
            return Err(GtError::SessionExists(spec.name.clone()));
        }

        let command = spec.env.prefixed_command(&spec.agent);
        let work_dir = spec.work_dir.to_string_lossy().to_string();
        self.cmd([
            "new-session",
            "-d",
            "-s",
            spec.name.as_str(),
            "-c",
            work_dir.as_str(),
            command.as_str(),
        ])
        .run()
        .await?;

        for (key, value) in spec.env.vars() {
            self.set_environment(&spec.name, key, value).await?;
        }

        tracing::info!(session = %spec.name, agent = %spec.agent.binary, "created session");
        Ok(())
    }

    /// Push one environment variable into the session.
    pub async fn set_environment(&self, name: &str, key: &str, value: &str) -> Result<()> {
        self.cmd(["set-environment", "-t", name, key, value])
            .run()
            .await?;
        Ok(())
    }

    /// Current command of the session's pane (the agent binary when healthy).
    pub async fn pane_command(&self, name: &str) -> Result<String> {
        self.pane_format(name, "#{pane_current_command}").await
    }

    /// Current working directory of the session's pane.
    pub async fn pane_path(&self, name: &str) -> Result<String> {
        self.pane_format(name, "#{pane_current_path}").await
    }

    /// PID of the session's pane process.
    pub async fn pane_pid(&self, name: &str) -> Result<i32> {
        let out = self.pane_format(name, "#{pane_pid}").await?;
        out.parse().map_err(|_| GtError::Upstream {
            command: format!("{} list-panes", self.bin),
            stderr_tail: format!("unparseable pane pid: {out}"),
        })
    }

    /// Pane identifier (e.g. `%1`).
    pub async fn pane_id(&self, name: &str) -> Result<String> {
        self.pane_format(name, "#{pane_id}").await
    }

    async fn pane_format(&self, name: &str, format: &str) -> Result<String> {
        let out = self
            .cmd(["list-panes", "-t", name, "-F", format])
            .run()
            .await?;
        Ok(out.lines().next().unwrap_or_default().trim().to_string())
    }

    /// Kill a session.
    pub async fn kill_session(&self, name: &str) -> Result<()> {
        self.cmd(["kill-session", "-t", name]).run().await?;
        Ok(())
    }

    /// Cycle a session: kill it and let the daemon recreate it on its next
    /// poll. Terminates the pane's process group first so agent children do
    /// not outlive the pane.
    pub async fn cycle_session(&self, name: &str) -> Result<()> {
        if let Ok(pid) = self.pane_pid(name).await {
            signal::kill_process_group(pid, signal::SIG_TERM);
        }
        self.kill_session(name).await
    }
}
