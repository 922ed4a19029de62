//! Subprocess runner shared by the git, tmux, and gh wrappers.
//!
//! Every external command runs with a deadline. On expiry the subprocess's
//! whole process group is terminated, so a hung `git fetch` cannot leave
//! grandchildren behind.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;

use crate::error::{stderr_tail, GtError, Result};
use crate::session::signal::{kill_process_group, SIG_TERM};

/// Default deadline for external commands.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A single external command invocation.
pub(crate) struct Cmd {
    program: String,
    args: Vec<String>,
    dir: Option<PathBuf>,
    timeout: Duration,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn display(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }

    /// Run to completion, capturing output. Nonzero exit is not an error
    /// here; callers decide what a failure means.
    pub async fn output(self) -> Result<Output> {
        let cmd_display = self.display();
        tracing::debug!(command = %cmd_display, "exec");

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.dir {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn()?;
        let pid = child.id();

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => Ok(output?),
            Err(_) => {
                if let Some(pid) = pid {
                    kill_process_group(pid as i32, SIG_TERM);
                }
                Err(GtError::Timeout(cmd_display))
            }
        }
    }

    /// Run and require a zero exit status. Returns trimmed stdout; a nonzero
    /// exit becomes an `Upstream` error carrying the stderr tail.
    pub async fn run(self) -> Result<String> {
        let display = self.display();
        let output = self.output().await?;
        if !output.status.success() {
            return Err(GtError::Upstream {
                command: display,
                stderr_tail: stderr_tail(&output.stderr, 3),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
