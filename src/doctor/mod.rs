//! Doctor checks: detect and repair drift in a town's agent plumbing.

pub mod claude_settings;
pub mod limits;
pub mod settings;

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::Result;

pub use limits::LimitsCheck;
pub use settings::SettingsCheck;

/// Outcome level of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

/// Result of running one check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: &'static str,
    pub status: CheckStatus,
    pub message: String,
    pub details: Vec<String>,
    pub fix_hint: Option<String>,
}

impl CheckResult {
    pub fn ok(name: &'static str, message: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Ok,
            message: message.into(),
            details: Vec::new(),
            fix_hint: None,
        }
    }
}

/// Shared context for a doctor run.
#[derive(Debug, Clone)]
pub struct CheckContext {
    pub town_root: PathBuf,
}

/// A doctor check. `run` diagnoses; fixable checks repair what the last
/// `run` found.
#[async_trait]
pub trait Check: Send {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    async fn run(&mut self, ctx: &CheckContext) -> CheckResult;

    fn can_fix(&self) -> bool {
        false
    }

    async fn fix(&mut self, _ctx: &CheckContext) -> Result<()> {
        Ok(())
    }
}
