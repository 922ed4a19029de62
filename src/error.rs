//! Error types shared across the orchestration engine.

use std::path::PathBuf;

use crate::epic::sync::ConflictInfo;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GtError>;

/// Errors produced by the orchestration engine.
///
/// Every variant renders as a single terminal-friendly line; structured
/// payloads (conflict files, cycle members) ride along for callers that want
/// to print details.
#[derive(Debug, thiserror::Error)]
pub enum GtError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("illegal epic transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("dependency cycle detected among: {}", members.join(", "))]
    CycleDetected { members: Vec<String> },

    #[error("merge conflict on {} (base {}): {} file(s)", .0.branch, .0.base_branch, .0.files.len())]
    ConflictDetected(ConflictInfo),

    #[error("unbound template variable: {{{{{0}}}}}")]
    UnboundTemplateVar(String),

    #[error("unknown molecule: {0}")]
    UnknownMolecule(String),

    #[error("duplicate step ref: {0}")]
    DuplicateRef(String),

    #[error("invalid step ref: {0:?}")]
    InvalidStepRef(String),

    #[error("merge request not found: {0}")]
    MrNotFound(String),

    #[error("merge request {0} has not failed; nothing to retry")]
    MrNotFailed(String),

    #[error("no canonical repository at {0}")]
    NoCanonicalRepo(PathBuf),

    #[error("tmux session already exists: {0}")]
    SessionExists(String),

    #[error("{command} failed: {stderr_tail}")]
    Upstream { command: String, stderr_tail: String },

    #[error("{0} timed out")]
    Timeout(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl GtError {
    /// Exit code for CLI collaborators: 1 user error, 2 configuration error,
    /// 3 upstream unavailable, 4 partial failure with actionable detail.
    pub fn exit_code(&self) -> i32 {
        match self {
            GtError::NotFound(_)
            | GtError::AlreadyExists(_)
            | GtError::IllegalTransition { .. }
            | GtError::CycleDetected { .. }
            | GtError::UnboundTemplateVar(_)
            | GtError::UnknownMolecule(_)
            | GtError::DuplicateRef(_)
            | GtError::InvalidStepRef(_)
            | GtError::MrNotFound(_)
            | GtError::MrNotFailed(_)
            | GtError::SessionExists(_) => 1,
            GtError::NoCanonicalRepo(_) | GtError::Io(_) | GtError::Json(_) => 2,
            GtError::Upstream { .. } | GtError::Timeout(_) | GtError::Cancelled(_) => 3,
            GtError::ConflictDetected(_) => 4,
        }
    }

    /// Optional multi-line detail block for terminal display.
    pub fn details(&self) -> Vec<String> {
        match self {
            GtError::ConflictDetected(info) => info.files.clone(),
            GtError::CycleDetected { members } => members.clone(),
            _ => Vec::new(),
        }
    }
}

/// Truncate subprocess stderr to its last few lines for error messages.
pub(crate) fn stderr_tail(stderr: &[u8], max_lines: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(GtError::DuplicateRef("x".into()).exit_code(), 1);
        assert_eq!(GtError::NoCanonicalRepo(PathBuf::from("/r")).exit_code(), 2);
        assert_eq!(
            GtError::Upstream {
                command: "git fetch".into(),
                stderr_tail: "boom".into()
            }
            .exit_code(),
            3
        );
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let tail = stderr_tail(b"one\ntwo\nthree\nfour\n", 2);
        assert_eq!(tail, "three; four");
    }

    #[test]
    fn test_cycle_message_lists_members() {
        let err = GtError::CycleDetected {
            members: vec!["gt-a".into(), "gt-b".into()],
        };
        assert!(err.to_string().contains("gt-a, gt-b"));
    }
}
