//! Epic lifecycle state machine.
//!
//! The machine owns legality only; callers decide when to transition. A
//! landed-then-reverted epic cannot roll back to InProgress; it must be
//! closed and re-created.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{GtError, Result};

/// Lifecycle state of an epic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpicState {
    Drafting,
    Ready,
    InProgress,
    Review,
    Submitted,
    Landed,
    Closed,
}

impl EpicState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpicState::Drafting => "drafting",
            EpicState::Ready => "ready",
            EpicState::InProgress => "in_progress",
            EpicState::Review => "review",
            EpicState::Submitted => "submitted",
            EpicState::Landed => "landed",
            EpicState::Closed => "closed",
        }
    }

    /// States reachable from this one.
    pub fn successors(&self) -> &'static [EpicState] {
        match self {
            EpicState::Drafting => &[EpicState::Ready, EpicState::Closed],
            EpicState::Ready => &[EpicState::InProgress, EpicState::Drafting],
            EpicState::InProgress => &[EpicState::Review],
            EpicState::Review => &[EpicState::Submitted],
            EpicState::Submitted => &[EpicState::Landed],
            EpicState::Landed => &[EpicState::Closed],
            EpicState::Closed => &[],
        }
    }
}

impl fmt::Display for EpicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EpicState {
    type Err = GtError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "drafting" => Ok(EpicState::Drafting),
            "ready" => Ok(EpicState::Ready),
            "in_progress" => Ok(EpicState::InProgress),
            "review" => Ok(EpicState::Review),
            "submitted" => Ok(EpicState::Submitted),
            "landed" => Ok(EpicState::Landed),
            "closed" => Ok(EpicState::Closed),
            other => Err(GtError::NotFound(format!("epic state {other:?}"))),
        }
    }
}

/// Whether `from -> to` is a permitted transition.
pub fn valid_transition(from: EpicState, to: EpicState) -> bool {
    from.successors().contains(&to)
}

/// Validate a transition, returning the new state or `IllegalTransition`.
pub fn transition(from: EpicState, to: EpicState) -> Result<EpicState> {
    if valid_transition(from, to) {
        Ok(to)
    } else {
        Err(GtError::IllegalTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
