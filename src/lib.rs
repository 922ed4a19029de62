//! Core orchestration engine for the Gas Town multi-agent workbench.
//!
//! Gas Town hosts a small fleet of long-running AI coding agents, each in
//! its own terminal-multiplexer session over a per-agent git worktree, and
//! drives them through a dependency-ordered pipeline of issues, epics, and
//! molecules. This crate is the engine behind that workbench:
//!
//! - [`molecule`] - parses, validates, and bonds reusable step graphs,
//!   including the Christmas-ornament runtime fan-out with its
//!   `all-children` gate.
//! - [`epic`] - the epic state machine, the dependency scheduler, the
//!   sync/rebase engine, and PR status aggregation.
//! - [`session`] - tmux session management and the per-agent environment
//!   contract.
//! - [`rig`] and [`town`] - filesystem layout and worktree provisioning.
//! - [`refinery`] - the durable per-rig merge-request queue.
//! - [`doctor`] - settings reconciliation and resource-limit checks.
//! - [`costs`] - the per-session activity ledger.
//!
//! The CLI, the daemon supervisor, and the issue-store daemon are external
//! collaborators; the engine consumes them through the [`beads::IssueStore`]
//! and [`epic::GhClient`] traits and the injectable tmux/git runners.

pub mod beads;
pub mod costs;
pub mod doctor;
pub mod epic;
pub mod error;
mod exec;
pub mod molecule;
pub mod refinery;
pub mod rig;
pub mod session;
pub mod town;

pub use error::{GtError, Result};
