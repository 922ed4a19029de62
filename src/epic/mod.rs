//! Epic lifecycle, dependency scheduling, branch sync, and PR status.

pub mod ghclient;
pub mod scheduler;
pub mod state;
pub mod sync;

pub use ghclient::{
    aggregate_ci_status, pr_ci_status, pr_review_status, review_status, CiState, CiStatus,
    GhCli, GhClient, PrCheck, PrReview, PrReviewInfo, ReviewStatus, StubGhClient,
};
pub use scheduler::{RollupState, Scheduler, StatusCounts, StatusRollup};
pub use state::{transition, valid_transition, EpicState};
pub use sync::{ConflictInfo, RebaseResult, SyncEngine};
