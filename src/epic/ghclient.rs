//! PR provider: CI check and review status for upstream pull requests.
//!
//! The provider is a trait so tests inject a stub with canned responses and
//! a call log; the real implementation wraps the `gh` CLI.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::Result;
use crate::exec::Cmd;

/// A single CI check attached to a PR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrCheck {
    /// SUCCESS, FAILURE, ERROR, PENDING, QUEUED, or IN_PROGRESS.
    pub state: String,
    pub name: String,
    #[serde(rename = "detailsUrl", default)]
    pub details_url: String,
}

/// Review decision and individual reviews for a PR.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrReviewInfo {
    #[serde(rename = "reviewDecision", default)]
    pub review_decision: String,
    #[serde(default)]
    pub reviews: Vec<PrReview>,
}

/// One review on a PR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrReview {
    pub state: String,
}

/// Overall CI state of a PR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CiState {
    Success,
    Pending,
    Failure,
}

/// Aggregated CI status for a PR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CiStatus {
    pub pr_number: u64,
    pub state: CiState,
    pub details: String,
    pub url: String,
}

/// Review status of a PR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Approved,
    ChangesRequested,
    ReviewRequired,
    Pending,
}

/// Contract for the PR provider.
#[async_trait]
pub trait GhClient: Send + Sync {
    /// CI check results for a PR.
    async fn pr_checks(&self, work_dir: &Path, pr_number: u64) -> Result<Vec<PrCheck>>;

    /// Review information for a PR.
    async fn pr_reviews(&self, work_dir: &Path, pr_number: u64) -> Result<PrReviewInfo>;
}

/// Real provider wrapping the `gh` CLI.
#[derive(Debug, Default)]
pub struct GhCli;

#[async_trait]
impl GhClient for GhCli {
    async fn pr_checks(&self, work_dir: &Path, pr_number: u64) -> Result<Vec<PrCheck>> {
        let number = pr_number.to_string();
        let out = Cmd::new("gh")
            .dir(work_dir)
            .args([
                "pr",
                "checks",
                number.as_str(),
                "--json",
                "state,name,detailsUrl",
            ])
            .run()
            .await?;
        Ok(serde_json::from_str(&out)?)
    }

    async fn pr_reviews(&self, work_dir: &Path, pr_number: u64) -> Result<PrReviewInfo> {
        let number = pr_number.to_string();
        let out = Cmd::new("gh")
            .dir(work_dir)
            .args([
                "pr",
                "view",
                number.as_str(),
                "--json",
                "reviewDecision,reviews",
            ])
            .run()
            .await?;
        Ok(serde_json::from_str(&out)?)
    }
}

/// A recorded call to the PR provider (stub verification).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhClientCall {
    pub method: &'static str,
    pub work_dir: PathBuf,
    pub pr_number: u64,
}

/// Test stub returning pre-configured responses and logging calls.
#[derive(Debug, Default)]
pub struct StubGhClient {
    pub checks_response: Vec<PrCheck>,
    pub checks_error: Option<String>,
    pub reviews_response: PrReviewInfo,
    pub reviews_error: Option<String>,
    pub call_log: Mutex<Vec<GhClientCall>>,
}

#[async_trait]
impl GhClient for StubGhClient {
    async fn pr_checks(&self, work_dir: &Path, pr_number: u64) -> Result<Vec<PrCheck>> {
        self.call_log.lock().unwrap().push(GhClientCall {
            method: "pr_checks",
            work_dir: work_dir.to_path_buf(),
            pr_number,
        });
        if let Some(message) = &self.checks_error {
            return Err(crate::error::GtError::Upstream {
                command: "gh pr checks".into(),
                stderr_tail: message.clone(),
            });
        }
        Ok(self.checks_response.clone())
    }

    async fn pr_reviews(&self, work_dir: &Path, pr_number: u64) -> Result<PrReviewInfo> {
        self.call_log.lock().unwrap().push(GhClientCall {
            method: "pr_reviews",
            work_dir: work_dir.to_path_buf(),
            pr_number,
        });
        if let Some(message) = &self.reviews_error {
            return Err(crate::error::GtError::Upstream {
                command: "gh pr view".into(),
                stderr_tail: message.clone(),
            });
        }
        Ok(self.reviews_response.clone())
    }
}

/// Aggregate raw check data into a single CI status.
///
/// Any FAILURE or ERROR wins; otherwise any PENDING, QUEUED, or IN_PROGRESS
/// yields pending; otherwise success. An empty check list is a success. The
/// URL points at the first failed check.
pub fn aggregate_ci_status(pr_number: u64, checks: &[PrCheck]) -> CiStatus {
    let mut failed: Vec<&str> = Vec::new();
    let mut pending: Vec<&str> = Vec::new();
    let mut url = String::new();

    for check in checks {
        match check.state.as_str() {
            "FAILURE" | "ERROR" => {
                failed.push(&check.name);
                if url.is_empty() {
                    url = check.details_url.clone();
                }
            }
            "PENDING" | "QUEUED" | "IN_PROGRESS" => pending.push(&check.name),
            _ => {}
        }
    }

    let (state, details) = if !failed.is_empty() {
        (CiState::Failure, format!("Failed: {}", failed.join(", ")))
    } else if !pending.is_empty() {
        (CiState::Pending, format!("Pending: {}", pending.join(", ")))
    } else {
        (CiState::Success, "All checks passed".to_string())
    };

    CiStatus {
        pr_number,
        state,
        details,
        url,
    }
}

/// Map review info to a status and an approval count.
pub fn review_status(info: &PrReviewInfo) -> (ReviewStatus, usize) {
    let approvals = info
        .reviews
        .iter()
        .filter(|r| r.state == "APPROVED")
        .count();

    let status = match info.review_decision.as_str() {
        "APPROVED" => ReviewStatus::Approved,
        "CHANGES_REQUESTED" => ReviewStatus::ChangesRequested,
        "REVIEW_REQUIRED" => ReviewStatus::ReviewRequired,
        _ => ReviewStatus::Pending,
    };

    (status, approvals)
}

/// CI status for a PR via the given provider.
pub async fn pr_ci_status(
    client: &dyn GhClient,
    work_dir: &Path,
    pr_number: u64,
) -> Result<CiStatus> {
    let checks = client.pr_checks(work_dir, pr_number).await?;
    Ok(aggregate_ci_status(pr_number, &checks))
}

/// Review status and approval count for a PR via the given provider.
pub async fn pr_review_status(
    client: &dyn GhClient,
    work_dir: &Path,
    pr_number: u64,
) -> Result<(ReviewStatus, usize)> {
    let info = client.pr_reviews(work_dir, pr_number).await?;
    Ok(review_status(&info))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(state: &str, name: &str, url: &str) -> PrCheck {
        PrCheck {
            state: state.into(),
            name: name.into(),
            details_url: url.into(),
        }
    }

    #[test]
    fn test_aggregate_all_passing() {
        let status = aggregate_ci_status(
            123,
            &[
                check("SUCCESS", "lint", "https://example.com/lint"),
                check("SUCCESS", "test", "https://example.com/test"),
            ],
        );
        assert_eq!(status.state, CiState::Success);
        assert_eq!(status.details, "All checks passed");
    }

    #[test]
    fn test_aggregate_empty_checks_is_success() {
        let status = aggregate_ci_status(666, &[]);
        assert_eq!(status.state, CiState::Success);
        assert_eq!(status.details, "All checks passed");
    }

    #[test]
    fn test_aggregate_failure_with_url() {
        let status = aggregate_ci_status(
            456,
            &[
                check("SUCCESS", "lint", "https://example.com/lint"),
                check("FAILURE", "test", "U1"),
                check("SUCCESS", "build", "https://example.com/build"),
            ],
        );
        assert_eq!(status.state, CiState::Failure);
        assert_eq!(status.details, "Failed: test");
        assert_eq!(status.url, "U1");
    }

    #[test]
    fn test_aggregate_multiple_failures() {
        let status = aggregate_ci_status(
            789,
            &[
                check("FAILURE", "lint", "https://example.com/lint"),
                check("FAILURE", "test", "https://example.com/test"),
            ],
        );
        assert_eq!(status.details, "Failed: lint, test");
        assert_eq!(status.url, "https://example.com/lint");
    }

    #[test]
    fn test_aggregate_pending_states() {
        let status = aggregate_ci_status(
            111,
            &[
                check("SUCCESS", "lint", ""),
                check("PENDING", "test", ""),
                check("IN_PROGRESS", "build", ""),
            ],
        );
        assert_eq!(status.state, CiState::Pending);
        assert_eq!(status.details, "Pending: test, build");

        let queued = aggregate_ci_status(444, &[check("QUEUED", "test", "")]);
        assert_eq!(queued.state, CiState::Pending);
    }

    #[test]
    fn test_failure_takes_precedence_over_pending() {
        let status = aggregate_ci_status(
            222,
            &[
                check("SUCCESS", "a", ""),
                check("PENDING", "b", ""),
                check("FAILURE", "c", "U2"),
            ],
        );
        assert_eq!(status.state, CiState::Failure);
        assert_eq!(status.url, "U2");
    }

    #[test]
    fn test_error_state_is_failure() {
        let status = aggregate_ci_status(333, &[check("ERROR", "test", "")]);
        assert_eq!(status.state, CiState::Failure);
    }

    #[test]
    fn test_review_status_mapping() {
        let approved = PrReviewInfo {
            review_decision: "APPROVED".into(),
            reviews: vec![
                PrReview {
                    state: "APPROVED".into(),
                },
                PrReview {
                    state: "COMMENTED".into(),
                },
                PrReview {
                    state: "APPROVED".into(),
                },
                PrReview {
                    state: "DISMISSED".into(),
                },
            ],
        };
        assert_eq!(review_status(&approved), (ReviewStatus::Approved, 2));

        let changes = PrReviewInfo {
            review_decision: "CHANGES_REQUESTED".into(),
            reviews: vec![PrReview {
                state: "CHANGES_REQUESTED".into(),
            }],
        };
        assert_eq!(review_status(&changes), (ReviewStatus::ChangesRequested, 0));

        let required = PrReviewInfo {
            review_decision: "REVIEW_REQUIRED".into(),
            reviews: vec![],
        };
        assert_eq!(review_status(&required), (ReviewStatus::ReviewRequired, 0));

        let pending = PrReviewInfo::default();
        assert_eq!(review_status(&pending), (ReviewStatus::Pending, 0));
    }

    #[tokio::test]
    async fn test_stub_logs_calls() {
        let stub = StubGhClient {
            reviews_response: PrReviewInfo {
                review_decision: "APPROVED".into(),
                reviews: vec![PrReview {
                    state: "APPROVED".into(),
                }],
            },
            ..Default::default()
        };

        let _ = pr_ci_status(&stub, Path::new("/dir1"), 100).await.unwrap();
        let _ = pr_ci_status(&stub, Path::new("/dir2"), 200).await.unwrap();
        let (status, approvals) = pr_review_status(&stub, Path::new("/dir3"), 300)
            .await
            .unwrap();
        assert_eq!(status, ReviewStatus::Approved);
        assert_eq!(approvals, 1);

        let log = stub.call_log.lock().unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].method, "pr_checks");
        assert_eq!(log[0].pr_number, 100);
        assert_eq!(log[2].method, "pr_reviews");
        assert_eq!(log[2].work_dir, PathBuf::from("/dir3"));
    }

    #[tokio::test]
    async fn test_stub_error() {
        let stub = StubGhClient {
            checks_error: Some("not found".into()),
            ..Default::default()
        };
        assert!(pr_ci_status(&stub, Path::new("/dir"), 555).await.is_err());
    }
}
