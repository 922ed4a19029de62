//! Activity and costs ledger.
//!
//! Agent sessions record work units here through their Stop hooks (`gt costs
//! record`) and patrol nudges land alongside them. The ledger is an
//! append-only JSONL file under the town runtime dir; summaries aggregate
//! per session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;
use crate::town::Town;

/// Kind of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    Cost,
    Nudge,
    Escalation,
}

/// One recorded work unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Session the entry belongs to (e.g. `gt-gastown-polecat-toast`).
    pub session: String,
    pub kind: LedgerKind,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Aggregated activity of one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSummary {
    pub costs: usize,
    pub nudges: usize,
    pub escalations: usize,
    pub total_usd: f64,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Idle-time thresholds for the patrol nudge matrix. Documented defaults;
/// nothing in the engine enforces them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NudgeThresholds {
    /// Idle time before the first nudge.
    pub nudge: Duration,
    /// Idle time before nudges escalate.
    pub escalate_soft: Duration,
    /// Idle time before the witness gets involved.
    pub escalate_hard: Duration,
}

impl Default for NudgeThresholds {
    fn default() -> Self {
        Self {
            nudge: Duration::from_secs(10 * 60),
            escalate_soft: Duration::from_secs(15 * 60),
            escalate_hard: Duration::from_secs(20 * 60),
        }
    }
}

/// Append-only JSONL ledger.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The town's ledger at `<town>/.runtime/costs.jsonl`.
    pub fn for_town(town: &Town) -> Self {
        Self::new(town.runtime_dir().join("costs.jsonl"))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Append one entry. A single O_APPEND write per entry keeps concurrent
    /// recorders from interleaving partial lines.
    pub fn record(&self, entry: &LedgerEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// All entries in record order. Truncated or malformed lines are skipped.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&self.path)?;
        Ok(data
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    /// Per-session activity summary.
    pub fn summarize(&self) -> Result<BTreeMap<String, SessionSummary>> {
        let mut summaries: BTreeMap<String, SessionSummary> = BTreeMap::new();
        for entry in self.entries()? {
            let summary = summaries.entry(entry.session.clone()).or_default();
            match entry.kind {
                LedgerKind::Cost => summary.costs += 1,
                LedgerKind::Nudge => summary.nudges += 1,
                LedgerKind::Escalation => summary.escalations += 1,
            }
            summary.total_usd += entry.amount_usd.unwrap_or(0.0);
            if summary.last_activity.map(|at| at < entry.at).unwrap_or(true) {
                summary.last_activity = Some(entry.at);
            }
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(session: &str, kind: LedgerKind, amount: Option<f64>) -> LedgerEntry {
        LedgerEntry {
            session: session.into(),
            kind,
            at: Utc::now(),
            amount_usd: amount,
            note: None,
        }
    }

    #[test]
    fn test_record_and_read_back() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(tmp.path().join(".runtime/costs.jsonl"));

        ledger
            .record(&entry("gt-gastown-polecat-toast", LedgerKind::Cost, Some(1.25)))
            .unwrap();
        ledger
            .record(&entry("gt-gastown-polecat-toast", LedgerKind::Nudge, None))
            .unwrap();

        let entries = ledger.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, LedgerKind::Cost);
        assert_eq!(entries[0].amount_usd, Some(1.25));
    }

    #[test]
    fn test_summarize_groups_by_session() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(tmp.path().join("costs.jsonl"));

        ledger
            .record(&entry("gt-gastown-polecat-toast", LedgerKind::Cost, Some(2.0)))
            .unwrap();
        ledger
            .record(&entry("gt-gastown-polecat-toast", LedgerKind::Cost, Some(0.5)))
            .unwrap();
        ledger
            .record(&entry("gt-gastown-polecat-toast", LedgerKind::Nudge, None))
            .unwrap();
        ledger
            .record(&entry("gt-gastown-crew-alice", LedgerKind::Escalation, None))
            .unwrap();

        let summaries = ledger.summarize().unwrap();
        assert_eq!(summaries.len(), 2);

        let toast = &summaries["gt-gastown-polecat-toast"];
        assert_eq!(toast.costs, 2);
        assert_eq!(toast.nudges, 1);
        assert_eq!(toast.escalations, 0);
        assert!((toast.total_usd - 2.5).abs() < 1e-9);
        assert!(toast.last_activity.is_some());

        let alice = &summaries["gt-gastown-crew-alice"];
        assert_eq!(alice.escalations, 1);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(tmp.path().join("absent.jsonl"));
        assert!(ledger.entries().unwrap().is_empty());
        assert!(ledger.summarize().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("costs.jsonl");
        let ledger = Ledger::new(&path);

        ledger
            .record(&entry("gt-mayor", LedgerKind::Cost, Some(1.0)))
            .unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"{truncated\n")
            .unwrap();
        ledger
            .record(&entry("gt-mayor", LedgerKind::Cost, Some(1.0)))
            .unwrap();

        assert_eq!(ledger.entries().unwrap().len(), 2);
    }

    #[test]
    fn test_default_nudge_thresholds() {
        let thresholds = NudgeThresholds::default();
        assert_eq!(thresholds.nudge, Duration::from_secs(600));
        assert_eq!(thresholds.escalate_soft, Duration::from_secs(900));
        assert_eq!(thresholds.escalate_hard, Duration::from_secs(1200));
    }
}
