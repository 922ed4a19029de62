//! Bead-ID utilities: prefix table, ID generation, JSON extraction.

use std::collections::HashMap;

use uuid::Uuid;

/// Maps bead-ID prefixes to rig names. The table is data: callers can extend
/// it at runtime without touching scheduler code.
#[derive(Debug, Clone)]
pub struct PrefixMap {
    by_prefix: HashMap<String, String>,
}

impl Default for PrefixMap {
    fn default() -> Self {
        let mut by_prefix = HashMap::new();
        for (prefix, rig) in [
            ("gt", "gastown"),
            ("bd", "beads"),
            ("mi", "missioncontrol"),
            ("gp", "greenplace"),
        ] {
            by_prefix.insert(prefix.to_string(), rig.to_string());
        }
        Self { by_prefix }
    }
}

impl PrefixMap {
    /// Register or override a prefix.
    pub fn insert(&mut self, prefix: impl Into<String>, rig: impl Into<String>) {
        self.by_prefix.insert(prefix.into(), rig.into());
    }

    /// Rig name for a bead ID like `gt-epic-abc12`. Unknown prefixes yield an
    /// empty rig name; this is not a parse error.
    pub fn rig_from_bead_id(&self, bead_id: &str) -> String {
        let prefix = bead_id.split('-').next().unwrap_or("");
        self.by_prefix.get(prefix).cloned().unwrap_or_default()
    }

    /// Prefix for a rig name, if registered.
    pub fn prefix_for_rig(&self, rig: &str) -> Option<&str> {
        self.by_prefix
            .iter()
            .find(|(_, r)| r.as_str() == rig)
            .map(|(p, _)| p.as_str())
    }
}

/// Generate an issue ID of the form `<prefix>-<kind>-<5char>`.
pub fn new_issue_id(prefix: &str, kind: &str) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string()[..5].to_string();
    format!("{prefix}-{kind}-{suffix}")
}

/// Extract a bead ID from issue-store JSON output.
///
/// Accepts either a top-level object carrying an `id` string, or an array
/// whose first element is such an object. Any other shape yields `None`.
pub fn extract_bead_id_from_json(json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(json).ok()?;
    let object = match &value {
        serde_json::Value::Object(_) => &value,
        serde_json::Value::Array(items) => items.first()?,
        _ => return None,
    };
    object
        .get("id")
        .and_then(|id| id.as_str())
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string())
}
