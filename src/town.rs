//! Town root layout and rig discovery.

use std::path::{Path, PathBuf};

use crate::rig::Rig;

/// Directories under the town root that are never rigs.
const NON_RIG_DIRS: &[&str] = &["mayor", "deacon", "daemon", "docs"];

/// The town root: home of the mayor, the deacon, and every rig.
#[derive(Debug, Clone)]
pub struct Town {
    pub root: PathBuf,
}

impl Town {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the town root from `GT_ROOT`.
    pub fn from_env() -> Option<Self> {
        std::env::var_os("GT_ROOT").map(|root| Self::new(PathBuf::from(root)))
    }

    /// Mayor agent settings live at the town root.
    pub fn mayor_settings_path(&self) -> PathBuf {
        self.root.join(".claude/settings.json")
    }

    /// Town-level runtime state (costs ledger and friends).
    pub fn runtime_dir(&self) -> PathBuf {
        self.root.join(".runtime")
    }

    /// Rig directories under the root, skipping dotted entries and the
    /// known non-rig directories.
    pub fn rigs(&self) -> Vec<Rig> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };

        let mut rigs: Vec<Rig> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                if name.starts_with('.') || NON_RIG_DIRS.contains(&name.as_str()) {
                    return None;
                }
                Some(Rig::new(name, e.path()))
            })
            .collect();
        rigs.sort_by(|a, b| a.name.cmp(&b.name));
        rigs
    }

    /// Rig name for a path under the town root, if it falls inside one.
    pub fn rig_from_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let first = relative.components().next()?;
        let name = first.as_os_str().to_string_lossy().to_string();
        if name.is_empty() || name.starts_with('.') || NON_RIG_DIRS.contains(&name.as_str()) {
            return None;
        }
        Some(name)
    }
}
