//! Claude settings reconciler.
//!
//! Agent settings drift as the town evolves: files left at pre-worktree
//! locations, or written before a required hook existed. The check walks the
//! canonical locations, flags stale files, and the fix deletes, regenerates,
//! and cycles the affected session.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::doctor::claude_settings::ensure_settings_for_role;
use crate::doctor::{Check, CheckContext, CheckResult, CheckStatus};
use crate::error::{GtError, Result};
use crate::session::env::{session_name, Role};
use crate::session::Tmux;
use crate::town::Town;

#[derive(Debug, Clone)]
struct SettingsFile {
    path: PathBuf,
    role: Role,
    session: String,
    missing: Vec<String>,
    /// Legacy location (missing the `rig/` segment): always stale, deleted
    /// without regeneration.
    wrong_location: bool,
}

/// Verifies that agent settings.json files match the expected templates.
pub struct SettingsCheck {
    tmux: Tmux,
    stale: Vec<SettingsFile>,
}

impl SettingsCheck {
    pub fn new() -> Self {
        Self {
            tmux: Tmux::new(),
            stale: Vec::new(),
        }
    }

    pub fn with_tmux(mut self, tmux: Tmux) -> Self {
        self.tmux = tmux;
        self
    }

    fn find_settings_files(&self, town_root: &Path) -> Vec<SettingsFile> {
        let mut files = Vec::new();

        let mut push = |path: PathBuf, role: Role, session: String, wrong_location: bool| {
            if path.is_file() {
                files.push(SettingsFile {
                    path,
                    role,
                    session,
                    missing: Vec::new(),
                    wrong_location,
                });
            }
        };

        // Town-level agents.
        push(
            town_root.join(".claude/settings.json"),
            Role::Mayor,
            session_name("", Role::Mayor, None),
            false,
        );
        push(
            town_root.join("deacon/.claude/settings.json"),
            Role::Deacon,
            session_name("", Role::Deacon, None),
            false,
        );

        for rig in Town::new(town_root).rigs() {
            let rig_name = rig.name.clone();

            for role in [Role::Witness, Role::Refinery] {
                let session = session_name(&rig_name, role, None);
                push(
                    rig.path.join(role.as_str()).join("rig/.claude/settings.json"),
                    role,
                    session.clone(),
                    false,
                );
                push(
                    rig.path.join(role.as_str()).join(".claude/settings.json"),
                    role,
                    session,
                    true,
                );
            }

            for role in [Role::Crew, Role::Polecat] {
                let group = rig.path.join(role.plural());
                let Ok(entries) = std::fs::read_dir(&group) else {
                    continue;
                };
                for entry in entries.flatten() {
                    if !entry.path().is_dir() {
                        continue;
                    }
                    let worker = entry.file_name().to_string_lossy().to_string();
                    let session = session_name(&rig_name, role, Some(&worker));
                    push(
                        entry.path().join("rig/.claude/settings.json"),
                        role,
                        session.clone(),
                        false,
                    );
                    push(entry.path().join(".claude/settings.json"), role, session, true);
                }
            }
        }

        files
    }

    fn check_settings(&self, path: &Path) -> Vec<String> {
        let Ok(data) = std::fs::read_to_string(path) else {
            return vec!["unreadable".into()];
        };
        let Ok(actual) = serde_json::from_str::<serde_json::Value>(&data) else {
            return vec!["invalid JSON".into()];
        };

        let mut missing = Vec::new();
        if actual.get("enabledPlugins").is_none() {
            missing.push("enabledPlugins".into());
        }

        let Some(hooks) = actual.get("hooks").filter(|h| h.is_object()) else {
            missing.push("hooks".into());
            return missing;
        };

        if !hook_has_pattern(hooks, "SessionStart", "PATH=") {
            missing.push("PATH export".into());
        }
        if !hook_has_pattern(hooks, "SessionStart", "gt nudge deacon session-started") {
            missing.push("deacon nudge".into());
        }
        if !hook_has_pattern(hooks, "Stop", "gt costs record") {
            missing.push("Stop hook".into());
        }
        missing
    }
}

impl Default for SettingsCheck {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether any command of the named hook contains `pattern`.
fn hook_has_pattern(hooks: &serde_json::Value, hook_name: &str, pattern: &str) -> bool {
    let Some(hook_list) = hooks.get(hook_name).and_then(|h| h.as_array()) else {
        return false;
    };
    hook_list
        .iter()
        .filter_map(|entry| entry.get("hooks").and_then(|h| h.as_array()))
        .flatten()
        .filter_map(|inner| inner.get("command").and_then(|c| c.as_str()))
        .any(|command| command.contains(pattern))
}

#[async_trait]
impl Check for SettingsCheck {
    fn name(&self) -> &'static str {
        "claude-settings"
    }

    fn description(&self) -> &'static str {
        "Verify Claude settings.json files match expected templates"
    }

    async fn run(&mut self, ctx: &CheckContext) -> CheckResult {
        self.stale.clear();
        let mut details = Vec::new();

        for mut file in self.find_settings_files(&ctx.town_root) {
            if file.wrong_location {
                details.push(format!(
                    "{}: wrong location (should be in rig/ subdirectory)",
                    file.path.display()
                ));
                self.stale.push(file);
                continue;
            }

            let missing = self.check_settings(&file.path);
            if !missing.is_empty() {
                details.push(format!(
                    "{}: missing {}",
                    file.path.display(),
                    missing.join(", ")
                ));
                file.missing = missing;
                self.stale.push(file);
            }
        }

        if self.stale.is_empty() {
            return CheckResult::ok(self.name(), "All Claude settings.json files are up to date");
        }
        CheckResult {
            name: self.name(),
            status: CheckStatus::Error,
            message: format!("Found {} stale Claude settings.json file(s)", self.stale.len()),
            details,
            fix_hint: Some("Run 'gt doctor --fix' to update settings and restart affected agents".into()),
        }
    }

    fn can_fix(&self) -> bool {
        true
    }

    /// Delete each stale file, regenerate correctly-located ones from the
    /// role template, and cycle the agent's session. Errors aggregate; one
    /// failed fix does not abort the rest.
    async fn fix(&mut self, _ctx: &CheckContext) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        for file in &self.stale {
            if let Err(e) = std::fs::remove_file(&file.path) {
                errors.push(format!("failed to delete {}: {e}", file.path.display()));
                continue;
            }
            let claude_dir = file.path.parent().unwrap_or(Path::new("."));
            let _ = std::fs::remove_dir(claude_dir); // only if now empty

            if file.wrong_location {
                // The correct location gets settings when the agent starts.
                continue;
            }

            let work_dir = claude_dir.parent().unwrap_or(Path::new("."));
            if let Err(e) = ensure_settings_for_role(work_dir, file.role) {
                errors.push(format!(
                    "failed to recreate settings for {}: {e}",
                    file.path.display()
                ));
                continue;
            }

            if self.tmux.has_session(&file.session).await {
                // The daemon restarts it with fresh settings.
                let _ = self.tmux.kill_session(&file.session).await;
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(GtError::Upstream {
                command: "claude-settings fix".into(),
                stderr_tail: errors.join("; "),
            })
        }
    }
}
