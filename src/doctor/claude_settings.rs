//! Canonical Claude settings.json templates for agent work directories.

use std::path::Path;

use serde_json::json;

use crate::error::Result;
use crate::session::env::Role;

/// The settings template every agent role starts from. Hooks wire the agent
/// into the town: PATH export so `gt` resolves inside the session, a
/// session-started nudge to the deacon, and a Stop hook recording costs.
pub fn settings_template(role: Role) -> serde_json::Value {
    json!({
        "enabledPlugins": {},
        "gtRole": role.as_str(),
        "hooks": {
            "SessionStart": [
                {
                    "hooks": [
                        {
                            "type": "command",
                            "command": "export PATH=$HOME/.local/bin:$PATH"
                        },
                        {
                            "type": "command",
                            "command": "gt nudge deacon session-started"
                        }
                    ]
                }
            ],
            "Stop": [
                {
                    "hooks": [
                        {
                            "type": "command",
                            "command": "gt costs record"
                        }
                    ]
                }
            ]
        }
    })
}

/// Write the role's settings into `<work_dir>/.claude/settings.json`,
/// creating the directory as needed. Existing settings are left alone.
pub fn ensure_settings_for_role(work_dir: &Path, role: Role) -> Result<()> {
    let claude_dir = work_dir.join(".claude");
    let settings_path = claude_dir.join("settings.json");
    if settings_path.exists() {
        return Ok(());
    }

    std::fs::create_dir_all(&claude_dir)?;
    let content = serde_json::to_string_pretty(&settings_template(role))?;
    std::fs::write(&settings_path, content)?;
    Ok(())
}
