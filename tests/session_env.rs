//! Session creation against a recording tmux stub.
//!
//! A stub shell script stands in for tmux and records the commands it was
//! given, so session creation is testable without a live multiplexer.

#![cfg(unix)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use gastown::session::env::{session_name, AgentProfile, EnvContract, Role};
use gastown::session::{SessionSpec, Tmux};

/// Write the tmux stub into `dir` and return its path.
fn write_tmux_stub(dir: &Path) -> PathBuf {
    let state_dir = dir.join("state");
    std::fs::create_dir_all(&state_dir).unwrap();

    let script = format!(
        r#"#!/bin/sh
state_dir="{state}"
session_file="$state_dir/session"
workdir_file="$state_dir/workdir"
cmd_file="$state_dir/new_session_cmd"
env_file="$state_dir/session_env"

case "$1" in
  display-message)
    if [ -f "$session_file" ]; then
      cat "$session_file"
      exit 0
    fi
    exit 1
    ;;
  new-session)
    session=""
    workdir=""
    last=""
    prev=""
    for arg in "$@"; do
      if [ "$prev" = "-s" ]; then session="$arg"; fi
      if [ "$prev" = "-c" ]; then workdir="$arg"; fi
      prev="$arg"
      last="$arg"
    done
    echo "$session" > "$session_file"
    echo "$workdir" > "$workdir_file"
    echo "$last" > "$cmd_file"
    : > "$env_file"
    exit 0
    ;;
  set-environment)
    second_last=""
    last=""
    for arg in "$@"; do
      second_last="$last"
      last="$arg"
    done
    printf '%s=%s\n' "$second_last" "$last" >> "$env_file"
    exit 0
    ;;
  list-panes)
    case "$*" in
      *pane_current_command*) echo "codex" ;;
      *pane_current_path*) cat "$workdir_file" ;;
      *pane_pid*) echo "12345" ;;
      *pane_id*) echo "%1" ;;
      *) echo "%1" ;;
    esac
    exit 0
    ;;
  kill-session)
    rm -f "$session_file"
    exit 0
    ;;
  *)
    exit 0
    ;;
esac
"#,
        state = state_dir.display()
    );

    let path = dir.join("tmux");
    std::fs::write(&path, script).unwrap();

    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn parse_env_file(path: &Path) -> HashMap<String, String> {
    let data = std::fs::read_to_string(path).unwrap_or_default();
    data.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn polecat_spec(town: &Path, work_dir: &Path) -> SessionSpec {
    let env = EnvContract::new(
        town,
        "testrig",
        Role::Polecat,
        Some("toast"),
        &town.join("testrig/.beads"),
    );
    SessionSpec {
        name: session_name("testrig", Role::Polecat, Some("toast")),
        work_dir: work_dir.to_path_buf(),
        agent: AgentProfile::codex(),
        env,
    }
}

#[tokio::test]
async fn new_session_injects_environment_contract() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = write_tmux_stub(tmp.path());
    let tmux = Tmux::new().with_bin(stub.to_string_lossy());

    let town = tmp.path().join("town");
    let work_dir = town.join("testrig/polecats/toast/rig");
    std::fs::create_dir_all(&work_dir).unwrap();

    let spec = polecat_spec(&town, &work_dir);
    tmux.new_session(&spec).await.unwrap();

    // The session command carries the agent and inline bindings.
    let state = tmp.path().join("state");
    let cmd = std::fs::read_to_string(state.join("new_session_cmd")).unwrap();
    assert!(cmd.contains("codex --dangerously-bypass-approvals-and-sandbox"));
    assert!(cmd.contains("GT_ROLE=polecat"));
    assert!(cmd.contains("GT_RIG=testrig"));

    // Every contract variable was re-broadcast via set-environment.
    let env = parse_env_file(&state.join("session_env"));
    assert_eq!(env["GT_ROLE"], "polecat");
    assert_eq!(env["GT_RIG"], "testrig");
    assert_eq!(env["GT_POLECAT"], "toast");
    assert_eq!(env["GT_ROOT"], town.to_string_lossy());
    assert_eq!(env["BEADS_DIR"], town.join("testrig/.beads").to_string_lossy());
    assert_eq!(env["BD_ACTOR"], "testrig/polecats/toast");
    assert_eq!(env["GIT_AUTHOR_NAME"], "toast");
    assert_eq!(env["BEADS_AGENT_NAME"], "testrig/toast");
    assert_eq!(env["BEADS_NO_DAEMON"], "1");
}

#[tokio::test]
async fn duplicate_session_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = write_tmux_stub(tmp.path());
    let tmux = Tmux::new().with_bin(stub.to_string_lossy());

    let town = tmp.path().join("town");
    let work_dir = town.join("testrig/polecats/toast/rig");
    std::fs::create_dir_all(&work_dir).unwrap();

    let spec = polecat_spec(&town, &work_dir);
    tmux.new_session(&spec).await.unwrap();

    let err = tmux.new_session(&spec).await.unwrap_err();
    assert!(matches!(err, gastown::GtError::SessionExists(_)));
}

#[tokio::test]
async fn session_state_queries() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = write_tmux_stub(tmp.path());
    let tmux = Tmux::new().with_bin(stub.to_string_lossy());

    let town = tmp.path().join("town");
    let work_dir = town.join("testrig/polecats/toast/rig");
    std::fs::create_dir_all(&work_dir).unwrap();

    let spec = polecat_spec(&town, &work_dir);
    assert!(!tmux.has_session(&spec.name).await);

    tmux.new_session(&spec).await.unwrap();
    assert!(tmux.has_session(&spec.name).await);

    assert_eq!(tmux.pane_command(&spec.name).await.unwrap(), "codex");
    assert_eq!(
        tmux.pane_path(&spec.name).await.unwrap(),
        work_dir.to_string_lossy()
    );
    assert_eq!(tmux.pane_pid(&spec.name).await.unwrap(), 12345);
    assert_eq!(tmux.pane_id(&spec.name).await.unwrap(), "%1");

    tmux.kill_session(&spec.name).await.unwrap();
    assert!(!tmux.has_session(&spec.name).await);
}
