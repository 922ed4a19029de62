//! File-descriptor and inotify limits check.
//!
//! A town runs dozens of agent processes, each watching big worktrees; the
//! default kernel ceilings fall over well before the town does. The check
//! measures current limits and generates a platform-appropriate remediation
//! script. The script is never executed automatically; raising limits needs
//! sudo and a human.

use async_trait::async_trait;
use std::fmt;
use std::path::Path;

use crate::doctor::{Check, CheckContext, CheckResult, CheckStatus};
use crate::error::{GtError, Result};

/// Minimum file descriptors a town needs headroom for.
pub const TARGET_FILE_DESCRIPTORS: u64 = 1_048_576;
/// Minimum inotify watches.
pub const TARGET_INOTIFY_WATCHES: u64 = 524_288;
/// Minimum inotify instances.
pub const TARGET_INOTIFY_INSTANCES: u64 = 512;

/// Host platform, as far as limits handling is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Unknown,
    LinuxBareMetal,
    LinuxContainer,
    Wsl,
    MacOs,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Platform::Unknown => "Unknown",
            Platform::LinuxBareMetal => "Linux (bare metal)",
            Platform::LinuxContainer => "Linux (container)",
            Platform::Wsl => "WSL",
            Platform::MacOs => "macOS",
        })
    }
}

/// Detect the host platform.
pub fn detect_platform() -> Platform {
    if cfg!(target_os = "macos") {
        return Platform::MacOs;
    }
    if cfg!(target_os = "linux") {
        if is_wsl() {
            return Platform::Wsl;
        }
        if is_container() {
            return Platform::LinuxContainer;
        }
        return Platform::LinuxBareMetal;
    }
    Platform::Unknown
}

/// WSL kernels identify themselves in /proc/version.
pub fn is_wsl() -> bool {
    std::fs::read_to_string("/proc/version")
        .map(|v| v.to_lowercase().contains("microsoft"))
        .unwrap_or(false)
}

/// Container detection via marker files and cgroup names.
pub fn is_container() -> bool {
    if Path::new("/.dockerenv").exists() || Path::new("/run/.containerenv").exists() {
        return true;
    }
    std::fs::read_to_string("/proc/1/cgroup")
        .map(|cgroup| {
            ["docker", "containerd", "kubepods", "lxc"]
                .iter()
                .any(|marker| cgroup.contains(marker))
        })
        .unwrap_or(false)
}

/// Read a single integer from a /proc file.
pub fn read_proc_int(path: &str) -> Result<u64> {
    let text = std::fs::read_to_string(path)?;
    text.trim()
        .parse()
        .map_err(|_| GtError::NotFound(format!("integer in {path}")))
}

/// Current soft and hard RLIMIT_NOFILE.
#[cfg(unix)]
pub fn file_descriptor_limits() -> Result<(u64, u64)> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok((limit.rlim_cur as u64, limit.rlim_max as u64))
}

#[cfg(not(unix))]
pub fn file_descriptor_limits() -> Result<(u64, u64)> {
    Ok((0, 0))
}

/// Checks fd and inotify ceilings against town-scale targets.
pub struct LimitsCheck {
    platform: Platform,
    fd_soft: u64,
    fd_hard: u64,
    watches: u64,
    instances: u64,
    issues: Vec<String>,
    fix_script: String,
}

impl LimitsCheck {
    pub fn new() -> Self {
        Self {
            platform: Platform::Unknown,
            fd_soft: 0,
            fd_hard: 0,
            watches: 0,
            instances: 0,
            issues: Vec::new(),
            fix_script: String::new(),
        }
    }

    /// The remediation script generated by the last run, if any.
    pub fn fix_script(&self) -> &str {
        &self.fix_script
    }

    fn measure(&mut self) -> Result<()> {
        self.platform = detect_platform();
        let (soft, hard) = file_descriptor_limits()?;
        self.fd_soft = soft;
        self.fd_hard = hard;
        if cfg!(target_os = "linux") {
            self.watches = read_proc_int("/proc/sys/fs/inotify/max_user_watches").unwrap_or(0);
            self.instances = read_proc_int("/proc/sys/fs/inotify/max_user_instances").unwrap_or(0);
        }
        Ok(())
    }

    fn collect_issues(&mut self) {
        self.issues.clear();
        if self.fd_soft < TARGET_FILE_DESCRIPTORS {
            self.issues.push(format!(
                "soft fd limit {} below target {}",
                self.fd_soft, TARGET_FILE_DESCRIPTORS
            ));
        }
        if self.fd_hard < TARGET_FILE_DESCRIPTORS {
            self.issues.push(format!(
                "hard fd limit {} below target {}",
                self.fd_hard, TARGET_FILE_DESCRIPTORS
            ));
        }
        if cfg!(target_os = "linux") {
            if self.watches < TARGET_INOTIFY_WATCHES {
                self.issues.push(format!(
                    "inotify watches {} below target {}",
                    self.watches, TARGET_INOTIFY_WATCHES
                ));
            }
            if self.instances < TARGET_INOTIFY_INSTANCES {
                self.issues.push(format!(
                    "inotify instances {} below target {}",
                    self.instances, TARGET_INOTIFY_INSTANCES
                ));
            }
        }
    }

    /// Build the remediation script for the detected platform.
    pub fn generate_fix_script(&self) -> String {
        let mut script = String::new();
        script.push_str("#!/bin/bash\n");
        script.push_str("# Gas Town limits fix script\n");
        script.push_str("# Review before running; requires sudo.\n");
        script.push_str("set -e\n\n");

        match self.platform {
            Platform::Wsl => {
                script.push_str("# --- WSL fixes ---\n");
                script.push_str("cat <<'EOF' | sudo tee /etc/security/limits.d/gastown.conf\n");
                script.push_str(&format!(
                    "* soft nofile {TARGET_FILE_DESCRIPTORS}\n* hard nofile {TARGET_FILE_DESCRIPTORS}\nEOF\n"
                ));
                script.push_str(&format!(
                    "echo 'fs.inotify.max_user_watches={TARGET_INOTIFY_WATCHES}' | sudo tee -a /etc/sysctl.conf\n"
                ));
                script.push_str(&format!(
                    "echo 'fs.inotify.max_user_instances={TARGET_INOTIFY_INSTANCES}' | sudo tee -a /etc/sysctl.conf\n"
                ));
                script.push_str("sudo sysctl -p\n");
                script.push_str("# Then restart WSL from Windows: wsl --shutdown\n");
            }
            Platform::MacOs => {
                script.push_str("# --- macOS fixes ---\n");
                script.push_str(&format!(
                    "sudo launchctl limit maxfiles {TARGET_FILE_DESCRIPTORS} {TARGET_FILE_DESCRIPTORS}\n"
                ));
                script.push_str(&format!(
                    "ulimit -n {TARGET_FILE_DESCRIPTORS}\n"
                ));
                script.push_str("# macOS uses FSEvents rather than inotify; no watch ceiling to raise.\n");
            }
            Platform::LinuxContainer => {
                script.push_str("# --- Container fixes ---\n");
                script.push_str("# Limits must be raised on the container runtime, not inside.\n");
                script.push_str(&format!(
                    "# docker run --ulimit nofile={TARGET_FILE_DESCRIPTORS}:{TARGET_FILE_DESCRIPTORS} ...\n"
                ));
                script.push_str("# Kubernetes: set the node-level sysctls below on the host.\n");
                script.push_str(&format!(
                    "echo 'fs.inotify.max_user_watches={TARGET_INOTIFY_WATCHES}' | sudo tee -a /etc/sysctl.conf\n"
                ));
                script.push_str(&format!(
                    "echo 'fs.inotify.max_user_instances={TARGET_INOTIFY_INSTANCES}' | sudo tee -a /etc/sysctl.conf\n"
                ));
                script.push_str("sudo sysctl -p\n");
            }
            Platform::LinuxBareMetal | Platform::Unknown => {
                script.push_str("# --- Linux fixes ---\n");
                script.push_str("cat <<'EOF' | sudo tee /etc/security/limits.d/gastown.conf\n");
                script.push_str(&format!(
                    "* soft nofile {TARGET_FILE_DESCRIPTORS}\n* hard nofile {TARGET_FILE_DESCRIPTORS}\nEOF\n"
                ));
                script.push_str(&format!(
                    "echo 'fs.inotify.max_user_watches={TARGET_INOTIFY_WATCHES}' | sudo tee -a /etc/sysctl.conf\n"
                ));
                script.push_str(&format!(
                    "echo 'fs.inotify.max_user_instances={TARGET_INOTIFY_INSTANCES}' | sudo tee -a /etc/sysctl.conf\n"
                ));
                script.push_str("sudo sysctl -p\n");
            }
        }

        script.push_str("\n# --- Verification ---\n");
        script.push_str("ulimit -n\n");
        if self.platform != Platform::MacOs {
            script.push_str("cat /proc/sys/fs/inotify/max_user_watches\n");
            script.push_str("cat /proc/sys/fs/inotify/max_user_instances\n");
        }
        script
    }
}

impl Default for LimitsCheck {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Check for LimitsCheck {
    fn name(&self) -> &'static str {
        "limits"
    }

    fn description(&self) -> &'static str {
        "Check file descriptor and inotify limits"
    }

    async fn run(&mut self, _ctx: &CheckContext) -> CheckResult {
        if let Err(e) = self.measure() {
            return CheckResult {
                name: self.name(),
                status: CheckStatus::Error,
                message: format!("Failed to get resource limits: {e}"),
                details: Vec::new(),
                fix_hint: None,
            };
        }
        self.collect_issues();

        let mut details = vec![
            format!("Platform: {}", self.platform),
            format!(
                "File descriptors: soft={} hard={}",
                self.fd_soft, self.fd_hard
            ),
        ];
        if cfg!(target_os = "linux") {
            details.push(format!("Inotify watches: {}", self.watches));
            details.push(format!("Inotify instances: {}", self.instances));
        }

        if self.issues.is_empty() {
            self.fix_script.clear();
            return CheckResult {
                name: self.name(),
                status: CheckStatus::Ok,
                message: "Resource limits meet town-scale targets".into(),
                details,
                fix_hint: None,
            };
        }

        self.fix_script = self.generate_fix_script();
        details.extend(self.issues.iter().cloned());
        CheckResult {
            name: self.name(),
            status: CheckStatus::Warning,
            message: format!("{} limit issue(s) found", self.issues.len()),
            details,
            fix_hint: Some("Run 'gt doctor --fix' to generate a remediation script".into()),
        }
    }

    fn can_fix(&self) -> bool {
        true
    }

    /// Write the remediation script for manual execution. Never runs it.
    async fn fix(&mut self, ctx: &CheckContext) -> Result<()> {
        if self.fix_script.is_empty() {
            return Ok(());
        }

        let dir = ctx.town_root.join(".runtime");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("fix-limits.sh");
        std::fs::write(&path, &self.fix_script)?;

        Err(GtError::Upstream {
            command: "limits fix".into(),
            stderr_tail: format!(
                "manual execution required: review and run 'sudo bash {}'",
                path.display()
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_metadata() {
        let check = LimitsCheck::new();
        assert_eq!(check.name(), "limits");
        assert_eq!(
            check.description(),
            "Check file descriptor and inotify limits"
        );
        assert!(check.can_fix());
    }

    #[test]
    fn test_platform_strings() {
        assert_eq!(Platform::Unknown.to_string(), "Unknown");
        assert_eq!(Platform::LinuxBareMetal.to_string(), "Linux (bare metal)");
        assert_eq!(Platform::LinuxContainer.to_string(), "Linux (container)");
        assert_eq!(Platform::Wsl.to_string(), "WSL");
        assert_eq!(Platform::MacOs.to_string(), "macOS");
    }

    #[test]
    fn test_detect_platform_is_known_value() {
        let platform = detect_platform();
        if cfg!(target_os = "macos") {
            assert_eq!(platform, Platform::MacOs);
        }
        if cfg!(target_os = "linux") {
            assert_ne!(platform, Platform::MacOs);
            assert_ne!(platform, Platform::Unknown);
        }
    }

    #[test]
    fn test_target_constants() {
        assert!(TARGET_FILE_DESCRIPTORS >= 65_536);
        assert!(TARGET_INOTIFY_WATCHES >= 65_536);
        assert!(TARGET_INOTIFY_INSTANCES >= 128);
    }

    #[test]
    fn test_read_proc_int_nonexistent() {
        assert!(read_proc_int("/nonexistent/proc/file").is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_read_proc_int() {
        let val = read_proc_int("/proc/sys/kernel/pid_max").unwrap();
        assert!(val > 0);
    }

    fn check_with(platform: Platform) -> LimitsCheck {
        let mut check = LimitsCheck::new();
        check.platform = platform;
        check.fd_soft = 1024;
        check.fd_hard = 65536;
        check.watches = 8192;
        check.instances = 128;
        check.issues = vec!["test issue".into()];
        check
    }

    #[test]
    fn test_fix_script_basics() {
        let script = check_with(Platform::LinuxBareMetal).generate_fix_script();
        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains("Gas Town limits fix script"));
        assert!(script.contains("set -e"));
        assert!(script.contains("Verification"));
    }

    #[test]
    fn test_fix_script_wsl() {
        let script = check_with(Platform::Wsl).generate_fix_script();
        assert!(script.contains("WSL fixes"));
        assert!(script.contains("wsl --shutdown"));
    }

    #[test]
    fn test_fix_script_macos() {
        let script = check_with(Platform::MacOs).generate_fix_script();
        assert!(script.contains("macOS fixes"));
        assert!(script.contains("launchctl"));
        assert!(script.contains("FSEvents"));
    }

    #[test]
    fn test_fix_script_container() {
        let script = check_with(Platform::LinuxContainer).generate_fix_script();
        assert!(script.contains("Container fixes"));
        assert!(script.contains("docker run"));
        assert!(script.contains("Kubernetes"));
    }

    #[tokio::test]
    async fn test_fix_without_issues_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let mut check = LimitsCheck::new();
        let ctx = CheckContext {
            town_root: tmp.path().to_path_buf(),
        };
        assert!(check.fix(&ctx).await.is_ok());
    }

    #[tokio::test]
    async fn test_fix_with_issues_requires_manual_run() {
        let tmp = tempfile::tempdir().unwrap();
        let mut check = LimitsCheck::new();
        check.fix_script = "#!/bin/bash\necho 'fix script'\n".into();

        let ctx = CheckContext {
            town_root: tmp.path().to_path_buf(),
        };
        let err = check.fix(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("manual execution required"));
        assert!(tmp.path().join(".runtime/fix-limits.sh").exists());
    }

    #[tokio::test]
    async fn test_run_reports_platform_and_fds() {
        let tmp = tempfile::tempdir().unwrap();
        let mut check = LimitsCheck::new();
        let result = check
            .run(&CheckContext {
                town_root: tmp.path().to_path_buf(),
            })
            .await;

        assert!(result.details.iter().any(|d| d.starts_with("Platform:")));
        assert!(result
            .details
            .iter()
            .any(|d| d.contains("File descriptors:")));
    }
}
