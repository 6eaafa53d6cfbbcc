//! Pre-flight sanity checks for the runtime environment
//!
//! Verified before any stage runs:
//! - The programs the selected subcommand drives are on `PATH`
//! - The process runs with root privileges (EUID 0)
//!
//! Failures are returned as a single error listing every problem, so one run
//! reports all of them.

use std::env;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::{Result, bail};
use tracing::{debug, info, warn};

use crate::commands::packages::PackageManager;

/// Set to `1` or `true` to skip the root check (development only).
pub const SKIP_ROOT_ENV: &str = "WPPROVISION_SKIP_ROOT_CHECK";

/// Result of environment verification
#[derive(Debug)]
pub struct SanityCheckResult {
    pub missing_binaries: Vec<String>,
    pub is_root: bool,
}

impl SanityCheckResult {
    /// Returns true if all checks passed
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty() && self.is_root
    }

    fn describe(&self) -> String {
        let mut problems = Vec::new();
        if !self.is_root {
            problems.push("root privileges required (run with sudo or as root)".to_string());
        }
        if !self.missing_binaries.is_empty() {
            problems.push(format!(
                "missing required programs: {}",
                self.missing_binaries.join(", ")
            ));
        }
        problems.join("; ")
    }
}

/// Programs a full provisioning run invokes before it has installed anything.
pub fn required_for_run(manager: PackageManager) -> Vec<&'static str> {
    vec![
        "aws",
        "systemctl",
        "rpm",
        manager.binary(),
        "find",
        "chown",
        "usermod",
    ]
}

/// Programs `check-secret` invokes.
pub fn required_for_secret_check() -> Vec<&'static str> {
    vec!["aws"]
}

/// Check if an executable named `name` is on `PATH`
fn binary_exists(name: &str) -> bool {
    let Some(path) = env::var_os("PATH") else {
        return false;
    };
    env::split_paths(&path).any(|dir| is_executable(&dir.join(name)))
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

fn is_running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

pub fn verify_environment(required: &[&str]) -> SanityCheckResult {
    let missing = required
        .iter()
        .filter(|binary| !binary_exists(binary))
        .map(|binary| (*binary).to_string())
        .collect();

    SanityCheckResult {
        missing_binaries: missing,
        is_root: is_running_as_root(),
    }
}

pub fn should_skip_root_check() -> bool {
    env::var(SKIP_ROOT_ENV)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Run pre-flight checks; `skip_root` also honours `WPPROVISION_SKIP_ROOT_CHECK`.
pub fn run_preflight_checks(required: &[&str], skip_root: bool) -> Result<()> {
    debug!(?required, skip_root, "running pre-flight checks");

    let mut result = verify_environment(required);

    if skip_root || should_skip_root_check() {
        if !result.is_root {
            warn!("root check skipped ({}=1)", SKIP_ROOT_ENV);
        }
        result.is_root = true;
    }

    if !result.is_ok() {
        bail!("pre-flight check failed: {}", result.describe());
    }

    info!("pre-flight checks passed");
    Ok(())
}
