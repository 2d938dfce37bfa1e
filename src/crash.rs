//! Crash capture: core-dump size limit and core file naming.
//!
//! Both adjustments are best effort. The limit is inherited by the control
//! process; the naming pattern is a host-wide kernel knob that only root may
//! change.

use std::path::Path;

use nix::sys::resource::{getrlimit, setrlimit, Resource};
use tracing::{debug, info, warn};

use crate::config::CrashConfig;

/// Result of [`enable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CrashCapture {
    /// The soft core limit is now unlimited (or equal to the hard limit).
    pub core_limit_raised: bool,
    /// The kernel naming pattern matches the configured pattern.
    pub pattern_installed: bool,
}

/// Raise the core limit and install the naming pattern.
///
/// Failures are logged as permission degradation and never abort.
pub fn enable(config: &CrashConfig, logs_dir: &Path) -> CrashCapture {
    if !config.enabled {
        debug!("crash capture disabled by configuration");
        return CrashCapture::default();
    }

    let core_limit_raised = match raise_core_limit() {
        Ok(limit) => {
            info!(limit = %describe_limit(limit), "core dump limit raised");
            true
        }
        Err(e) => {
            warn!(category = "PermissionDegraded", error = %e, "could not raise core dump limit");
            false
        }
    };

    let pattern = core_pattern(&config.core_pattern, logs_dir);
    let pattern_installed = match install_core_pattern(&config.core_pattern_path, &pattern) {
        Ok(()) => {
            info!(pattern = %pattern, "core file pattern set");
            true
        }
        Err(e) => {
            warn!(
                category = "PermissionDegraded",
                pattern = %pattern,
                error = %e,
                "could not set core file pattern"
            );
            false
        }
    };

    CrashCapture {
        core_limit_raised,
        pattern_installed,
    }
}

/// Absolute core pattern: relative patterns are placed in `logs_dir`.
///
/// Patterns starting with `/` or `|` (pipe to a handler) are used verbatim.
pub fn core_pattern(pattern: &str, logs_dir: &Path) -> String {
    if pattern.starts_with('/') || pattern.starts_with('|') {
        pattern.to_owned()
    } else {
        logs_dir.join(pattern).display().to_string()
    }
}

/// Set the soft and hard core limits to unlimited.
///
/// Unprivileged processes cannot raise the hard limit; in that case the
/// soft limit is raised to the current hard limit. Returns the soft limit
/// now in effect.
fn raise_core_limit() -> nix::Result<libc::rlim_t> {
    match setrlimit(Resource::RLIMIT_CORE, libc::RLIM_INFINITY, libc::RLIM_INFINITY) {
        Ok(()) => Ok(libc::RLIM_INFINITY),
        Err(e) => {
            debug!(error = %e, "unlimited hard core limit refused, using current hard limit");
            let (_soft, hard) = getrlimit(Resource::RLIMIT_CORE)?;
            setrlimit(Resource::RLIMIT_CORE, hard, hard)?;
            Ok(hard)
        }
    }
}

fn describe_limit(limit: libc::rlim_t) -> String {
    if limit == libc::RLIM_INFINITY {
        "unlimited".to_owned()
    } else {
        limit.to_string()
    }
}

/// Write the pattern to the kernel knob unless it is already set.
fn install_core_pattern(knob: &Path, pattern: &str) -> std::io::Result<()> {
    if let Ok(current) = std::fs::read_to_string(knob) {
        if current.trim_end() == pattern {
            return Ok(());
        }
    }
    std::fs::write(knob, format!("{pattern}\n"))
}
