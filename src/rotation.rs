//! Startup log rotation and the external rotation policy.
//!
//! [`prepare_sink`] runs once per supervisor start, before anything writes
//! to the sink. Rotated generations are named `<file>.<n>` (or `<file>.<n>.gz`
//! once the external log manager has compressed them); a higher `n` holds
//! older content.
//!
//! [`RotationPolicy`] renders the declarative policy the host's log manager
//! applies continuously while the service runs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info, warn};

/// Suffix appended by the external log manager when it compresses a generation.
const COMPRESSED_SUFFIX: &str = ".gz";

/// Directory mode for log directories.
const LOG_DIR_MODE: u32 = 0o755;

/// File mode for active log files.
const LOG_FILE_MODE: u32 = 0o644;

/// A single append-only sink and its rotation lineage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    /// File currently receiving writes.
    pub active_path: PathBuf,
    /// Size at or above which the sink is rotated at startup.
    pub max_size_bytes: u64,
    /// Number of rotated generations kept.
    pub retention_count: u32,
}

/// What [`prepare_sink`] did to the active file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOutcome {
    /// No active file existed; an empty one was created.
    Created,
    /// The active file was below the threshold and left untouched.
    Kept,
    /// The active file became generation 1.
    Rotated {
        /// Generations deleted to honour the retention count.
        discarded: u32,
    },
}

impl LogFile {
    /// Describe a sink.
    pub fn new(active_path: impl Into<PathBuf>, max_size_bytes: u64, retention_count: u32) -> Self {
        Self {
            active_path: active_path.into(),
            max_size_bytes,
            retention_count,
        }
    }

    /// Path of rotated generation `index` (uncompressed form).
    pub fn generation_path(&self, index: u32) -> PathBuf {
        let mut name = self.active_path.as_os_str().to_owned();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn directory(&self) -> &Path {
        self.active_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    fn file_name(&self) -> anyhow::Result<String> {
        self.active_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                anyhow::anyhow!("log path has no file name: {}", self.active_path.display())
            })
    }

    /// Existing rotated generations as `(index, path)`, unordered.
    pub fn generations(&self) -> anyhow::Result<Vec<(u32, PathBuf)>> {
        let dir = self.directory();
        let prefix = format!("{}.", self.file_name()?);

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to list {}", dir.display()));
            }
        };

        let mut found = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(index) = parse_generation(&name, &prefix) {
                found.push((index, entry.path()));
            }
        }
        Ok(found)
    }
}

/// Parse `<prefix><n>` or `<prefix><n>.gz` into `n`.
fn parse_generation(name: &str, prefix: &str) -> Option<u32> {
    let rest = name.strip_prefix(prefix)?;
    let digits = rest.strip_suffix(COMPRESSED_SUFFIX).unwrap_or(rest);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|n| *n > 0)
}

/// Prepare a sink for the current run.
///
/// Ensures the containing directory exists, rotates the active file when it
/// has reached `max_size_bytes`, and leaves an existing (possibly empty)
/// active file behind. Permission adjustments are best effort.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or a rename/delete
/// during rotation fails.
pub fn prepare_sink(log: &LogFile) -> anyhow::Result<SinkOutcome> {
    let dir = log.directory();
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    set_mode_best_effort(dir, LOG_DIR_MODE);

    let outcome = match fs::metadata(&log.active_path) {
        Ok(meta) if meta.len() >= log.max_size_bytes => {
            let discarded = rotate(log)?;
            info!(
                path = %log.active_path.display(),
                size = meta.len(),
                threshold = log.max_size_bytes,
                discarded,
                "rotated log sink"
            );
            SinkOutcome::Rotated { discarded }
        }
        Ok(meta) => {
            debug!(
                path = %log.active_path.display(),
                size = meta.len(),
                "log sink below rotation threshold"
            );
            SinkOutcome::Kept
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => SinkOutcome::Created,
        Err(e) => {
            return Err(e)
                .with_context(|| format!("failed to stat {}", log.active_path.display()));
        }
    };

    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log.active_path)
        .with_context(|| format!("failed to create {}", log.active_path.display()))?;
    set_mode_best_effort(&log.active_path, LOG_FILE_MODE);

    Ok(outcome)
}

/// Shift generations up by one and move the active file to generation 1.
///
/// Returns the number of generations discarded.
fn rotate(log: &LogFile) -> anyhow::Result<u32> {
    let mut generations = log.generations()?;
    let mut discarded: u32 = 0;

    // Anything at or beyond the retention count would exceed it after the shift.
    generations.retain(|(index, path)| {
        if *index < log.retention_count {
            return true;
        }
        match fs::remove_file(path) {
            Ok(()) => discarded = discarded.saturating_add(1),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to discard log generation"),
        }
        false
    });

    // Highest first so no rename overwrites a generation not yet moved.
    generations.sort_by(|a, b| b.0.cmp(&a.0));
    for (index, path) in generations {
        let target = shifted_path(&path, index)?;
        fs::rename(&path, &target).with_context(|| {
            format!(
                "failed to shift {} to {}",
                path.display(),
                target.display()
            )
        })?;
    }

    if log.retention_count == 0 {
        fs::remove_file(&log.active_path)
            .with_context(|| format!("failed to discard {}", log.active_path.display()))?;
        return Ok(discarded.saturating_add(1));
    }

    let first = log.generation_path(1);
    fs::rename(&log.active_path, &first).with_context(|| {
        format!(
            "failed to rotate {} to {}",
            log.active_path.display(),
            first.display()
        )
    })?;

    Ok(discarded)
}

/// Same generation file with its index incremented, keeping any `.gz` suffix.
fn shifted_path(path: &Path, index: u32) -> anyhow::Result<PathBuf> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow::anyhow!("generation has no file name: {}", path.display()))?;

    let compressed = name.ends_with(COMPRESSED_SUFFIX);
    let stem_len = name
        .len()
        .saturating_sub(if compressed { COMPRESSED_SUFFIX.len() } else { 0 })
        .saturating_sub(index.to_string().len());
    let base = name.get(..stem_len).unwrap_or_default();

    let mut shifted = format!("{base}{}", index.saturating_add(1));
    if compressed {
        shifted.push_str(COMPRESSED_SUFFIX);
    }
    Ok(path.with_file_name(shifted))
}

#[cfg(unix)]
fn set_mode_best_effort(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
        warn!(
            category = "PermissionDegraded",
            path = %path.display(),
            error = %e,
            "could not adjust permissions"
        );
    }
}

#[cfg(not(unix))]
fn set_mode_best_effort(_path: &Path, _mode: u32) {}

/// Hand a log path to the service account when running as root.
///
/// No-op for unprivileged callers or when `user` is `None`. Failures are
/// reported as permission degradation and never abort.
pub fn grant_to_user(path: &Path, user: Option<&str>) {
    let Some(user) = user else {
        return;
    };
    if !nix::unistd::geteuid().is_root() {
        return;
    }

    let account = match nix::unistd::User::from_name(user) {
        Ok(Some(account)) => account,
        Ok(None) => {
            warn!(category = "PermissionDegraded", user, "service user does not exist");
            return;
        }
        Err(e) => {
            warn!(category = "PermissionDegraded", user, error = %e, "failed to look up service user");
            return;
        }
    };

    if let Err(e) = nix::unistd::chown(path, Some(account.uid), Some(account.gid)) {
        warn!(
            category = "PermissionDegraded",
            path = %path.display(),
            user,
            error = %e,
            "could not change ownership"
        );
    }
}

// ── Declarative policy ──────────────────────────────────────────

/// Continuous rotation policy for the host's log manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Glob of files the policy applies to.
    pub pattern: PathBuf,
    /// Rotate once a file reaches this size.
    pub max_size_bytes: u64,
    /// Generations kept.
    pub retention_count: u32,
    /// Account the log manager switches to while rotating.
    pub user: Option<String>,
}

impl RotationPolicy {
    /// Policy covering every `*.log` file in `logs_dir`.
    pub fn for_logs_dir(
        logs_dir: &Path,
        max_size_bytes: u64,
        retention_count: u32,
        user: Option<String>,
    ) -> Self {
        Self {
            pattern: logs_dir.join("*.log"),
            max_size_bytes,
            retention_count,
            user,
        }
    }

    /// Render in logrotate syntax.
    ///
    /// Older generations are compressed one cycle late, empty files are never
    /// rotated, and the active file is truncated in place because the
    /// control process keeps its handle open.
    pub fn render(&self) -> String {
        let mut out = format!("{} {{\n", self.pattern.display());
        out.push_str(&format!("    size {}\n", format_size(self.max_size_bytes)));
        out.push_str(&format!("    rotate {}\n", self.retention_count));
        out.push_str("    compress\n");
        out.push_str("    delaycompress\n");
        out.push_str("    notifempty\n");
        out.push_str("    missingok\n");
        out.push_str("    copytruncate\n");
        if let Some(user) = &self.user {
            out.push_str(&format!("    su {user} {user}\n"));
        }
        out.push_str("}\n");
        out
    }
}

/// Format a byte count with the largest exact logrotate unit.
fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1_048_576;
    const GIB: u64 = 1_073_741_824;

    if bytes != 0 && bytes % GIB == 0 {
        format!("{}G", bytes / GIB)
    } else if bytes != 0 && bytes % MIB == 0 {
        format!("{}M", bytes / MIB)
    } else if bytes != 0 && bytes % KIB == 0 {
        format!("{}k", bytes / KIB)
    } else {
        bytes.to_string()
    }
}
