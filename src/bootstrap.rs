//! Workspace bootstrap: directory structure, executable bits, interpreter check.
//!
//! Every operation is an idempotent "ensure" and safe to re-run.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info};

use crate::config::RuntimePaths;
use crate::error::LaunchError;

/// Interpreters the control stack needs on `PATH`.
pub const REQUIRED_INTERPRETERS: [&str; 1] = ["python3"];

/// Extensions treated as launchable scripts.
const SCRIPT_EXTENSIONS: [&str; 2] = ["sh", "py"];

/// Summary of a bootstrap run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Directories that did not exist before.
    pub created_dirs: Vec<PathBuf>,
    /// Files whose executable bits were added.
    pub made_executable: Vec<PathBuf>,
    /// Resolved interpreter locations.
    pub interpreters: Vec<PathBuf>,
}

/// Create every workspace directory that is missing.
///
/// Returns the directories that were created.
///
/// # Errors
///
/// Returns an error if a directory cannot be created.
pub fn ensure_directories(paths: &RuntimePaths) -> anyhow::Result<Vec<PathBuf>> {
    let mut created = Vec::new();
    for dir in paths.required_dirs() {
        if dir.is_dir() {
            continue;
        }
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
        debug!(dir = %dir.display(), "created directory");
        created.push(dir.to_path_buf());
    }
    Ok(created)
}

/// Add executable bits to `path` if any are missing.
///
/// Returns `true` when the mode changed.
///
/// # Errors
///
/// Returns an error if the file cannot be inspected or its mode changed.
#[cfg(unix)]
pub fn ensure_executable(path: &Path) -> anyhow::Result<bool> {
    use std::os::unix::fs::PermissionsExt;

    let meta = fs::metadata(path).with_context(|| format!("failed to stat {}", path.display()))?;
    let mode = meta.permissions().mode();
    if mode & 0o111 == 0o111 {
        return Ok(false);
    }
    fs::set_permissions(path, fs::Permissions::from_mode(mode | 0o755))
        .with_context(|| format!("failed to make {} executable", path.display()))?;
    Ok(true)
}

/// Add executable bits to `path` if any are missing.
///
/// # Errors
///
/// Never fails on non-unix targets.
#[cfg(not(unix))]
pub fn ensure_executable(_path: &Path) -> anyhow::Result<bool> {
    Ok(false)
}

/// Whether `path` is a regular file with at least one executable bit.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Whether `path` is a regular file.
#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Make every script in `dir` executable (non-recursive).
///
/// Scripts are regular files ending in `.sh` or `.py`, or with no extension.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed or a mode change fails.
pub fn mark_scripts_executable(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("failed to list {}", dir.display())),
    };

    let mut changed = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || !is_script(&path) {
            continue;
        }
        if ensure_executable(&path)? {
            changed.push(path);
        }
    }
    changed.sort();
    Ok(changed)
}

fn is_script(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        None => true,
        Some(ext) => SCRIPT_EXTENSIONS.contains(&ext),
    }
}

/// Locate an interpreter on a search path (`None` uses the process `PATH`).
///
/// # Errors
///
/// Returns [`LaunchError::MissingArtifact`] when the interpreter is absent.
pub fn find_interpreter(name: &str, search_path: Option<OsString>) -> Result<PathBuf, LaunchError> {
    let search_path = search_path.or_else(|| std::env::var_os("PATH"));
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    which::which_in(name, search_path, cwd).map_err(|_| LaunchError::MissingArtifact {
        what: "interpreter",
        path: PathBuf::from(name),
    })
}

/// Run the full bootstrap for a workspace.
///
/// # Errors
///
/// Returns an error if directories or modes cannot be set, or a
/// [`LaunchError::MissingArtifact`] if a required interpreter is absent.
pub fn run(paths: &RuntimePaths, search_path: Option<OsString>) -> anyhow::Result<BootstrapReport> {
    let created_dirs = ensure_directories(paths)?;
    for dir in &created_dirs {
        info!(dir = %dir.display(), "created workspace directory");
    }

    let mut made_executable = mark_scripts_executable(&paths.startup_dir)?;
    made_executable.extend(mark_scripts_executable(&paths.scripts_dir)?);
    for file in &made_executable {
        info!(file = %file.display(), "set executable permission");
    }

    let mut interpreters = Vec::new();
    for name in REQUIRED_INTERPRETERS {
        let found = find_interpreter(name, search_path.clone())?;
        info!(interpreter = name, path = %found.display(), "interpreter found");
        interpreters.push(found);
    }

    Ok(BootstrapReport {
        created_dirs,
        made_executable,
        interpreters,
    })
}
