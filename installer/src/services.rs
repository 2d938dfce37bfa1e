//! Boot-time service installation and removal.
//!
//! [`ServiceInstaller`] checks preconditions, observes the current
//! [`UnitState`], computes a plan from it and executes the plan step by step
//! against the filesystem and a [`ServiceManager`]. Steps do not re-check
//! state themselves: convergence comes from planning against a fresh
//! observation, so an interrupted run is completed by running it again.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, info, warn};

use humanoid::bootstrap;
use humanoid::config::{LauncherConfig, RuntimePaths};
use humanoid::error::LaunchError;
use humanoid::rotation::{self, RotationPolicy};

use crate::systemctl::ServiceManager;
use crate::unit::{plan_install, plan_uninstall, Step, UnitState};

/// Permissions of files written outside the workspace.
const SYSTEM_FILE_MODE: u32 = 0o644;

/// Outcome of an install or uninstall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleReport {
    /// State observed before any change.
    pub before: UnitState,
    /// Steps executed, in order.
    pub steps: Vec<Step>,
    /// State observed afterwards.
    pub after: UnitState,
}

/// Installs and removes the launcher's unit and rotation policy.
pub struct ServiceInstaller<M> {
    paths: RuntimePaths,
    config: LauncherConfig,
    manager: M,
    effective_uid: u32,
}

impl<M: ServiceManager> ServiceInstaller<M> {
    /// Create an installer acting with the caller's effective uid.
    pub fn new(paths: RuntimePaths, config: LauncherConfig, manager: M) -> Self {
        Self {
            paths,
            config,
            manager,
            effective_uid: nix::unistd::geteuid().as_raw(),
        }
    }

    /// Override the effective uid used for the privilege check.
    #[must_use]
    pub fn with_effective_uid(mut self, uid: u32) -> Self {
        self.effective_uid = uid;
        self
    }

    /// The service manager in use.
    pub fn manager(&self) -> &M {
        &self.manager
    }

    /// Installed unit definition.
    pub fn unit_path(&self) -> PathBuf {
        self.config.service.unit_dir.join(&self.config.service.unit_name)
    }

    /// Installed rotation policy.
    pub fn policy_path(&self) -> PathBuf {
        self.config
            .service
            .policy_dir
            .join(&self.config.service.policy_name)
    }

    /// Unit template shipped in the workspace.
    pub fn template_path(&self) -> PathBuf {
        self.paths.startup_dir.join(&self.config.service.unit_template)
    }

    /// Launcher entry point the unit runs.
    pub fn entry_point_path(&self) -> PathBuf {
        self.paths.startup_dir.join(&self.config.service.entry_point)
    }

    fn require_privilege(&self, operation: &'static str) -> Result<(), LaunchError> {
        if self.effective_uid == 0 {
            return Ok(());
        }
        Err(LaunchError::Privilege {
            operation,
            euid: self.effective_uid,
        })
    }

    fn require_artifact(what: &'static str, path: &Path) -> Result<(), LaunchError> {
        if path.is_file() {
            Ok(())
        } else {
            Err(LaunchError::MissingArtifact {
                what,
                path: path.to_path_buf(),
            })
        }
    }

    /// Combine filesystem and service manager observations.
    ///
    /// # Errors
    ///
    /// Returns an error if the service manager cannot be queried.
    pub async fn observe(&self) -> anyhow::Result<UnitState> {
        let unit = &self.config.service.unit_name;
        let manager = self.manager.query(unit).await?;
        // A mask is a /dev/null link, which `is_file` rejects.
        Ok(UnitState {
            file_present: self.unit_path().is_file(),
            enabled: manager.enabled,
            masked: manager.masked,
            active: manager.active,
            policy_present: self.policy_path().is_file(),
        })
    }

    /// Install, enable and (re)start the unit.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Privilege`] before any change when not root,
    /// [`LaunchError::MissingArtifact`] when the entry point or unit
    /// template is absent, and plain errors for failed steps.
    pub async fn install(&self) -> anyhow::Result<LifecycleReport> {
        self.require_privilege("install")?;

        let entry_point = self.entry_point_path();
        let template = self.template_path();
        Self::require_artifact("launcher entry point", &entry_point)?;
        Self::require_artifact("unit template", &template)?;

        if bootstrap::ensure_executable(&entry_point)? {
            info!(path = %entry_point.display(), "made entry point executable");
        }
        self.prepare_logs()?;

        let before = self.observe().await?;
        let steps = plan_install(&before);
        info!(unit = %self.config.service.unit_name, ?before, steps = steps.len(), "installing service");
        self.execute(&steps).await?;

        let after = self.observe().await?;
        self.report_status().await;
        Ok(LifecycleReport {
            before,
            steps,
            after,
        })
    }

    /// Stop, disable and remove the unit and its rotation policy.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Privilege`] before any change when not root,
    /// and plain errors for failed steps.
    pub async fn uninstall(&self) -> anyhow::Result<LifecycleReport> {
        self.require_privilege("uninstall")?;

        let before = self.observe().await?;
        let steps = plan_uninstall(&before);
        info!(unit = %self.config.service.unit_name, ?before, steps = steps.len(), "uninstalling service");
        self.execute(&steps).await?;

        let after = self.observe().await?;
        Ok(LifecycleReport {
            before,
            steps,
            after,
        })
    }

    /// Observe the unit without changing anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the service manager cannot be queried.
    pub async fn status(&self) -> anyhow::Result<UnitState> {
        self.observe().await
    }

    /// Ensure the log directories and primary sink exist for the service user.
    ///
    /// An existing primary sink is left as is, whatever its size.
    fn prepare_logs(&self) -> anyhow::Result<()> {
        let logs = &self.config.logs;
        let user = self.config.service.user.as_deref();

        std::fs::create_dir_all(&self.paths.logs_dir)
            .with_context(|| format!("failed to create {}", self.paths.logs_dir.display()))?;
        rotation::grant_to_user(&self.paths.logs_dir, user);

        let ros_log_dir = &self.config.robot.ros_log_dir;
        std::fs::create_dir_all(ros_log_dir)
            .with_context(|| format!("failed to create {}", ros_log_dir.display()))?;
        rotation::grant_to_user(ros_log_dir, user);

        // Never rotated here: a running supervisor holds this file open.
        let primary = self.paths.logs_dir.join(&logs.primary_file);
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&primary)
            .with_context(|| format!("failed to create {}", primary.display()))?;
        rotation::grant_to_user(&primary, user);
        Ok(())
    }

    fn render_policy(&self) -> String {
        let logs = &self.config.logs;
        RotationPolicy::for_logs_dir(
            &self.paths.logs_dir,
            logs.primary_max_bytes,
            logs.retention,
            self.config.service.user.clone(),
        )
        .render()
    }

    async fn execute(&self, steps: &[Step]) -> anyhow::Result<()> {
        let unit = &self.config.service.unit_name;
        for step in steps {
            debug!(%step, "executing step");
            match step {
                Step::WritePolicy => {
                    let policy = self.render_policy();
                    write_atomic(&self.policy_path(), policy.as_bytes())?;
                    info!(path = %self.policy_path().display(), "installed rotation policy");
                }
                Step::InstallUnitFile => {
                    let template = self.template_path();
                    let contents = std::fs::read(&template)
                        .with_context(|| format!("failed to read {}", template.display()))?;
                    write_atomic(&self.unit_path(), &contents)?;
                    info!(path = %self.unit_path().display(), "installed unit file");
                }
                Step::RemoveUnitFile => remove_if_present(&self.unit_path())?,
                Step::RemovePolicy => remove_if_present(&self.policy_path())?,
                Step::Manager(command) => self
                    .manager
                    .run(*command, unit)
                    .await
                    .with_context(|| format!("failed to {step}"))?,
            }
        }
        Ok(())
    }

    /// Log the manager's status summary. Never fails the install.
    async fn report_status(&self) {
        let unit = &self.config.service.unit_name;
        match self.manager.status(unit).await {
            Ok(summary) => info!(unit = %unit, "{summary}"),
            Err(e) => warn!(unit = %unit, error = %e, "could not query service status"),
        }
    }
}

/// Replace `dest` with `contents` via a temporary file in the same directory.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file cannot
/// be written or renamed.
pub fn write_atomic(dest: &Path, contents: &[u8]) -> anyhow::Result<()> {
    let dir = dest
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", dest.display()))?;
    let name = dest
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("path has no file name: {}", dest.display()))?;
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(name);
    tmp_name.push(format!(".tmp-{}", std::process::id()));
    let tmp = dir.join(tmp_name);

    let result = (|| -> anyhow::Result<()> {
        let mut file = std::fs::File::create(&tmp)
            .with_context(|| format!("failed to create {}", tmp.display()))?;
        file.write_all(contents)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        file.sync_all()
            .with_context(|| format!("failed to sync {}", tmp.display()))?;
        set_mode(&tmp, SYSTEM_FILE_MODE)?;
        std::fs::rename(&tmp, dest).with_context(|| {
            format!("failed to move {} to {}", tmp.display(), dest.display())
        })
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("failed to set mode of {}", path.display()))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> anyhow::Result<()> {
    Ok(())
}

fn remove_if_present(path: &Path) -> anyhow::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "removed file");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "file already absent");
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
    }
}
