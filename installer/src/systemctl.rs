//! Service manager seam and its systemd implementation.
//!
//! [`Systemctl`] drives the host's system instance of systemd. All
//! `std::process::Command` invocations use the hardcoded `systemctl`
//! program; only the verb and the configured unit name vary.

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::unit::UnitCommand;

/// What the service manager reports about a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ManagerState {
    /// Starts at boot.
    pub enabled: bool,
    /// Administratively blocked.
    pub masked: bool,
    /// Currently running.
    pub active: bool,
}

/// Operations the installer needs from a service manager.
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// Observe enablement, mask and activity of `unit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the manager cannot be queried at all.
    async fn query(&self, unit: &str) -> anyhow::Result<ManagerState>;

    /// Run `command` against `unit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    async fn run(&self, command: UnitCommand, unit: &str) -> anyhow::Result<()>;

    /// Human-readable status summary for `unit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the status cannot be obtained.
    async fn status(&self, unit: &str) -> anyhow::Result<String>;
}

/// The host systemd instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct Systemctl;

impl Systemctl {
    /// Run `systemctl <args>` and capture exit status and stdout.
    async fn capture(args: Vec<String>) -> anyhow::Result<(Option<i32>, String)> {
        let output = tokio::task::spawn_blocking(move || {
            std::process::Command::new("systemctl")
                .args(&args)
                .stdin(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .output()
        })
        .await
        .context("systemctl task panicked")?
        .context("failed to run systemctl")?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        Ok((output.status.code(), stdout))
    }
}

/// Interpret `systemctl is-enabled` output.
///
/// `masked` and `masked-runtime` mean blocked; `enabled`, `enabled-runtime`,
/// `static`, `alias` and `indirect` count as starting at boot.
pub fn parse_is_enabled(output: &str) -> (bool, bool) {
    match output.lines().next().map(str::trim).unwrap_or_default() {
        "masked" | "masked-runtime" => (false, true),
        "enabled" | "enabled-runtime" | "static" | "alias" | "indirect" => (true, false),
        _ => (false, false),
    }
}

#[async_trait]
impl ServiceManager for Systemctl {
    async fn query(&self, unit: &str) -> anyhow::Result<ManagerState> {
        // Both verbs exit non-zero for "no"; only the output matters.
        let (_, enabled_out) =
            Self::capture(vec!["is-enabled".to_owned(), unit.to_owned()]).await?;
        let (active_code, _) =
            Self::capture(vec!["is-active".to_owned(), "--quiet".to_owned(), unit.to_owned()])
                .await?;

        let (enabled, masked) = parse_is_enabled(&enabled_out);
        let state = ManagerState {
            enabled,
            masked,
            active: active_code == Some(0),
        };
        debug!(unit, ?state, "queried systemd unit");
        Ok(state)
    }

    async fn run(&self, command: UnitCommand, unit: &str) -> anyhow::Result<()> {
        let verb = command.verb();
        info!(action = verb, unit, "running systemctl");

        let mut args = vec![verb.to_owned()];
        if command.takes_unit() {
            args.push(unit.to_owned());
        }

        let result = tokio::task::spawn_blocking(move || {
            std::process::Command::new("systemctl")
                .args(&args)
                .stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status()
        })
        .await;

        match result {
            Ok(Ok(status)) if status.success() => {
                debug!(action = verb, unit, "systemctl command succeeded");
                Ok(())
            }
            Ok(Ok(status)) if command.is_tolerated() => {
                debug!(
                    action = verb,
                    unit,
                    exit_code = ?status.code(),
                    "systemctl command returned non-zero (nothing to do)"
                );
                Ok(())
            }
            Ok(Ok(status)) => anyhow::bail!(
                "systemctl {verb} {unit} failed with exit code {:?}",
                status.code()
            ),
            Ok(Err(e)) if command.is_tolerated() => {
                warn!(error = %e, action = verb, unit, "failed to run systemctl");
                Ok(())
            }
            Ok(Err(e)) => Err(e).context("failed to run systemctl"),
            Err(e) => Err(e).context("systemctl task panicked"),
        }
    }

    async fn status(&self, unit: &str) -> anyhow::Result<String> {
        let (code, out) = Self::capture(vec![
            "status".to_owned(),
            "--no-pager".to_owned(),
            "--lines=0".to_owned(),
            unit.to_owned(),
        ])
        .await?;
        debug!(unit, exit_code = ?code, "systemctl status");
        Ok(out)
    }
}
