//! Coordination service (message bus master) availability.
//!
//! The supervisor probes the coordinator's TCP endpoint. When nothing is
//! listening it fires the configured start command in the background,
//! sleeps a fixed grace period, and probes exactly once more. There is no
//! readiness polling and no retry.

use std::process::Stdio;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::config::BusConfig;
use crate::environment::LaunchEnvironment;
use crate::error::LaunchError;

/// Port the coordination service listens on when the URI omits one.
pub const DEFAULT_COORDINATOR_PORT: u16 = 11311;

/// How the coordination service was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusStatus {
    /// It was already reachable.
    AlreadyRunning,
    /// It was started by this supervisor and answered after the grace period.
    Started,
}

/// Extract `(host, port)` from a coordinator URI such as `http://10.0.0.2:11311`.
///
/// # Errors
///
/// Returns [`LaunchError::DependencyUnavailable`] when the URI is malformed
/// or has no host.
pub fn coordinator_address(uri: &str) -> Result<(String, u16), LaunchError> {
    let unavailable = |reason: String| LaunchError::DependencyUnavailable {
        uri: uri.to_owned(),
        reason,
    };

    let parsed = url::Url::parse(uri).map_err(|e| unavailable(format!("invalid URI: {e}")))?;
    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| unavailable("URI has no host".to_owned()))?
        .to_owned();
    let port = parsed.port().unwrap_or(DEFAULT_COORDINATOR_PORT);
    Ok((host, port))
}

/// Whether something accepts TCP connections at the coordinator address.
pub async fn is_reachable(host: &str, port: u16, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            debug!(host, port, error = %e, "coordinator probe refused");
            false
        }
        Err(_) => {
            debug!(host, port, "coordinator probe timed out");
            false
        }
    }
}

/// Make sure the coordination service answers, starting it if needed.
///
/// The started process is detached: it is neither awaited nor stopped by
/// the supervisor.
///
/// # Errors
///
/// Returns [`LaunchError::DependencyUnavailable`] if the URI is malformed,
/// the start command cannot be spawned, or the service is still unreachable
/// after the grace period.
pub async fn ensure_running(
    uri: &str,
    config: &BusConfig,
    env: &LaunchEnvironment,
) -> Result<BusStatus, LaunchError> {
    let (host, port) = coordinator_address(uri)?;
    let probe_timeout = Duration::from_millis(config.probe_timeout_ms);

    if is_reachable(&host, port, probe_timeout).await {
        info!(uri, "coordination service already running");
        return Ok(BusStatus::AlreadyRunning);
    }

    let (program, args) =
        config
            .start_command
            .split_first()
            .ok_or_else(|| LaunchError::DependencyUnavailable {
                uri: uri.to_owned(),
                reason: "no start command configured".to_owned(),
            })?;

    info!(uri, command = %program, "coordination service not reachable, starting it");
    let spawned = tokio::process::Command::new(program)
        .args(args)
        .envs(env.iter())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    match spawned {
        // Detached.
        Ok(child) => debug!(pid = ?child.id(), "coordination service spawned"),
        Err(e) => {
            return Err(LaunchError::DependencyUnavailable {
                uri: uri.to_owned(),
                reason: format!("failed to run {program}: {e}"),
            });
        }
    }

    info!(grace_secs = config.grace_secs, "waiting for coordination service");
    tokio::time::sleep(Duration::from_secs(config.grace_secs)).await;

    if is_reachable(&host, port, probe_timeout).await {
        info!(uri, "coordination service started");
        Ok(BusStatus::Started)
    } else {
        Err(LaunchError::DependencyUnavailable {
            uri: uri.to_owned(),
            reason: format!("not reachable {}s after start", config.grace_secs),
        })
    }
}
