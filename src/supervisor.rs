//! Process supervision for the robot control stack.
//!
//! One sequential pass per start: ensure directories, resolve the robot
//! profile, make sure the coordination service answers, enable crash
//! capture, verify the entry point, then launch the control process and
//! block until it exits. Its exit code becomes the supervisor's.
//!
//! [`CleanupGuard`] is the single finaliser. It reports once, on whichever
//! path ends the run: normal child exit, a fatal precondition failure, or a
//! termination signal.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::{error, info, warn};

use crate::config::{LauncherConfig, RuntimePaths};
use crate::environment::LaunchEnvironment;
use crate::error::LaunchError;
use crate::profile::{self, RobotProfile};
use crate::rotation::{self, LogFile};
use crate::{bootstrap, bus, crash};

/// Base added to a signal number to form an exit code.
const SIGNAL_EXIT_BASE: i32 = 128;

/// How long output is still drained after the control process is reaped.
/// Descendants may hold the pipes open indefinitely.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

// ── Cleanup ─────────────────────────────────────────────────────

/// How a supervised run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitPath {
    /// The run has not finished yet.
    Pending,
    /// The control process exited on its own.
    ChildExited,
    /// A fatal precondition failed before or during launch.
    Fatal {
        /// Error category label.
        category: &'static str,
    },
    /// The supervisor received a termination signal.
    Signalled {
        /// Signal name.
        signal: &'static str,
    },
}

#[derive(Debug)]
struct CleanupReport {
    pid: Option<u32>,
    exit_code: Option<i32>,
    exit_path: ExitPath,
}

/// Run-once finaliser reporting the outcome of a supervised run.
///
/// Reporting only: it releases nothing and never alters the exit code.
/// Runs on [`CleanupGuard::finish`] or on drop, whichever comes first.
#[derive(Debug)]
pub struct CleanupGuard {
    started_at: DateTime<Utc>,
    report: Mutex<CleanupReport>,
    fired: AtomicBool,
}

impl Default for CleanupGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl CleanupGuard {
    /// Register the finaliser for the current run.
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            report: Mutex::new(CleanupReport {
                pid: None,
                exit_code: None,
                exit_path: ExitPath::Pending,
            }),
            fired: AtomicBool::new(false),
        }
    }

    fn update(&self, f: impl FnOnce(&mut CleanupReport)) {
        let mut report = self
            .report
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut report);
    }

    /// Record the launched control process.
    pub fn record_spawn(&self, pid: Option<u32>) {
        self.update(|r| r.pid = pid);
    }

    /// Record the control process's exit code.
    pub fn record_child_exit(&self, code: i32) {
        self.update(|r| {
            r.exit_code = Some(code);
            r.exit_path = ExitPath::ChildExited;
        });
    }

    /// Record a fatal failure.
    pub fn record_fatal(&self, category: &'static str, code: i32) {
        self.update(|r| {
            r.exit_code = Some(code);
            r.exit_path = ExitPath::Fatal { category };
        });
    }

    /// Record a termination signal.
    pub fn record_signal(&self, signal: &'static str, code: i32) {
        self.update(|r| {
            r.exit_code = Some(code);
            r.exit_path = ExitPath::Signalled { signal };
        });
    }

    /// Current exit path.
    pub fn exit_path(&self) -> ExitPath {
        let report = self
            .report
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        report.exit_path.clone()
    }

    /// Whether the final report has been emitted.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Emit the final report. Returns `false` if it already ran.
    pub fn finish(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }

        let report = self
            .report
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let elapsed_secs = Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds();

        info!(
            pid = ?report.pid,
            exit_code = ?report.exit_code,
            exit_path = ?report.exit_path,
            elapsed_secs,
            "supervisor cleanup"
        );
        true
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.finish();
    }
}

// ── Signals ─────────────────────────────────────────────────────

/// Interrupt and termination listeners registered at startup.
pub struct TerminationSignals {
    interrupt: Signal,
    terminate: Signal,
}

impl TerminationSignals {
    /// Install SIGINT and SIGTERM listeners.
    ///
    /// # Errors
    ///
    /// Returns an error if a listener cannot be registered.
    pub fn register() -> anyhow::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).context("failed to register SIGINT")?,
            terminate: signal(SignalKind::terminate()).context("failed to register SIGTERM")?,
        })
    }

    /// Wait for the next signal; returns its name and conventional exit code.
    pub async fn recv(&mut self) -> (&'static str, i32) {
        tokio::select! {
            _ = self.interrupt.recv() => ("SIGINT", SIGNAL_EXIT_BASE.saturating_add(libc::SIGINT)),
            _ = self.terminate.recv() => ("SIGTERM", SIGNAL_EXIT_BASE.saturating_add(libc::SIGTERM)),
        }
    }
}

// ── Launch ──────────────────────────────────────────────────────

/// Everything needed to start the control process, produced by
/// [`Supervisor::prepare`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    /// Resolved deployment profile.
    pub profile: RobotProfile,
    /// Outbound environment.
    pub environment: LaunchEnvironment,
    /// Control process executable.
    pub entry_point: PathBuf,
    /// Arguments passed to the entry point.
    pub args: Vec<String>,
}

/// The supervised control process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildProcess {
    /// Operating-system process id.
    pub pid: Option<u32>,
    /// Exit code, `None` until the process has been reaped.
    pub exit_code: Option<i32>,
}

/// Orchestrates one supervised run.
#[derive(Debug, Clone)]
pub struct Supervisor {
    paths: RuntimePaths,
    config: LauncherConfig,
}

impl Supervisor {
    /// Create a supervisor for a workspace.
    pub fn new(paths: RuntimePaths, config: LauncherConfig) -> Self {
        Self { paths, config }
    }

    /// Workspace layout.
    pub fn paths(&self) -> &RuntimePaths {
        &self.paths
    }

    /// Loaded configuration.
    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    /// The supervisor's own log sink.
    pub fn primary_sink(&self) -> LogFile {
        LogFile::new(
            self.paths.logs_dir.join(&self.config.logs.primary_file),
            self.config.logs.primary_max_bytes,
            self.config.logs.retention,
        )
    }

    /// The control process's output sink.
    pub fn stream_sink(&self) -> LogFile {
        LogFile::new(
            self.paths.logs_dir.join(&self.config.logs.stream_file),
            self.config.logs.stream_max_bytes,
            self.config.logs.retention,
        )
    }

    /// Rotate and create both sinks and hand them to the service user.
    ///
    /// # Errors
    ///
    /// Returns an error if a sink cannot be prepared.
    pub fn prepare_sinks(&self) -> anyhow::Result<()> {
        let user = self.config.service.user.as_deref();
        for sink in [self.primary_sink(), self.stream_sink()] {
            rotation::prepare_sink(&sink)?;
            rotation::grant_to_user(&sink.active_path, user);
        }
        rotation::grant_to_user(&self.paths.logs_dir, user);
        Ok(())
    }

    /// Run every precondition and produce a [`LaunchPlan`].
    ///
    /// Nothing is spawned before all checks pass, except the coordination
    /// service itself when it has to be started.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError`] variants for unknown robot types, an
    /// unavailable coordination service, or a missing entry point, and
    /// plain errors for I/O failures.
    pub async fn prepare(&self) -> anyhow::Result<LaunchPlan> {
        bootstrap::ensure_directories(&self.paths)?;
        let ros_log_dir = &self.config.robot.ros_log_dir;
        std::fs::create_dir_all(ros_log_dir)
            .with_context(|| format!("failed to create {}", ros_log_dir.display()))?;

        let profile = profile::resolve(
            self.config.robot.robot_type.as_deref(),
            &self.paths.config_dir,
        )?;
        let inherited = std::env::var(crate::environment::VAR_LD_LIBRARY_PATH).ok();
        let environment =
            LaunchEnvironment::build(&profile, &self.config, &self.paths, inherited.as_deref());
        info!(
            robot_type = %profile.type_tag,
            endpoint = %profile.network_endpoint,
            coordinator = %profile.coordinator_uri,
            config_file = %profile.config_file_path.display(),
            "robot profile resolved"
        );
        if !profile.config_file_path.is_file() {
            warn!(
                path = %profile.config_file_path.display(),
                "variant configuration document not found"
            );
        }

        let probe_uri = self
            .config
            .bus
            .probe_uri
            .as_deref()
            .unwrap_or(&profile.coordinator_uri);
        bus::ensure_running(probe_uri, &self.config.bus, &environment).await?;

        crash::enable(&self.config.crash, &self.paths.logs_dir);

        let entry_point = self.config.control.entry_point_path(&self.paths);
        verify_entry_point(&entry_point)?;

        Ok(LaunchPlan {
            profile,
            environment,
            entry_point,
            args: self.config.control.args.clone(),
        })
    }

    /// Launch the control process and block until it exits.
    ///
    /// Output is fanned out line by line to the console and the stream
    /// sink. Returns the child's exit code (`128 + signal` if it was killed).
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or waited on, or
    /// the stream sink cannot be opened.
    pub async fn launch(&self, plan: &LaunchPlan, guard: &CleanupGuard) -> anyhow::Result<i32> {
        let sink_path = self.stream_sink().active_path;
        let sink = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&sink_path)
            .await
            .with_context(|| format!("failed to open {}", sink_path.display()))?;
        let sink = Arc::new(tokio::sync::Mutex::new(sink));

        let mut child = tokio::process::Command::new(&plan.entry_point)
            .args(&plan.args)
            .envs(plan.environment.iter())
            .current_dir(&self.paths.startup_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to launch {}", plan.entry_point.display()))?;

        let mut process = ChildProcess {
            pid: child.id(),
            exit_code: None,
        };
        guard.record_spawn(process.pid);
        info!(pid = ?process.pid, entry_point = %plan.entry_point.display(), "control process launched");

        let mut pumps = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump_lines(
                stdout,
                tokio::io::stdout(),
                Arc::clone(&sink),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump_lines(
                stderr,
                tokio::io::stderr(),
                Arc::clone(&sink),
            )));
        }

        let status = child
            .wait()
            .await
            .context("failed to wait for control process")?;

        let deadline = tokio::time::Instant::now()
            .checked_add(OUTPUT_DRAIN_TIMEOUT)
            .unwrap_or_else(tokio::time::Instant::now);
        for mut pump in pumps {
            match tokio::time::timeout_at(deadline, &mut pump).await {
                Ok(Ok(Ok(_lines))) => {}
                Ok(Ok(Err(e))) => warn!(error = %e, "output fan-out ended with an error"),
                Ok(Err(e)) => warn!(error = %e, "output fan-out task failed"),
                Err(_) => {
                    pump.abort();
                    warn!(
                        pid = ?process.pid,
                        "output still open after control process exited, detaching"
                    );
                }
            }
        }

        let code = exit_code_of(status);
        process.exit_code = Some(code);
        guard.record_child_exit(code);
        info!(?process, "control process exited");
        Ok(code)
    }

    /// Prepare and launch; returns the child's exit code.
    ///
    /// # Errors
    ///
    /// See [`Supervisor::prepare`] and [`Supervisor::launch`].
    pub async fn run(&self, guard: &CleanupGuard) -> anyhow::Result<i32> {
        let plan = self.prepare().await?;
        self.launch(&plan, guard).await
    }

    /// Run under signal supervision and map every outcome to an exit code.
    ///
    /// A termination signal abandons the run (the control process is left
    /// to the host's default signal delivery) and yields `128 + signal`.
    pub async fn run_until_signal(
        &self,
        guard: &CleanupGuard,
        signals: &mut TerminationSignals,
    ) -> i32 {
        tokio::select! {
            result = self.run(guard) => match result {
                Ok(code) => code,
                Err(e) => {
                    let code = crate::error::exit_code_for(&e);
                    let category = crate::error::category_for(&e);
                    error!(category, exit_code = code, "{e:#}");
                    guard.record_fatal(category, code);
                    code
                }
            },
            (name, code) = signals.recv() => {
                warn!(signal = name, "termination signal received");
                guard.record_signal(name, code);
                code
            }
        }
    }
}

/// Check that the control entry point exists and is executable.
///
/// # Errors
///
/// Returns [`LaunchError::MissingArtifact`] otherwise.
pub fn verify_entry_point(path: &Path) -> Result<(), LaunchError> {
    if !path.is_file() {
        return Err(LaunchError::MissingArtifact {
            what: "control entry point",
            path: path.to_path_buf(),
        });
    }
    if !bootstrap::is_executable(path) {
        return Err(LaunchError::MissingArtifact {
            what: "executable control entry point",
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Exit code of a finished process; `128 + signal` when killed by a signal.
pub fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(sig)) => SIGNAL_EXIT_BASE.saturating_add(sig),
        (None, None) => crate::error::EXIT_FAILURE,
    }
}

/// Copy lines from `reader` to `console` and the shared sink as they arrive.
///
/// Write failures on either side never stop the reader: the control process
/// must not see a closed pipe. A failing sink is warned about once and then
/// skipped.
async fn pump_lines<R, W>(
    reader: R,
    mut console: W,
    sink: Arc<tokio::sync::Mutex<tokio::fs::File>>,
) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let mut count: u64 = 0;
    let mut sink_ok = true;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }

        if console.write_all(&line).await.is_ok() {
            let _ = console.flush().await;
        }

        if sink_ok {
            let mut file = sink.lock().await;
            let written = match file.write_all(&line).await {
                Ok(()) => file.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                warn!(
                    category = "PermissionDegraded",
                    error = %e,
                    "cannot write control output to log sink, console only from now on"
                );
                sink_ok = false;
            }
        }
        count = count.saturating_add(1);
    }

    Ok(count)
}
