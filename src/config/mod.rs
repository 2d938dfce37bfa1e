//! Launcher configuration and workspace layout.
//!
//! Loads `<workspace>/config/launcher.toml` when present. Environment
//! variables override file values; file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Workspace root used when `HUMANOID_WORKSPACE` is not set.
pub const DEFAULT_WORKSPACE: &str = "/home/nav01/zj_humanoid";

/// Name of the optional configuration file inside `config/`.
pub const CONFIG_FILE_NAME: &str = "launcher.toml";

/// Environment variable selecting the workspace root.
pub const ENV_WORKSPACE: &str = "HUMANOID_WORKSPACE";

/// Environment variable carrying the robot-type tag.
pub const ENV_ROBOT_TYPE: &str = "ROBOT_TYPE";

/// Environment variable carrying the instance name.
pub const ENV_ROBOT_NAME: &str = "ROBOT_NAME";

/// Environment variable for the external (middleware) log directory.
pub const ENV_ROS_LOG_DIR: &str = "ROS_LOG_DIR";

/// Environment variable overriding the bus grace period.
pub const ENV_BUS_GRACE_SECS: &str = "HUMANOID_BUS_GRACE_SECS";

// ── Workspace layout ────────────────────────────────────────────

/// Resolved filesystem layout under the workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    /// Workspace root.
    pub root: PathBuf,
    /// Variant configuration documents and `launcher.toml`.
    pub config_dir: PathBuf,
    /// Entry points and the unit template.
    pub startup_dir: PathBuf,
    /// Rotated log generations.
    pub logs_dir: PathBuf,
    /// Auxiliary scripts.
    pub scripts_dir: PathBuf,
    /// Shared assets.
    pub shared_dir: PathBuf,
    /// Compute-board runtime (libraries).
    pub orin_dir: PathBuf,
}

impl RuntimePaths {
    /// Derive the layout from a workspace root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config_dir: root.join("config"),
            startup_dir: root.join("startup"),
            logs_dir: root.join("logs"),
            scripts_dir: root.join("scripts"),
            shared_dir: root.join("shared"),
            orin_dir: root.join("orin"),
            root,
        }
    }

    /// Resolve the workspace root from the process environment.
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Resolve the workspace root using a custom env resolver.
    pub fn from_env_with(env: impl Fn(&str) -> Option<String>) -> Self {
        match env(ENV_WORKSPACE).filter(|v| !v.trim().is_empty()) {
            Some(root) => Self::new(root),
            None => Self::new(DEFAULT_WORKSPACE),
        }
    }

    /// Directories that must exist before anything is launched.
    pub fn required_dirs(&self) -> [&Path; 7] {
        [
            &self.root,
            &self.config_dir,
            &self.startup_dir,
            &self.logs_dir,
            &self.scripts_dir,
            &self.shared_dir,
            &self.orin_dir,
        ]
    }

    /// Path of the optional `launcher.toml`.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }
}

// ── Top-level config ────────────────────────────────────────────

/// Top-level launcher configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Robot identity and external log location.
    pub robot: RobotConfig,
    /// Log sink names, thresholds and retention.
    pub logs: LogsConfig,
    /// Coordination service handling.
    pub bus: BusConfig,
    /// Control process invocation.
    pub control: ControlConfig,
    /// Boot-time service definition.
    pub service: ServiceConfig,
    /// Crash capture.
    pub crash: CrashConfig,
}

impl LauncherConfig {
    /// Load configuration for a workspace with env overrides applied.
    ///
    /// A missing `launcher.toml` yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed, or
    /// fails validation.
    pub fn load(paths: &RuntimePaths) -> Result<Self> {
        Self::load_with(paths, |key| std::env::var(key).ok())
    }

    /// Load configuration using a custom env resolver.
    ///
    /// # Errors
    ///
    /// Same as [`LauncherConfig::load`].
    pub fn load_with(paths: &RuntimePaths, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::load_from_file(&paths.config_file())?;
        config.apply_overrides(env);
        config.validate()?;
        Ok(config)
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::debug!(path = %path.display(), "loading launcher config");
                Self::from_toml(&contents)
                    .with_context(|| format!("failed to parse {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config file {}: {e}",
                path.display()
            )),
        }
    }

    /// Parse a TOML string into config.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed TOML or unknown value types.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: LauncherConfig =
            toml::from_str(toml_str).context("failed to parse launcher config TOML")?;
        Ok(config)
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function so tests never touch the process env.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        // An empty ROBOT_TYPE counts as unset and keeps the file value.
        if let Some(v) = env(ENV_ROBOT_TYPE).filter(|v| !v.trim().is_empty()) {
            self.robot.robot_type = Some(v);
        }
        if let Some(v) = env(ENV_ROBOT_NAME).filter(|v| !v.trim().is_empty()) {
            self.robot.name = v;
        }
        if let Some(v) = env(ENV_ROS_LOG_DIR).filter(|v| !v.trim().is_empty()) {
            self.robot.ros_log_dir = PathBuf::from(v);
        }
        if let Some(v) = env(ENV_BUS_GRACE_SECS) {
            match v.parse() {
                Ok(n) => self.bus.grace_secs = n,
                Err(_) => tracing::warn!(
                    var = ENV_BUS_GRACE_SECS,
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
    }

    /// Validate that configuration values are within sane bounds.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.logs.primary_max_bytes > 0,
            "logs.primary_max_bytes must be > 0"
        );
        anyhow::ensure!(
            self.logs.stream_max_bytes > 0,
            "logs.stream_max_bytes must be > 0"
        );
        anyhow::ensure!(
            (1..=99).contains(&self.logs.retention),
            "logs.retention must be in [1, 99]"
        );
        for name in [&self.logs.primary_file, &self.logs.stream_file] {
            anyhow::ensure!(
                !name.is_empty() && !name.contains('/'),
                "log file names must be plain file names"
            );
        }
        anyhow::ensure!(
            self.service.unit_name.ends_with(".service")
                && self.service.unit_name.len() > ".service".len()
                && !self.service.unit_name.contains('/'),
            "service.unit_name must be '<name>.service'"
        );
        anyhow::ensure!(
            !self.service.policy_name.is_empty() && !self.service.policy_name.contains('/'),
            "service.policy_name must be a plain file name"
        );
        anyhow::ensure!(
            !self.bus.start_command.is_empty(),
            "bus.start_command must not be empty"
        );
        anyhow::ensure!(
            !self.control.entry_point.as_os_str().is_empty(),
            "control.entry_point must not be empty"
        );
        Ok(())
    }
}

// ── Robot config ────────────────────────────────────────────────

/// Robot identity (`[robot]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    /// Robot-type tag; `None` resolves to the default variant.
    pub robot_type: Option<String>,
    /// Instance name exported as `ROBOT_NAME`.
    pub name: String,
    /// External middleware log directory exported as `ROS_LOG_DIR`.
    pub ros_log_dir: PathBuf,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            robot_type: None,
            name: "zj_humanoid".to_owned(),
            ros_log_dir: PathBuf::from("/tmp/zj_humanoid/ros_logs"),
        }
    }
}

// ── Logs config ─────────────────────────────────────────────────

/// Log sinks (`[logs]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    /// Supervisor log file name under `logs/`.
    pub primary_file: String,
    /// Control process output file name under `logs/`.
    pub stream_file: String,
    /// Rotation threshold for the primary sink.
    pub primary_max_bytes: u64,
    /// Rotation threshold for the streaming sink.
    pub stream_max_bytes: u64,
    /// Rotated generations kept per sink.
    pub retention: u32,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            primary_file: "robot_launcher.log".to_owned(),
            stream_file: "robot_control.log".to_owned(),
            primary_max_bytes: 10_485_760,
            stream_max_bytes: 104_857_600,
            retention: 5,
        }
    }
}

// ── Bus config ──────────────────────────────────────────────────

/// Coordination service handling (`[bus]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Fixed wait after firing the start command.
    pub grace_secs: u64,
    /// TCP connect timeout for the reachability probe.
    pub probe_timeout_ms: u64,
    /// Program and arguments that start the coordination service.
    pub start_command: Vec<String>,
    /// Address probed instead of the profile coordinator (e.g. loopback
    /// when the LAN interface comes up after the supervisor).
    pub probe_uri: Option<String>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            grace_secs: 5,
            probe_timeout_ms: 1000,
            start_command: vec!["roscore".to_owned()],
            probe_uri: None,
        }
    }
}

// ── Control config ──────────────────────────────────────────────

/// Control process invocation (`[control]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Entry point, relative to `startup/` unless absolute.
    pub entry_point: PathBuf,
    /// Arguments passed to the entry point.
    pub args: Vec<String>,
    /// Runtime library directory, relative to the workspace root.
    pub library_dir: PathBuf,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            entry_point: PathBuf::from("startup_manager.py"),
            args: Vec::new(),
            library_dir: PathBuf::from("orin/lib"),
        }
    }
}

impl ControlConfig {
    /// Absolute entry point path.
    pub fn entry_point_path(&self, paths: &RuntimePaths) -> PathBuf {
        paths.startup_dir.join(&self.entry_point)
    }

    /// Absolute runtime library directory.
    pub fn library_path(&self, paths: &RuntimePaths) -> PathBuf {
        paths.root.join(&self.library_dir)
    }
}

// ── Service config ──────────────────────────────────────────────

/// Boot-time service definition (`[service]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Unit name registered with the service manager.
    pub unit_name: String,
    /// Unit template, relative to `startup/` unless absolute.
    pub unit_template: PathBuf,
    /// Supervisor entry point the unit launches, relative to `startup/`.
    pub entry_point: PathBuf,
    /// System unit directory.
    pub unit_dir: PathBuf,
    /// Directory of the external log manager's policy files.
    pub policy_dir: PathBuf,
    /// Policy file name inside `policy_dir`.
    pub policy_name: String,
    /// Account owning the log files; `None` keeps the current owner.
    pub user: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            unit_name: "zj-humanoid.service".to_owned(),
            unit_template: PathBuf::from("zj-humanoid.service"),
            entry_point: PathBuf::from("start_robot.sh"),
            unit_dir: PathBuf::from("/etc/systemd/system"),
            policy_dir: PathBuf::from("/etc/logrotate.d"),
            policy_name: "zj-humanoid".to_owned(),
            user: Some("nav01".to_owned()),
        }
    }
}

// ── Crash config ────────────────────────────────────────────────

/// Crash capture (`[crash]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrashConfig {
    /// Raise the core limit and install the naming pattern.
    pub enabled: bool,
    /// Kernel core naming pattern; relative patterns land in `logs/`.
    pub core_pattern: String,
    /// Kernel knob receiving the pattern.
    pub core_pattern_path: PathBuf,
}

impl Default for CrashConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            core_pattern: "core.%e.%p.%t".to_owned(),
            core_pattern_path: PathBuf::from("/proc/sys/kernel/core_pattern"),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────
