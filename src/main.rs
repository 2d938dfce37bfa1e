//! Humanoid CLI entry point.
//!
//! `start` (the default) supervises the control process, `bootstrap`
//! prepares a fresh workspace, and `profile` prints what a robot-type tag
//! resolves to.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use humanoid::config::{LauncherConfig, RuntimePaths};
use humanoid::error::{category_for, exit_code_for, EXIT_FAILURE};
use humanoid::supervisor::{CleanupGuard, Supervisor, TerminationSignals};
use humanoid::{bootstrap, logging, profile};

/// Humanoid launcher: supervises the robot control stack.
#[derive(Parser)]
#[command(name = "humanoid", version, about)]
struct Cli {
    /// Subcommand to execute (defaults to `start`).
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Launch and supervise the control process.
    Start,
    /// Create the workspace layout and check prerequisites.
    Bootstrap,
    /// Print the deployment profile for a robot type.
    Profile {
        /// Robot-type tag; defaults to `ROBOT_TYPE` or the built-in default.
        #[arg(long)]
        tag: Option<String>,
        /// Emit JSON instead of `KEY=value` lines.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { EXIT_FAILURE } else { 0 };
            let _ = e.print();
            return exit_code(code);
        }
    };

    let code = match cli.command.unwrap_or(Command::Start) {
        Command::Start => handle_start().await,
        Command::Bootstrap => handle_bootstrap(),
        Command::Profile { tag, json } => handle_profile(tag, json),
    };
    exit_code(code)
}

/// Convert an `i32` status into a process exit code.
fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

/// Report a fatal error on the console logger and return its exit code.
fn report(err: &anyhow::Error) -> i32 {
    let code = exit_code_for(err);
    error!(category = category_for(err), exit_code = code, "{err:#}");
    code
}

/// Supervise the control process until it exits.
async fn handle_start() -> i32 {
    let paths = RuntimePaths::from_env();
    let config = match LauncherConfig::load(&paths) {
        Ok(config) => config,
        Err(e) => {
            logging::init_cli();
            return report(&e);
        }
    };
    let supervisor = Supervisor::new(paths, config);

    if let Err(e) = supervisor.prepare_sinks() {
        logging::init_cli();
        return report(&e);
    }
    let _logging_guard = match logging::init_production(&supervisor.primary_sink().active_path) {
        Ok(guard) => guard,
        Err(e) => {
            logging::init_cli();
            return report(&e);
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        workspace = %supervisor.paths().root.display(),
        "humanoid launcher starting"
    );

    // Declared after the logging guard so its report is flushed.
    let guard = CleanupGuard::new();
    let mut signals = match TerminationSignals::register() {
        Ok(signals) => signals,
        Err(e) => {
            let code = report(&e);
            guard.record_fatal(category_for(&e), code);
            return code;
        }
    };

    let code = supervisor.run_until_signal(&guard, &mut signals).await;
    guard.finish();
    code
}

/// Create the workspace layout and verify prerequisites.
fn handle_bootstrap() -> i32 {
    logging::init_cli();
    let paths = RuntimePaths::from_env();

    match bootstrap::run(&paths, None) {
        Ok(report) => {
            info!(
                workspace = %paths.root.display(),
                created = report.created_dirs.len(),
                made_executable = report.made_executable.len(),
                "workspace ready"
            );
            0
        }
        Err(e) => report(&e),
    }
}

/// Print the resolved profile and the environment it exports.
fn handle_profile(tag: Option<String>, json: bool) -> i32 {
    logging::init_cli();
    let paths = RuntimePaths::from_env();
    let config = match LauncherConfig::load(&paths) {
        Ok(config) => config,
        Err(e) => return report(&e),
    };

    let tag = tag.or_else(|| config.robot.robot_type.clone());
    let resolved = match profile::resolve(tag.as_deref(), &paths.config_dir) {
        Ok(resolved) => resolved,
        Err(e) => return report(&e.into()),
    };
    let inherited = std::env::var(humanoid::environment::VAR_LD_LIBRARY_PATH).ok();
    let environment = humanoid::environment::LaunchEnvironment::build(
        &resolved,
        &config,
        &paths,
        inherited.as_deref(),
    );

    if json {
        let doc = serde_json::json!({
            "profile": resolved,
            "environment": environment,
        });
        match serde_json::to_string_pretty(&doc) {
            Ok(text) => println!("{text}"),
            Err(e) => return report(&e.into()),
        }
    } else {
        for (key, value) in environment.iter() {
            println!("{key}={value}");
        }
    }
    0
}
