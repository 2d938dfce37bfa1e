//! Humanoid installer CLI entry point.
//!
//! Provides `install` (the default), `uninstall` and `status` for the
//! launcher's systemd unit.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use humanoid::config::{LauncherConfig, RuntimePaths};
use humanoid::error::{category_for, exit_code_for, EXIT_FAILURE};
use humanoid::logging;
use humanoid_installer::services::ServiceInstaller;
use humanoid_installer::systemctl::Systemctl;

/// Humanoid installer: manages the launcher's boot-time service.
#[derive(Parser)]
#[command(name = "humanoid-installer", version, about)]
struct Cli {
    /// Subcommand to execute (defaults to `install`).
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Install, enable and start the service.
    Install,
    /// Stop, disable and remove the service.
    Uninstall,
    /// Print the observed service state as JSON.
    Status,
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

    logging::init_cli();
    match run(cli.command.unwrap_or(Command::Install)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            error!(category = category_for(&e), exit_code = code, "{e:#}");
            exit_code(code)
        }
    }
}

/// Convert an `i32` status into a process exit code.
fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

async fn run(command: Command) -> anyhow::Result<()> {
    let paths = RuntimePaths::from_env();
    let config = LauncherConfig::load(&paths)?;
    let installer = ServiceInstaller::new(paths, config, Systemctl);

    match command {
        Command::Install => {
            let report = installer.install().await?;
            info!(steps = report.steps.len(), after = ?report.after, "service installed");
        }
        Command::Uninstall => {
            let report = installer.uninstall().await?;
            info!(steps = report.steps.len(), after = ?report.after, "service uninstalled");
        }
        Command::Status => {
            let state = installer.status().await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
    }
    Ok(())
}
