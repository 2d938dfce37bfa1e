//! Service unit state machine.
//!
//! A unit is observed as a [`UnitState`]: whether its definition file is
//! installed, whether it is enabled, masked, running, and whether the
//! rotation policy sits next to it. Install and uninstall are computed as
//! plans, sequences of [`Step`]s chosen purely from the observed state.
//! [`UnitState::apply`] models what each step does, including the service
//! manager's refusal to enable or start a masked unit, so plans can be
//! checked for convergence without touching a host.

use std::fmt;

use serde::Serialize;

/// Commands sent to the service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitCommand {
    /// Re-read unit definitions.
    DaemonReload,
    /// Clear an administrative mask.
    Unmask,
    /// Start at boot.
    Enable,
    /// Do not start at boot.
    Disable,
    /// Start now.
    Start,
    /// Stop and start again.
    Restart,
    /// Stop now.
    Stop,
    /// Forget a recorded failure.
    ResetFailed,
}

impl UnitCommand {
    /// The `systemctl` verb for this command.
    pub fn verb(self) -> &'static str {
        match self {
            Self::DaemonReload => "daemon-reload",
            Self::Unmask => "unmask",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Start => "start",
            Self::Restart => "restart",
            Self::Stop => "stop",
            Self::ResetFailed => "reset-failed",
        }
    }

    /// Whether the command names a unit (`daemon-reload` does not).
    pub fn takes_unit(self) -> bool {
        !matches!(self, Self::DaemonReload)
    }

    /// Whether a failure of this command is reported but not fatal.
    pub fn is_tolerated(self) -> bool {
        matches!(self, Self::Stop | Self::ResetFailed)
    }
}

impl fmt::Display for UnitCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// One step of an install or uninstall plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    /// Write or replace the rotation policy file.
    WritePolicy,
    /// Copy the unit template into the unit directory.
    InstallUnitFile,
    /// Delete the installed unit file.
    RemoveUnitFile,
    /// Delete the rotation policy file.
    RemovePolicy,
    /// Send a command to the service manager.
    Manager(UnitCommand),
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WritePolicy => f.write_str("write rotation policy"),
            Self::InstallUnitFile => f.write_str("install unit file"),
            Self::RemoveUnitFile => f.write_str("remove unit file"),
            Self::RemovePolicy => f.write_str("remove rotation policy"),
            Self::Manager(command) => write!(f, "systemctl {command}"),
        }
    }
}

/// Coarse lifecycle phase, ignoring the mask flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitPhase {
    /// No unit file.
    Uninstalled,
    /// Unit file present, not started at boot.
    Disabled,
    /// Unit file present, started at boot.
    Enabled,
}

/// A step the service manager would reject in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The unit is masked.
    #[error("cannot {0}: unit is masked")]
    Masked(Step),
    /// The unit file is not installed.
    #[error("cannot {0}: unit file is not installed")]
    NotInstalled(Step),
}

/// Observed state of the unit and its rotation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct UnitState {
    /// The unit definition file exists in the unit directory.
    pub file_present: bool,
    /// The unit starts at boot.
    pub enabled: bool,
    /// The unit is administratively blocked.
    pub masked: bool,
    /// The unit is running.
    pub active: bool,
    /// The rotation policy file exists.
    pub policy_present: bool,
}

impl UnitState {
    /// Nothing installed.
    pub const UNINSTALLED: UnitState = UnitState {
        file_present: false,
        enabled: false,
        masked: false,
        active: false,
        policy_present: false,
    };

    /// Fixed point of a successful install.
    pub const INSTALLED: UnitState = UnitState {
        file_present: true,
        enabled: true,
        masked: false,
        active: true,
        policy_present: true,
    };

    /// Lifecycle phase.
    pub fn phase(&self) -> UnitPhase {
        match (self.file_present, self.enabled) {
            (false, _) => UnitPhase::Uninstalled,
            (true, false) => UnitPhase::Disabled,
            (true, true) => UnitPhase::Enabled,
        }
    }

    /// Every combination of flags, for exhaustive checks.
    pub fn all() -> impl Iterator<Item = UnitState> {
        (0u8..32).map(|bits| UnitState {
            file_present: bits & 1 != 0,
            enabled: bits & 2 != 0,
            masked: bits & 4 != 0,
            active: bits & 8 != 0,
            policy_present: bits & 16 != 0,
        })
    }

    /// State after `step`, or the reason the manager would refuse it.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when enabling, starting or disabling a
    /// masked unit, writing a unit file through a mask, or enabling or
    /// starting a unit whose file is missing.
    pub fn apply(self, step: Step) -> Result<UnitState, TransitionError> {
        let mut next = self;
        match step {
            Step::WritePolicy => next.policy_present = true,
            Step::RemovePolicy => next.policy_present = false,
            Step::InstallUnitFile => {
                // The mask is a /dev/null link at the unit path.
                if self.masked {
                    return Err(TransitionError::Masked(step));
                }
                next.file_present = true;
            }
            Step::RemoveUnitFile => next.file_present = false,
            Step::Manager(command) => match command {
                UnitCommand::DaemonReload | UnitCommand::ResetFailed => {}
                UnitCommand::Unmask => next.masked = false,
                UnitCommand::Stop => next.active = false,
                UnitCommand::Enable | UnitCommand::Start | UnitCommand::Restart => {
                    if self.masked {
                        return Err(TransitionError::Masked(step));
                    }
                    if !self.file_present {
                        return Err(TransitionError::NotInstalled(step));
                    }
                    if command == UnitCommand::Enable {
                        next.enabled = true;
                    } else {
                        next.active = true;
                    }
                }
                UnitCommand::Disable => {
                    if self.masked {
                        return Err(TransitionError::Masked(step));
                    }
                    next.enabled = false;
                }
            },
        }
        Ok(next)
    }

    /// State after every step of `plan`.
    ///
    /// # Errors
    ///
    /// Returns the first refused step.
    pub fn apply_all(self, plan: &[Step]) -> Result<UnitState, TransitionError> {
        plan.iter().try_fold(self, |state, step| state.apply(*step))
    }
}

/// Steps that take `state` to [`UnitState::INSTALLED`].
///
/// The policy and unit file are always rewritten so a re-run picks up a
/// changed template. A running unit is restarted, never started twice.
pub fn plan_install(state: &UnitState) -> Vec<Step> {
    let mut plan = vec![Step::WritePolicy];
    if state.masked {
        plan.push(Step::Manager(UnitCommand::Unmask));
    }
    plan.push(Step::InstallUnitFile);
    plan.push(Step::Manager(UnitCommand::DaemonReload));
    if !state.enabled {
        plan.push(Step::Manager(UnitCommand::Enable));
    }
    plan.push(Step::Manager(if state.active {
        UnitCommand::Restart
    } else {
        UnitCommand::Start
    }));
    plan
}

/// Steps that take `state` to [`UnitState::UNINSTALLED`].
///
/// Filesystem steps are only planned for artifacts that exist, so a unit
/// that was never installed sees no file changes.
pub fn plan_uninstall(state: &UnitState) -> Vec<Step> {
    let mut plan = Vec::new();
    if state.active {
        plan.push(Step::Manager(UnitCommand::Stop));
    }
    if state.masked {
        plan.push(Step::Manager(UnitCommand::Unmask));
    }
    if state.enabled {
        plan.push(Step::Manager(UnitCommand::Disable));
    }
    if state.file_present {
        plan.push(Step::RemoveUnitFile);
    }
    plan.push(Step::Manager(UnitCommand::DaemonReload));
    plan.push(Step::Manager(UnitCommand::ResetFailed));
    if state.policy_present {
        plan.push(Step::RemovePolicy);
    }
    plan
}
