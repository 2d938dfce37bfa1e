//! Error taxonomy for provisioning and supervision.
//!
//! Fatal categories abort the current operation and map to a fixed process
//! exit code. Operational failures (I/O, spawn errors) travel as
//! [`anyhow::Error`] and are downcast to [`LaunchError`] at the binary edge.

use std::path::PathBuf;

/// Exit code for generic failures, privilege failures, and usage errors.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for an unknown robot-type tag.
pub const EXIT_UNKNOWN_ROBOT_TYPE: i32 = 2;

/// Exit code when the coordination service cannot be established.
pub const EXIT_DEPENDENCY_UNAVAILABLE: i32 = 3;

/// Exit code for a missing entry point, unit template, or interpreter.
pub const EXIT_MISSING_ARTIFACT: i32 = 4;

/// Fatal, categorized errors raised by the launcher and installer.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// The robot-type tag is not one of the supported variants.
    #[error("unknown robot type '{value}', supported types: {supported}")]
    Resolution {
        /// The rejected tag value.
        value: String,
        /// Comma-separated list of supported tags.
        supported: String,
    },

    /// A required file (entry point, unit template, interpreter) is absent.
    #[error("missing {what}: {}", .path.display())]
    MissingArtifact {
        /// Human-readable artifact name.
        what: &'static str,
        /// Path that was checked.
        path: PathBuf,
    },

    /// An administrative operation was attempted without elevation.
    #[error("{operation} requires root privileges (effective uid {euid})")]
    Privilege {
        /// The operation that was refused.
        operation: &'static str,
        /// Effective uid of the caller.
        euid: u32,
    },

    /// The coordination service is unreachable after the grace period.
    #[error("coordination service at {uri} unavailable: {reason}")]
    DependencyUnavailable {
        /// Coordinator URI that was probed.
        uri: String,
        /// Why the dependency could not be established.
        reason: String,
    },
}

impl LaunchError {
    /// Process exit code for this category.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Resolution { .. } => EXIT_UNKNOWN_ROBOT_TYPE,
            Self::MissingArtifact { .. } => EXIT_MISSING_ARTIFACT,
            Self::Privilege { .. } => EXIT_FAILURE,
            Self::DependencyUnavailable { .. } => EXIT_DEPENDENCY_UNAVAILABLE,
        }
    }

    /// Short category label used in log fields.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Resolution { .. } => "ResolutionError",
            Self::MissingArtifact { .. } => "MissingArtifact",
            Self::Privilege { .. } => "PrivilegeError",
            Self::DependencyUnavailable { .. } => "DependencyUnavailable",
        }
    }
}

/// Map any error to a process exit code.
///
/// Walks the error chain looking for a [`LaunchError`]; anything else is a
/// generic failure.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<LaunchError>())
        .map_or(EXIT_FAILURE, LaunchError::exit_code)
}

/// Map any error to its category label.
pub fn category_for(err: &anyhow::Error) -> &'static str {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<LaunchError>())
        .map_or("Failure", LaunchError::category)
}
