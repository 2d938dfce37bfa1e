//! Tests for error categories and exit codes.

use std::path::PathBuf;

use anyhow::Context;
use humanoid::error::{
    category_for, exit_code_for, LaunchError, EXIT_DEPENDENCY_UNAVAILABLE, EXIT_FAILURE,
    EXIT_MISSING_ARTIFACT, EXIT_UNKNOWN_ROBOT_TYPE,
};

#[test]
fn each_category_has_a_documented_exit_code() {
    let cases = [
        (
            LaunchError::Resolution {
                value: "X9".to_owned(),
                supported: "WA1".to_owned(),
            },
            EXIT_UNKNOWN_ROBOT_TYPE,
            "ResolutionError",
        ),
        (
            LaunchError::MissingArtifact {
                what: "control entry point",
                path: PathBuf::from("/x"),
            },
            EXIT_MISSING_ARTIFACT,
            "MissingArtifact",
        ),
        (
            LaunchError::Privilege {
                operation: "install",
                euid: 1000,
            },
            EXIT_FAILURE,
            "PrivilegeError",
        ),
        (
            LaunchError::DependencyUnavailable {
                uri: "http://h:1".to_owned(),
                reason: "down".to_owned(),
            },
            EXIT_DEPENDENCY_UNAVAILABLE,
            "DependencyUnavailable",
        ),
    ];

    for (err, code, category) in cases {
        assert_eq!(err.exit_code(), code);
        assert_eq!(err.category(), category);
    }
}

#[test]
fn exit_code_is_found_through_context() {
    let err = Err::<(), _>(LaunchError::MissingArtifact {
        what: "unit template",
        path: PathBuf::from("/srv/robot/startup/zj-humanoid.service"),
    })
    .context("install failed")
    .expect_err("error");

    assert_eq!(exit_code_for(&err), EXIT_MISSING_ARTIFACT);
    assert_eq!(category_for(&err), "MissingArtifact");
}

#[test]
fn plain_errors_are_generic_failures() {
    let err = anyhow::anyhow!("disk on fire");
    assert_eq!(exit_code_for(&err), EXIT_FAILURE);
    assert_eq!(category_for(&err), "Failure");
}

#[test]
fn messages_name_the_offending_value() {
    let err = LaunchError::Resolution {
        value: "X9".to_owned(),
        supported: "WA1, WA2, H1, I2, I180".to_owned(),
    };
    let message = err.to_string();
    assert!(message.contains("X9"));
    assert!(message.contains("I180"));

    let missing = LaunchError::MissingArtifact {
        what: "control entry point",
        path: PathBuf::from("/srv/robot/startup/startup_manager.py"),
    };
    assert_eq!(
        missing.to_string(),
        "missing control entry point: /srv/robot/startup/startup_manager.py"
    );
}
