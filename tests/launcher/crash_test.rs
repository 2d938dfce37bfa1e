//! Tests for crash capture settings.

use std::path::Path;

use humanoid::config::CrashConfig;
use humanoid::crash::{core_pattern, enable, CrashCapture};

#[test]
fn relative_pattern_lands_in_logs_dir() {
    assert_eq!(
        core_pattern("core.%e.%p.%t", Path::new("/srv/robot/logs")),
        "/srv/robot/logs/core.%e.%p.%t"
    );
}

#[test]
fn absolute_and_piped_patterns_are_verbatim() {
    let logs = Path::new("/srv/robot/logs");
    assert_eq!(core_pattern("/var/crash/core.%p", logs), "/var/crash/core.%p");
    assert_eq!(
        core_pattern("|/usr/share/apport/apport %p", logs),
        "|/usr/share/apport/apport %p"
    );
}

#[test]
fn disabled_capture_changes_nothing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let knob = tmp.path().join("core_pattern");
    let config = CrashConfig {
        enabled: false,
        core_pattern: "core.%e".to_owned(),
        core_pattern_path: knob.clone(),
    };

    assert_eq!(enable(&config, tmp.path()), CrashCapture::default());
    assert!(!knob.exists());
}

#[test]
fn pattern_is_written_to_knob() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let knob = tmp.path().join("core_pattern");
    std::fs::write(&knob, "core\n").expect("seed knob");
    let config = CrashConfig {
        enabled: true,
        core_pattern: "core.%e.%p.%t".to_owned(),
        core_pattern_path: knob.clone(),
    };

    let capture = enable(&config, tmp.path());

    assert!(capture.pattern_installed);
    let written = std::fs::read_to_string(&knob).expect("read knob");
    assert_eq!(
        written.trim_end(),
        tmp.path().join("core.%e.%p.%t").display().to_string()
    );
}

#[test]
fn unwritable_knob_degrades_without_failing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = CrashConfig {
        enabled: true,
        core_pattern: "core.%e".to_owned(),
        core_pattern_path: tmp.path().join("missing/dir/core_pattern"),
    };

    let capture = enable(&config, tmp.path());

    assert!(!capture.pattern_installed);
}
