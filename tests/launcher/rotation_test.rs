//! Tests for startup log rotation and the rotation policy.

use std::fs;
use std::path::Path;

use humanoid::rotation::{prepare_sink, LogFile, RotationPolicy, SinkOutcome};

fn write(path: &Path, contents: &str) {
    fs::write(path, contents).expect("write file");
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).expect("read file")
}

#[test]
fn missing_sink_is_created_with_its_directory() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let log = LogFile::new(tmp.path().join("logs/robot_launcher.log"), 10, 5);

    let outcome = prepare_sink(&log).expect("prepare");

    assert_eq!(outcome, SinkOutcome::Created);
    assert!(log.active_path.is_file());
    assert_eq!(fs::metadata(&log.active_path).expect("stat").len(), 0);
}

#[test]
fn sink_below_threshold_is_untouched() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let log = LogFile::new(tmp.path().join("a.log"), 100, 5);
    write(&log.active_path, "short");

    let outcome = prepare_sink(&log).expect("prepare");

    assert_eq!(outcome, SinkOutcome::Kept);
    assert_eq!(read(&log.active_path), "short");
    assert!(!log.generation_path(1).exists());
}

#[test]
fn sink_at_threshold_becomes_generation_one() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let log = LogFile::new(tmp.path().join("a.log"), 4, 5);
    write(&log.active_path, "full");

    let outcome = prepare_sink(&log).expect("prepare");

    assert_eq!(outcome, SinkOutcome::Rotated { discarded: 0 });
    assert_eq!(read(&log.generation_path(1)), "full");
    assert_eq!(read(&log.active_path), "");
}

#[test]
fn generations_shift_and_oldest_is_discarded() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let log = LogFile::new(tmp.path().join("a.log"), 1, 3);
    write(&log.active_path, "current");
    write(&log.generation_path(1), "gen1");
    write(&log.generation_path(2), "gen2");
    write(&log.generation_path(3), "gen3");

    let outcome = prepare_sink(&log).expect("prepare");

    assert_eq!(outcome, SinkOutcome::Rotated { discarded: 1 });
    assert_eq!(read(&log.generation_path(1)), "current");
    assert_eq!(read(&log.generation_path(2)), "gen1");
    assert_eq!(read(&log.generation_path(3)), "gen2");
    assert!(!log.generation_path(4).exists());
    assert_eq!(log.generations().expect("list").len(), 3);
}

#[test]
fn compressed_generations_keep_their_suffix() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let log = LogFile::new(tmp.path().join("a.log"), 1, 5);
    write(&log.active_path, "current");
    write(&log.generation_path(1), "gen1");
    write(&tmp.path().join("a.log.2.gz"), "gen2");

    prepare_sink(&log).expect("prepare");

    assert_eq!(read(&log.generation_path(2)), "gen1");
    assert_eq!(read(&tmp.path().join("a.log.3.gz")), "gen2");
    assert!(!tmp.path().join("a.log.2.gz").exists());
}

#[test]
fn retention_is_enforced_even_with_stray_generations() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let log = LogFile::new(tmp.path().join("a.log"), 1, 2);
    write(&log.active_path, "current");
    for index in 1..=6 {
        write(&log.generation_path(index), &format!("gen{index}"));
    }

    let outcome = prepare_sink(&log).expect("prepare");

    assert_eq!(outcome, SinkOutcome::Rotated { discarded: 5 });
    let mut indices: Vec<u32> = log
        .generations()
        .expect("list")
        .into_iter()
        .map(|(i, _)| i)
        .collect();
    indices.sort_unstable();
    assert_eq!(indices, vec![1, 2]);
    assert_eq!(read(&log.generation_path(2)), "gen1");
}

#[test]
fn unrelated_files_are_ignored() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let log = LogFile::new(tmp.path().join("a.log"), 1, 5);
    write(&log.active_path, "current");
    write(&tmp.path().join("a.log.old"), "keep");
    write(&tmp.path().join("b.log.1"), "other sink");

    prepare_sink(&log).expect("prepare");

    assert_eq!(read(&tmp.path().join("a.log.old")), "keep");
    assert_eq!(read(&tmp.path().join("b.log.1")), "other sink");
}

#[test]
fn policy_renders_logrotate_directives() {
    let policy = RotationPolicy::for_logs_dir(
        Path::new("/home/nav01/zj_humanoid/logs"),
        10_485_760,
        5,
        Some("nav01".to_owned()),
    );
    let rendered = policy.render();

    assert!(rendered.starts_with("/home/nav01/zj_humanoid/logs/*.log {\n"));
    for directive in [
        "size 10M",
        "rotate 5",
        "compress",
        "delaycompress",
        "notifempty",
        "missingok",
        "copytruncate",
        "su nav01 nav01",
    ] {
        assert!(rendered.contains(directive), "missing {directive}");
    }
    assert!(rendered.ends_with("}\n"));
}

#[test]
fn policy_size_falls_back_to_bytes() {
    let policy = RotationPolicy::for_logs_dir(Path::new("/l"), 1000, 2, None);
    let rendered = policy.render();
    assert!(rendered.contains("size 1000\n"));
    assert!(!rendered.contains(" su "));
}
