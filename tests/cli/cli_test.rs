//! CLI contract tests.

use std::fs;

use assert_cmd::Command;
use tempfile::TempDir;

fn humanoid(workspace: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("humanoid").expect("binary should build");
    cmd.env_remove("ROBOT_TYPE")
        .env_remove("RUST_LOG")
        .env_remove("LD_LIBRARY_PATH")
        .env("HUMANOID_WORKSPACE", workspace.path().join("ws"))
        .env("ROS_LOG_DIR", workspace.path().join("ros_logs"));
    cmd
}

#[test]
fn profile_prints_wa1_environment() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let ws = tmp.path().join("ws");

    let output = humanoid(&tmp)
        .args(["profile", "--tag", "WA1"])
        .output()
        .expect("run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ROS_IP=192.168.2.100\n"));
    assert!(stdout.contains("ROS_MASTER_URI=http://192.168.2.100:11311\n"));
    assert!(stdout.contains(&format!(
        "ROBOT_CONFIG_PATH={}\n",
        ws.join("config/wa1_robot.yaml").display()
    )));
    assert!(stdout.contains(&format!("LD_LIBRARY_PATH={}\n", ws.join("orin/lib").display())));
}

#[test]
fn profile_defaults_to_i2() {
    let tmp = tempfile::tempdir().expect("tempdir");

    let output = humanoid(&tmp).args(["profile", "--json"]).output().expect("run");

    assert!(output.status.success());
    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(doc["profile"]["type_tag"], "I2");
    assert_eq!(doc["environment"]["ROS_IP"], "192.168.1.100");
}

#[test]
fn profile_reads_robot_type_from_env() {
    let tmp = tempfile::tempdir().expect("tempdir");

    let output = humanoid(&tmp)
        .env("ROBOT_TYPE", "WA2")
        .arg("profile")
        .output()
        .expect("run");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("ROBOT_TYPE=WA2\n"));
}

#[test]
fn profile_rejects_unknown_tag() {
    let tmp = tempfile::tempdir().expect("tempdir");

    humanoid(&tmp)
        .args(["profile", "--tag", "X9"])
        .assert()
        .code(2);
}

#[test]
fn start_with_unknown_tag_exits_2_and_logs_category() {
    let tmp = tempfile::tempdir().expect("tempdir");

    humanoid(&tmp).env("ROBOT_TYPE", "X9").assert().code(2);

    let log = fs::read_to_string(tmp.path().join("ws/logs/robot_launcher.log")).expect("read log");
    assert!(log.contains("ResolutionError"), "{log}");
    assert!(log.contains("X9"));
    assert!(log.contains("supervisor cleanup"));
}

#[test]
fn bootstrap_without_interpreter_exits_4() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let empty = tmp.path().join("empty-bin");
    fs::create_dir(&empty).expect("mkdir");

    humanoid(&tmp)
        .env("PATH", &empty)
        .arg("bootstrap")
        .assert()
        .code(4);

    assert!(tmp.path().join("ws/startup").is_dir());
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    let tmp = tempfile::tempdir().expect("tempdir");
    humanoid(&tmp).arg("frobnicate").assert().code(1);
}

#[test]
fn help_exits_zero() {
    let tmp = tempfile::tempdir().expect("tempdir");
    humanoid(&tmp).arg("--help").assert().success();
}
