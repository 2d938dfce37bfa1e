//! Tests for the outbound launch environment.

use humanoid::config::{LauncherConfig, RuntimePaths};
use humanoid::environment::{
    LaunchEnvironment, VAR_LD_LIBRARY_PATH, VAR_ROBOT_CONFIG_PATH, VAR_ROS_IP, VAR_ROS_MASTER_URI,
};
use humanoid::profile::resolve;

fn build(tag: &str, inherited: Option<&str>) -> LaunchEnvironment {
    let paths = RuntimePaths::new("/srv/robot");
    let config = LauncherConfig::default();
    let profile = resolve(Some(tag), &paths.config_dir).expect("resolve");
    LaunchEnvironment::build(&profile, &config, &paths, inherited)
}

#[test]
fn wa1_exports_wheeled_arm_network() {
    let env = build("WA1", None);

    assert_eq!(env.get(VAR_ROS_IP), Some("192.168.2.100"));
    assert_eq!(env.get(VAR_ROS_MASTER_URI), Some("http://192.168.2.100:11311"));
    assert_eq!(
        env.get(VAR_ROBOT_CONFIG_PATH),
        Some("/srv/robot/config/wa1_robot.yaml")
    );
    assert_eq!(env.get("ROBOT_TYPE"), Some("WA1"));
}

#[test]
fn identity_and_unbuffered_hints_are_exported() {
    let env = build("I2", None);

    assert_eq!(env.get("ROBOT_NAME"), Some("zj_humanoid"));
    assert_eq!(env.get("ROS_LOG_DIR"), Some("/tmp/zj_humanoid/ros_logs"));
    assert_eq!(env.get("PYTHONUNBUFFERED"), Some("1"));
    assert_eq!(env.get("ROSCONSOLE_STDOUT_LINE_BUFFERED"), Some("1"));
}

#[test]
fn library_path_is_prepended_once() {
    assert_eq!(
        build("I2", None).get(VAR_LD_LIBRARY_PATH),
        Some("/srv/robot/orin/lib")
    );
    assert_eq!(
        build("I2", Some("")).get(VAR_LD_LIBRARY_PATH),
        Some("/srv/robot/orin/lib")
    );
    assert_eq!(
        build("I2", Some("/opt/ros/lib")).get(VAR_LD_LIBRARY_PATH),
        Some("/srv/robot/orin/lib:/opt/ros/lib")
    );
    assert_eq!(
        build("I2", Some("/opt/ros/lib:/srv/robot/orin/lib")).get(VAR_LD_LIBRARY_PATH),
        Some("/opt/ros/lib:/srv/robot/orin/lib")
    );
}

#[test]
fn iteration_is_sorted_and_complete() {
    let env = build("H1", None);
    let keys: Vec<&str> = env.iter().map(|(k, _)| k).collect();

    let mut sorted = keys.clone();
    sorted.sort_unstable();
    assert_eq!(keys, sorted);
    assert_eq!(env.len(), 9);
    assert!(!env.is_empty());
}

#[test]
fn serializes_as_flat_map() {
    let env = build("I180", None);
    let json = serde_json::to_value(&env).expect("serialize");
    assert_eq!(json[VAR_ROS_IP], "192.168.1.100");
    assert_eq!(json["ROBOT_TYPE"], "I180");
}
