//! Tests for robot-type resolution.

use std::path::{Path, PathBuf};

use humanoid::error::LaunchError;
use humanoid::profile::{resolve, RobotProfile, RobotType, DEFAULT_ROBOT_TYPE};

fn config_dir() -> PathBuf {
    PathBuf::from("/srv/robot/config")
}

#[test]
fn every_tag_resolves_to_its_declared_profile() {
    let expected = [
        ("WA1", "192.168.2.100", "http://192.168.2.100:11311", "wa1_robot.yaml"),
        ("WA2", "192.168.2.100", "http://192.168.2.100:11311", "wa2_robot.yaml"),
        ("H1", "192.168.1.100", "http://192.168.1.100:11311", "upper_body_robot.yaml"),
        ("I2", "192.168.1.100", "http://192.168.1.100:11311", "upper_body_robot.yaml"),
        ("I180", "192.168.1.100", "http://192.168.1.100:11311", "i180_robot.yaml"),
    ];

    for (tag, endpoint, coordinator, document) in expected {
        let profile = resolve(Some(tag), &config_dir()).expect("supported tag");
        assert_eq!(profile.type_tag.as_str(), tag);
        assert_eq!(profile.network_endpoint, endpoint, "{tag}");
        assert_eq!(profile.coordinator_uri, coordinator, "{tag}");
        assert_eq!(profile.config_file_path, config_dir().join(document), "{tag}");
    }
}

#[test]
fn table_rows_match_their_variant() {
    for robot_type in RobotType::ALL {
        let profile = RobotProfile::for_type(robot_type, Path::new("/c")).expect("row");
        assert_eq!(profile.type_tag, robot_type);
        let resolved = resolve(Some(robot_type.as_str()), Path::new("/c")).expect("resolve");
        assert_eq!(profile, resolved);
    }
}

#[test]
fn absent_or_blank_tag_equals_default() {
    let default = resolve(Some("I2"), &config_dir()).expect("I2");
    assert_eq!(DEFAULT_ROBOT_TYPE, RobotType::I2);
    assert_eq!(resolve(None, &config_dir()).expect("unset"), default);
    assert_eq!(resolve(Some(""), &config_dir()).expect("empty"), default);
    assert_eq!(resolve(Some("  "), &config_dir()).expect("blank"), default);
}

#[test]
fn unknown_tag_is_rejected_with_supported_set() {
    for bad in ["X9", "wa1", "I 2", "I2X"] {
        let err = resolve(Some(bad), &config_dir()).expect_err("must reject");
        match err {
            LaunchError::Resolution { value, supported } => {
                assert_eq!(value, bad);
                assert_eq!(supported, "WA1, WA2, H1, I2, I180");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

#[test]
fn surrounding_whitespace_is_trimmed() {
    let profile = resolve(Some(" WA2\n"), &config_dir()).expect("trimmed");
    assert_eq!(profile.type_tag, RobotType::WA2);
}

#[test]
fn shared_documents_follow_topology_split() {
    let h1 = resolve(Some("H1"), &config_dir()).expect("H1");
    let i2 = resolve(Some("I2"), &config_dir()).expect("I2");
    let i180 = resolve(Some("I180"), &config_dir()).expect("I180");
    assert_eq!(h1.config_file_path, i2.config_file_path);
    assert_ne!(i2.config_file_path, i180.config_file_path);
    assert_eq!(i2.coordinator_uri, i180.coordinator_uri);
}

#[test]
fn profile_serializes_type_tag_as_string() {
    let profile = resolve(Some("WA1"), &config_dir()).expect("WA1");
    let json = serde_json::to_value(&profile).expect("serialize");
    assert_eq!(json["type_tag"], "WA1");
    assert_eq!(json["network_endpoint"], "192.168.2.100");
}
