//! Robot-type to deployment-profile resolution.
//!
//! The five supported tags collapse onto two network topologies and four
//! configuration documents. Both mappings are data tables; adding a tag is
//! a table edit, not a new branch.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::error::LaunchError;

/// Tag substituted when no robot type is provided.
pub const DEFAULT_ROBOT_TYPE: RobotType = RobotType::I2;

/// Supported deployment variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RobotType {
    /// Wheeled-arm variant 1.
    WA1,
    /// Wheeled-arm variant 2.
    WA2,
    /// Humanoid upper body, H1 chassis.
    H1,
    /// Humanoid upper body, I2 chassis.
    I2,
    /// Full humanoid, I180.
    I180,
}

impl RobotType {
    /// Every supported tag, in declaration order.
    pub const ALL: [RobotType; 5] = [
        RobotType::WA1,
        RobotType::WA2,
        RobotType::H1,
        RobotType::I2,
        RobotType::I180,
    ];

    /// Canonical tag string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WA1 => "WA1",
            Self::WA2 => "WA2",
            Self::H1 => "H1",
            Self::I2 => "I2",
            Self::I180 => "I180",
        }
    }

    /// Comma-separated list of supported tags for error messages.
    pub fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for RobotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RobotType {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| LaunchError::Resolution {
                value: s.to_owned(),
                supported: Self::supported_list(),
            })
    }
}

/// A physical network layout shared by several robot types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Topology {
    endpoint: &'static str,
    coordinator: &'static str,
}

/// Wheeled-arm network (WA1, WA2).
const WHEELED_ARM_NET: Topology = Topology {
    endpoint: "192.168.2.100",
    coordinator: "http://192.168.2.100:11311",
};

/// Humanoid network (H1, I2, I180).
const HUMANOID_NET: Topology = Topology {
    endpoint: "192.168.1.100",
    coordinator: "http://192.168.1.100:11311",
};

/// Per-tag row: network topology and configuration document name.
///
/// Rows are looked up by tag; their order carries no meaning.
const PROFILE_TABLE: [(RobotType, Topology, &str); 5] = [
    (RobotType::WA1, WHEELED_ARM_NET, "wa1_robot.yaml"),
    (RobotType::WA2, WHEELED_ARM_NET, "wa2_robot.yaml"),
    (RobotType::H1, HUMANOID_NET, "upper_body_robot.yaml"),
    (RobotType::I2, HUMANOID_NET, "upper_body_robot.yaml"),
    (RobotType::I180, HUMANOID_NET, "i180_robot.yaml"),
];

/// Fully resolved deployment profile for one robot type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RobotProfile {
    /// The resolved robot type.
    pub type_tag: RobotType,
    /// Local bind address (`ROS_IP`).
    pub network_endpoint: String,
    /// Coordination service address (`ROS_MASTER_URI`).
    pub coordinator_uri: String,
    /// Variant-specific configuration document.
    pub config_file_path: PathBuf,
}

impl RobotProfile {
    /// Build the profile for a robot type from its table row.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Resolution`] if the type has no row.
    pub fn for_type(robot_type: RobotType, config_dir: &Path) -> Result<Self, LaunchError> {
        let (_, topology, document) = PROFILE_TABLE
            .iter()
            .find(|(tag, ..)| *tag == robot_type)
            .ok_or_else(|| LaunchError::Resolution {
                value: robot_type.as_str().to_owned(),
                supported: RobotType::supported_list(),
            })?;

        Ok(Self {
            type_tag: robot_type,
            network_endpoint: topology.endpoint.to_owned(),
            coordinator_uri: topology.coordinator.to_owned(),
            config_file_path: config_dir.join(document),
        })
    }
}

/// Resolve a robot-type tag into a [`RobotProfile`].
///
/// An absent, empty, or whitespace-only tag resolves to [`DEFAULT_ROBOT_TYPE`].
/// Any other value must match a supported tag exactly.
///
/// # Errors
///
/// Returns [`LaunchError::Resolution`] naming the rejected value and the
/// supported set when the tag is not recognised.
pub fn resolve(type_tag: Option<&str>, config_dir: &Path) -> Result<RobotProfile, LaunchError> {
    let robot_type = match type_tag.map(str::trim) {
        None | Some("") => DEFAULT_ROBOT_TYPE,
        Some(tag) => tag.parse()?,
    };
    RobotProfile::for_type(robot_type, config_dir)
}
