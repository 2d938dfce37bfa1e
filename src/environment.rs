//! Outbound process environment for the control process.
//!
//! The environment is built once from a resolved [`RobotProfile`] and handed
//! to every launch as an immutable value. Nothing here mutates the
//! supervisor's own environment.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{LauncherConfig, RuntimePaths};
use crate::profile::RobotProfile;

/// Local bind address of the control stack.
pub const VAR_ROS_IP: &str = "ROS_IP";

/// Coordination service address.
pub const VAR_ROS_MASTER_URI: &str = "ROS_MASTER_URI";

/// Variant configuration document.
pub const VAR_ROBOT_CONFIG_PATH: &str = "ROBOT_CONFIG_PATH";

/// Dynamic library search path.
pub const VAR_LD_LIBRARY_PATH: &str = "LD_LIBRARY_PATH";

/// Variables that make the interpreter and middleware flush output per line.
const UNBUFFERED_HINTS: [(&str, &str); 2] = [
    ("PYTHONUNBUFFERED", "1"),
    ("ROSCONSOLE_STDOUT_LINE_BUFFERED", "1"),
];

/// Immutable set of variables exported to launched processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LaunchEnvironment {
    vars: BTreeMap<String, String>,
}

impl LaunchEnvironment {
    /// Build the environment for a profile.
    ///
    /// `inherited_library_path` is the caller's current `LD_LIBRARY_PATH`;
    /// the runtime library directory is prepended to it.
    pub fn build(
        profile: &RobotProfile,
        config: &LauncherConfig,
        paths: &RuntimePaths,
        inherited_library_path: Option<&str>,
    ) -> Self {
        let mut vars = BTreeMap::new();

        vars.insert(
            crate::config::ENV_ROBOT_TYPE.to_owned(),
            profile.type_tag.to_string(),
        );
        vars.insert(
            crate::config::ENV_ROBOT_NAME.to_owned(),
            config.robot.name.clone(),
        );
        vars.insert(
            crate::config::ENV_ROS_LOG_DIR.to_owned(),
            config.robot.ros_log_dir.display().to_string(),
        );
        vars.insert(VAR_ROS_IP.to_owned(), profile.network_endpoint.clone());
        vars.insert(
            VAR_ROS_MASTER_URI.to_owned(),
            profile.coordinator_uri.clone(),
        );
        vars.insert(
            VAR_ROBOT_CONFIG_PATH.to_owned(),
            profile.config_file_path.display().to_string(),
        );

        let runtime_libs = config.control.library_path(paths).display().to_string();
        let library_path = match inherited_library_path.filter(|p| !p.is_empty()) {
            Some(existing) if existing.split(':').any(|p| p == runtime_libs) => existing.to_owned(),
            Some(existing) => format!("{runtime_libs}:{existing}"),
            None => runtime_libs,
        };
        vars.insert(VAR_LD_LIBRARY_PATH.to_owned(), library_path);

        for (key, value) in UNBUFFERED_HINTS {
            vars.insert(key.to_owned(), value.to_owned());
        }

        Self { vars }
    }

    /// Look up one exported variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Iterate over all exported variables in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of exported variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no variables are exported.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
