//! Humanoid installer: registers the launcher as a boot-time systemd
//! service and removes it again.
//!
//! Installation is modelled as a small state machine ([`unit`]) whose plans
//! are executed by [`services::ServiceInstaller`] against a
//! [`systemctl::ServiceManager`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod services;
pub mod systemctl;
pub mod unit;
