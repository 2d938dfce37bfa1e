//! Humanoid launcher: configuration, log rotation and process supervision
//! for the robot control stack.
//!
//! The `humanoid` binary resolves the robot variant, prepares the log
//! sinks, makes sure the coordination service is up, and then supervises
//! the control process until it exits. Service registration lives in the
//! `humanoid-installer` workspace member.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod profile;
pub mod rotation;

pub mod bootstrap;
pub mod bus;
pub mod crash;
pub mod environment;

pub mod supervisor;
