//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the backup services.

pub mod cloud;

pub use cloud::{handle_cloud_command, CloudCommands, Toggle};
