//! Configuration module for Family Budget
//!
//! This module provides configuration management including:
//! - Platform path resolution
//! - User settings persistence (cloud backup state, remote storage tuning)

pub mod paths;
pub mod settings;

pub use paths::BudgetPaths;
pub use settings::{CloudBackupSettings, RemoteSettings, Settings};
