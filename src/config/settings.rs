//! User settings for Family Budget
//!
//! Manages user preferences including the cloud backup state (activation,
//! last successful backup, signed-in account) and remote storage tuning.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::paths::BudgetPaths;
use crate::backup::Identity;
use crate::error::BudgetError;
use crate::storage::file_io::{read_json, write_json_atomic};

/// Cloud backup state persisted between runs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudBackupSettings {
    /// Whether the recurring backup is activated
    #[serde(default)]
    pub enabled: bool,

    /// Time of the last successful upload, per account id
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub last_backup_dates: BTreeMap<String, DateTime<Utc>>,

    /// Set after a restore so the app re-derives its initial tracking date
    #[serde(default)]
    pub should_reset_init_date: bool,

    /// Signed-in account used by the local auth provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<Identity>,

    /// Premium status used by the local entitlement check
    #[serde(default)]
    pub premium: bool,
}

/// Timeout and retry limits for each remote storage request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Ceiling for a single remote call
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// Extra attempts after the first one
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, doubled on each further attempt
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_attempt_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: default_attempt_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl RemoteSettings {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// User settings for Family Budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Cloud backup state
    #[serde(default)]
    pub cloud_backup: CloudBackupSettings,

    /// Remote storage tuning
    #[serde(default)]
    pub remote: RemoteSettings,
}

fn default_schema_version() -> u32 {
    1
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            cloud_backup: CloudBackupSettings::default(),
            remote: RemoteSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or create default settings if file doesn't exist
    pub fn load_or_create(paths: &BudgetPaths) -> Result<Self, BudgetError> {
        read_json(paths.settings_file())
            .map_err(|e| BudgetError::Config(format!("Failed to load settings: {}", e)))
    }

    /// Save settings to disk
    pub fn save(&self, paths: &BudgetPaths) -> Result<(), BudgetError> {
        paths.ensure_directories()?;
        write_json_atomic(paths.settings_file(), self)
    }
}
