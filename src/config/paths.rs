//! Path management for Family Budget
//!
//! Provides platform-appropriate path resolution for configuration, the
//! datastore, scratch space and the local object store.
//!
//! ## Path Resolution Order
//!
//! 1. `FAMILY_BUDGET_DATA_DIR` environment variable (if set)
//! 2. The platform config directory from `directories::ProjectDirs`

use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::BudgetError;

/// File name of the datastore inside the data directory
pub const DATABASE_FILENAME: &str = "budget.db";

/// Manages all paths used by Family Budget
#[derive(Debug, Clone)]
pub struct BudgetPaths {
    /// Base directory for all Family Budget data
    base_dir: PathBuf,
}

impl BudgetPaths {
    /// Create a new BudgetPaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn new() -> Result<Self, BudgetError> {
        let base_dir = if let Ok(custom) = std::env::var("FAMILY_BUDGET_DATA_DIR") {
            PathBuf::from(custom)
        } else {
            resolve_default_path()?
        };

        Ok(Self { base_dir })
    }

    /// Create BudgetPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the data directory holding the datastore
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    /// Get the datastore file
    pub fn database_file(&self) -> PathBuf {
        self.data_dir().join(DATABASE_FILENAME)
    }

    /// Process-private root for scratch files
    pub fn cache_dir(&self) -> PathBuf {
        self.base_dir.join("cache")
    }

    /// Root of the directory-backed object store
    pub fn remote_dir(&self) -> PathBuf {
        self.base_dir.join("remote")
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the path to the audit log
    pub fn audit_log(&self) -> PathBuf {
        self.base_dir.join("audit.log")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<(), BudgetError> {
        for dir in [
            self.base_dir.clone(),
            self.data_dir(),
            self.cache_dir(),
            self.remote_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                BudgetError::Io(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }

        Ok(())
    }

    /// Check if Family Budget has been initialized (config file exists)
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }
}

fn resolve_default_path() -> Result<PathBuf, BudgetError> {
    ProjectDirs::from("com", "usehover", "family-budget")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| BudgetError::Config("Could not determine home directory".into()))
}
