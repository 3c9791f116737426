//! Settings-file backed store for the cloud backup state

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::backup::BackupSettingsStore;
use crate::config::{BudgetPaths, Settings};
use crate::error::BudgetResult;

/// Loads `config.json` once and writes it back atomically on every change
pub struct SettingsStore {
    paths: BudgetPaths,
    settings: Mutex<Settings>,
}

impl SettingsStore {
    pub fn open(paths: BudgetPaths) -> BudgetResult<Self> {
        let settings = Settings::load_or_create(&paths)?;
        Ok(Self {
            paths,
            settings: Mutex::new(settings),
        })
    }

    /// Copy of the current settings
    pub fn snapshot(&self) -> Settings {
        self.lock().clone()
    }

    /// Apply `change` and persist the result
    ///
    /// The in-memory settings only change if the write succeeds.
    pub fn update<F>(&self, change: F) -> BudgetResult<()>
    where
        F: FnOnce(&mut Settings),
    {
        let mut current = self.lock();
        let mut next = current.clone();
        change(&mut next);
        next.save(&self.paths)?;
        *current = next;
        Ok(())
    }

    /// Whether a restore asked the app to re-derive its initial tracking date
    pub fn should_reset_init_date(&self) -> bool {
        self.lock().cloud_backup.should_reset_init_date
    }

    pub fn clear_reset_init_date(&self) -> BudgetResult<()> {
        self.update(|s| s.cloud_backup.should_reset_init_date = false)
    }

    fn lock(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BackupSettingsStore for SettingsStore {
    fn last_backup_date(&self, user_id: &str) -> BudgetResult<Option<DateTime<Utc>>> {
        Ok(self
            .lock()
            .cloud_backup
            .last_backup_dates
            .get(user_id)
            .copied())
    }

    fn set_last_backup_date(&self, user_id: &str, at: DateTime<Utc>) -> BudgetResult<()> {
        self.update(|s| {
            s.cloud_backup
                .last_backup_dates
                .insert(user_id.to_string(), at);
        })
    }

    fn set_force_reinit_flag(&self) -> BudgetResult<()> {
        self.update(|s| s.cloud_backup.should_reset_init_date = true)
    }

    fn is_backup_enabled(&self) -> BudgetResult<bool> {
        Ok(self.lock().cloud_backup.enabled)
    }

    fn set_backup_enabled(&self, enabled: bool) -> BudgetResult<()> {
        self.update(|s| s.cloud_backup.enabled = enabled)
    }
}
