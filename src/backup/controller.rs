//! Cloud backup settings actions
//!
//! Wraps the transfer service and the scheduler behind the actions a settings
//! screen offers, and reports outcomes the user must see as `BackupEvent`s.

use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use super::collaborators::{AuthProvider, BackupSettingsStore, RemoteBackupDescriptor};
use super::operation::OperationKind;
use super::scheduler::BackupScheduler;
use super::transfer::{BackupReport, BackupTransferService, RestoreReport};
use crate::error::{BudgetError, BudgetResult};

const EVENT_CAPACITY: usize = 16;

/// Failure of a manual action, shown as an error dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserFacingError {
    BackupFailed(String),
    RestoreFailed(String),
    DeleteFailed(String),
}

impl fmt::Display for UserFacingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackupFailed(reason) => write!(f, "Backup failed: {}", reason),
            Self::RestoreFailed(reason) => write!(f, "Restore failed: {}", reason),
            Self::DeleteFailed(reason) => write!(f, "Deleting the backup failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupEvent {
    /// A backup made from another device exists and can be restored
    PreviousBackupAvailable(RemoteBackupDescriptor),
    BackupCompleted(BackupReport),
    /// The datastore was replaced; the app must restart to pick it up
    RestartRequired,
    BackupDeleted,
    Failed(UserFacingError),
}

pub struct BackupSettingsController {
    service: Arc<BackupTransferService>,
    scheduler: BackupScheduler,
    events: broadcast::Sender<BackupEvent>,
}

impl BackupSettingsController {
    pub fn new(service: Arc<BackupTransferService>, scheduler: BackupScheduler) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            service,
            scheduler,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BackupEvent> {
        self.events.subscribe()
    }

    pub fn scheduler(&self) -> &BackupScheduler {
        &self.scheduler
    }

    /// Turn on the recurring backup
    ///
    /// Returns the remote backup left by another install, if this device has
    /// never backed up and one exists.
    pub async fn activate(&self) -> BudgetResult<Option<RemoteBackupDescriptor>> {
        let previous = self.previous_backup().await?;

        self.settings().set_backup_enabled(true)?;
        self.scheduler.schedule()?;
        info!("cloud backup activated");

        if let Some(descriptor) = &previous {
            self.emit(BackupEvent::PreviousBackupAvailable(descriptor.clone()));
        }
        Ok(previous)
    }

    pub fn deactivate(&self) -> BudgetResult<()> {
        self.settings().set_backup_enabled(false)?;
        self.scheduler.unschedule();
        info!("cloud backup deactivated");
        Ok(())
    }

    /// Re-register the recurring backup at startup if it was activated
    pub fn resume(&self) -> BudgetResult<bool> {
        if !self.settings().is_backup_enabled()? {
            return Ok(false);
        }
        self.scheduler.schedule()?;
        Ok(true)
    }

    /// Remote backup worth offering for restore on a device that never backed up
    pub async fn previous_backup(&self) -> BudgetResult<Option<RemoteBackupDescriptor>> {
        let descriptor = self.service.query_remote_backup_descriptor().await?;
        let user = self
            .service
            .context()
            .auth
            .current()
            .identity()
            .cloned()
            .ok_or(BudgetError::AuthRequired)?;
        if self.settings().last_backup_date(&user.id)?.is_some() {
            return Ok(None);
        }
        Ok(descriptor)
    }

    /// Run a backup now, unless a scheduled run is already executing
    pub async fn backup_now(&self) -> BudgetResult<BackupReport> {
        let result = if self.scheduler.is_running() {
            Err(BudgetError::OperationInProgress(OperationKind::Backup))
        } else {
            self.service.backup().await
        };

        match &result {
            Ok(report) => self.emit(BackupEvent::BackupCompleted(report.clone())),
            Err(e) => self.emit(BackupEvent::Failed(UserFacingError::BackupFailed(
                e.to_string(),
            ))),
        }
        result
    }

    pub async fn restore(&self) -> BudgetResult<RestoreReport> {
        let result = self.service.restore().await;
        match &result {
            Ok(_) => self.emit(BackupEvent::RestartRequired),
            Err(e) => self.emit(BackupEvent::Failed(UserFacingError::RestoreFailed(
                e.to_string(),
            ))),
        }
        result
    }

    pub async fn delete(&self) -> BudgetResult<bool> {
        let result = self.service.delete().await;
        match &result {
            Ok(_) => self.emit(BackupEvent::BackupDeleted),
            Err(e) => self.emit(BackupEvent::Failed(UserFacingError::DeleteFailed(
                e.to_string(),
            ))),
        }
        result
    }

    /// Stop the recurring backup and sign out
    pub fn logout(&self) -> BudgetResult<()> {
        self.scheduler.unschedule();
        self.settings().set_backup_enabled(false)?;
        self.service.context().auth.logout()?;
        info!("signed out of cloud backup");
        Ok(())
    }

    fn settings(&self) -> &dyn BackupSettingsStore {
        self.service.context().settings.as_ref()
    }

    fn emit(&self, event: BackupEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }
}
