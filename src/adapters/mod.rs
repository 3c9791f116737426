//! Local implementations of the cloud backup collaborators
//!
//! Lets the backup subsystem run end to end on one machine: the datastore is
//! a single file, the remote store is a directory, and the account and
//! premium flag live in the settings file.

pub mod auth;
pub mod datastore;
pub mod device;
pub mod entitlement;
pub mod remote;
pub mod settings_store;

use std::sync::Arc;

pub use auth::LocalAuth;
pub use datastore::FileDatastore;
pub use device::StaticConditions;
pub use entitlement::PremiumEntitlement;
pub use remote::{LocalObjectStore, RetryingStorage};
pub use settings_store::SettingsStore;

use crate::audit::AuditLogger;
use crate::backup::{
    BackupContext, BackupScheduler, BackupSettingsController, BackupTransferService,
    JobScheduler, ScratchSpace, SyncStateMonitor,
};
use crate::config::BudgetPaths;
use crate::error::BudgetResult;

/// Every collaborator wired together for one data directory
pub struct LocalBackend {
    pub paths: BudgetPaths,
    pub settings: Arc<SettingsStore>,
    pub auth: Arc<LocalAuth>,
    pub entitlement: Arc<PremiumEntitlement>,
    pub audit: Arc<AuditLogger>,
    pub service: Arc<BackupTransferService>,
}

impl LocalBackend {
    pub fn open(paths: &BudgetPaths) -> BudgetResult<Self> {
        paths.ensure_directories()?;

        let settings = Arc::new(SettingsStore::open(paths.clone())?);
        let auth = Arc::new(LocalAuth::new(settings.clone()));
        let entitlement = Arc::new(PremiumEntitlement::new(settings.clone()));
        let audit = Arc::new(AuditLogger::new(paths.audit_log()));
        let remote = RetryingStorage::new(
            LocalObjectStore::new(paths.remote_dir()),
            settings.snapshot().remote,
        );

        let context = BackupContext {
            datastore: Arc::new(FileDatastore::open(paths.database_file())?),
            auth: auth.clone(),
            entitlement: entitlement.clone(),
            remote: Arc::new(remote),
            settings: settings.clone(),
            scratch: ScratchSpace::new(paths.cache_dir()),
            audit: Some(audit.clone()),
        };

        Ok(Self {
            paths: paths.clone(),
            settings,
            auth,
            entitlement,
            audit,
            service: Arc::new(BackupTransferService::new(context)),
        })
    }

    pub fn controller(&self, jobs: Arc<dyn JobScheduler>) -> BackupSettingsController {
        let scheduler = BackupScheduler::new(jobs, self.service.clone());
        BackupSettingsController::new(self.service.clone(), scheduler)
    }

    pub fn monitor(&self) -> SyncStateMonitor {
        SyncStateMonitor::new(self.service.clone())
    }
}
