//! Cloud backup system for Family Budget
//!
//! Snapshots the local datastore, uploads it as a versioned archive to remote
//! object storage, restores it, and keeps a recurring background backup
//! registered.
//!
//! # Architecture
//!
//! - `archive`: packs and unpacks the two-entry backup archive
//! - `scratch`: scoped scratch files and directories, removed on every exit path
//! - `transfer`: `BackupTransferService`, the gated backup/restore/delete operations
//! - `scheduler`: `BackupScheduler` and the in-process `TokioJobScheduler`
//! - `state`: the UI-facing `CloudBackupState` and its monitor
//! - `controller`: settings-screen actions and user-facing events
//!
//! # Archive Format
//!
//! A zip container with exactly two entries:
//! - `version`: ASCII decimal integer, currently `1`
//! - `db_backup`: raw bytes of the datastore snapshot file
//!
//! Each user has a single remote object at `user/{id}/backup.zip`.
//!
//! # Example
//!
//! ```rust,ignore
//! use family_budget::adapters::LocalBackend;
//! use family_budget::config::{BudgetPaths, Settings};
//!
//! let paths = BudgetPaths::new()?;
//! let backend = LocalBackend::open(&paths)?;
//! let report = backend.service.backup().await?;
//! println!("uploaded {} bytes to {}", report.archive_size, report.remote_path);
//! ```

pub mod archive;
pub mod collaborators;
pub mod controller;
mod operation;
pub mod scheduler;
pub mod scratch;
pub mod state;
pub mod transfer;

pub use archive::{BackupArchive, BACKUP_VERSION};
pub use collaborators::{
    AuthProvider, AuthState, BackupSettingsStore, Datastore, EntitlementCheck, Identity,
    RemoteBackupDescriptor, RemoteError, RemoteStorage,
};
pub use controller::{BackupEvent, BackupSettingsController, UserFacingError};
pub use operation::{OperationFlag, OperationGuard, OperationKind};
pub use scheduler::{
    BackoffPolicy, BackupScheduler, BackupTask, DeviceConditions, JobConstraints, JobInfo,
    JobOutcome, JobScheduler, JobState, RecurringTask, SchedulePolicy, TokioJobScheduler,
    BACKUP_JOB_TAG,
};
pub use scratch::ScratchSpace;
pub use state::{derive_state, CloudBackupState, SyncInputs, SyncStateMonitor};
pub use transfer::{
    remote_backup_path, BackupContext, BackupReport, BackupTransferService, RestoreReport,
};
