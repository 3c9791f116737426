//! Backup, restore and delete against remote storage
//!
//! Every public operation first resolves the signed-in identity and checks
//! the entitlement, before any I/O. The in-flight flag is raised after the
//! gate and lowered only once the operation's scratch resources are gone.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use super::archive::{self, BACKUP_VERSION, SNAPSHOT_ENTRY};
use super::collaborators::{
    AuthProvider, BackupSettingsStore, Datastore, EntitlementCheck, Identity,
    RemoteBackupDescriptor, RemoteError, RemoteStorage,
};
use super::operation::{OperationFlag, OperationKind};
use super::scratch::ScratchSpace;
use crate::audit::{AuditEntry, AuditLogger};
use crate::error::{BudgetError, BudgetResult};

const ARCHIVE_FILENAME: &str = "backup.zip";
const DOWNLOAD_FILENAME: &str = "backup_download.zip";
const EXTRACT_DIRNAME: &str = "backup_download";

/// Remote location of a user's single backup object
pub fn remote_backup_path(user_id: &str) -> String {
    format!("user/{}/backup.zip", user_id)
}

/// Collaborators shared by the backup components, built once at startup
#[derive(Clone)]
pub struct BackupContext {
    pub datastore: Arc<dyn Datastore>,
    pub auth: Arc<dyn AuthProvider>,
    pub entitlement: Arc<dyn EntitlementCheck>,
    pub remote: Arc<dyn RemoteStorage>,
    pub settings: Arc<dyn BackupSettingsStore>,
    pub scratch: ScratchSpace,
    pub audit: Option<Arc<AuditLogger>>,
}

/// Result of a successful backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub remote_path: String,
    pub archive_size: u64,
    pub completed_at: DateTime<Utc>,
}

/// Result of a successful restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub remote_path: String,
    pub version: u32,
}

/// Orchestrates cloud backup operations for the signed-in user
pub struct BackupTransferService {
    context: BackupContext,
    flag: OperationFlag,
}

impl BackupTransferService {
    pub fn new(context: BackupContext) -> Self {
        Self {
            context,
            flag: OperationFlag::new(),
        }
    }

    pub fn context(&self) -> &BackupContext {
        &self.context
    }

    /// Flag observed by the sync state machine
    pub fn operation_flag(&self) -> &OperationFlag {
        &self.flag
    }

    /// Snapshot the datastore and upload it as the user's backup
    ///
    /// `TransferFailed` is the only retryable outcome. Scratch files are
    /// removed before this returns, whatever the outcome.
    pub async fn backup(&self) -> BudgetResult<BackupReport> {
        self.run(OperationKind::Backup, |identity| self.perform_backup(identity))
            .await
    }

    /// Download the user's backup and swap it in as the live datastore
    pub async fn restore(&self) -> BudgetResult<RestoreReport> {
        self.run(OperationKind::Restore, |identity| {
            self.perform_restore(identity)
        })
        .await
    }

    /// Remove the user's remote backup; `false` when none existed
    pub async fn delete(&self) -> BudgetResult<bool> {
        self.run(OperationKind::Delete, |identity| self.perform_delete(identity))
            .await
    }

    /// Metadata of the user's remote backup, if one exists
    pub async fn query_remote_backup_descriptor(
        &self,
    ) -> BudgetResult<Option<RemoteBackupDescriptor>> {
        let identity = self.authorize().await?;
        self.context
            .remote
            .stat_metadata(&remote_backup_path(&identity.id))
            .await
            .map_err(|e| BudgetError::TransferFailed(e.to_string()))
    }

    async fn authorize(&self) -> BudgetResult<Identity> {
        let identity = self
            .context
            .auth
            .current()
            .identity()
            .cloned()
            .ok_or(BudgetError::AuthRequired)?;

        if !self.context.entitlement.is_entitled().await {
            return Err(BudgetError::NotEntitled);
        }

        Ok(identity)
    }

    async fn run<T, F, Fut>(&self, kind: OperationKind, op: F) -> BudgetResult<T>
    where
        F: FnOnce(Identity) -> Fut,
        Fut: Future<Output = BudgetResult<T>>,
    {
        let mut user_id = None;
        let result = self.execute(kind, &mut user_id, op).await;
        self.record(kind, user_id, result.as_ref().err());
        result
    }

    async fn execute<T, F, Fut>(
        &self,
        kind: OperationKind,
        user_id: &mut Option<String>,
        op: F,
    ) -> BudgetResult<T>
    where
        F: FnOnce(Identity) -> Fut,
        Fut: Future<Output = BudgetResult<T>>,
    {
        let identity = self.authorize().await?;
        *user_id = Some(identity.id.clone());

        let _in_flight = self.flag.try_begin(kind)?;
        info!(operation = %kind, user = %identity.id, "cloud operation started");

        op(identity).await
    }

    fn record(&self, kind: OperationKind, user_id: Option<String>, failure: Option<&BudgetError>) {
        let entry = match failure {
            None => {
                info!(operation = %kind, "cloud operation succeeded");
                user_id.map(|id| AuditEntry::succeeded(kind, id))
            }
            Some(e) => {
                if e.is_retryable() {
                    warn!(operation = %kind, error = %e, "cloud operation failed, retryable");
                } else {
                    error!(operation = %kind, error = %e, "cloud operation failed");
                }
                Some(AuditEntry::failed(kind, user_id, e))
            }
        };

        if let (Some(audit), Some(entry)) = (&self.context.audit, entry) {
            if let Err(e) = audit.log(&entry) {
                warn!(error = %e, "failed to write audit entry");
            }
        }
    }

    async fn perform_backup(&self, identity: Identity) -> BudgetResult<BackupReport> {
        self.context
            .datastore
            .force_flush_to_durable_storage()
            .await
            .map_err(|e| BudgetError::FlushFailed(e.to_string()))?;

        let remote_path = remote_backup_path(&identity.id);
        let remote = &remote_path;
        let scratch = &self.context.scratch;

        let archive_size = scratch
            .with_scratch_file(SNAPSHOT_ENTRY, |snapshot| async move {
                let source = self.context.datastore.snapshot_path();
                tokio::fs::copy(&source, &snapshot).await.map_err(|e| {
                    BudgetError::SnapshotCopyFailed(format!("{}: {}", source.display(), e))
                })?;
                let snapshot_bytes = tokio::fs::read(&snapshot)
                    .await
                    .map_err(|e| BudgetError::SnapshotCopyFailed(e.to_string()))?;

                let packed = archive::pack(&snapshot_bytes, BACKUP_VERSION)?;

                scratch
                    .with_scratch_file(ARCHIVE_FILENAME, |archive_path| async move {
                        tokio::fs::write(&archive_path, &packed).await.map_err(|e| {
                            BudgetError::Io(format!("Failed to write archive: {}", e))
                        })?;

                        self.context
                            .remote
                            .upload(&archive_path, remote)
                            .await
                            .map_err(|e| BudgetError::TransferFailed(e.to_string()))?;

                        Ok(packed.len() as u64)
                    })
                    .await
            })
            .await?;

        let completed_at = Utc::now();
        self.context
            .settings
            .set_last_backup_date(&identity.id, completed_at)?;

        Ok(BackupReport {
            remote_path,
            archive_size,
            completed_at,
        })
    }

    async fn perform_restore(&self, identity: Identity) -> BudgetResult<RestoreReport> {
        let remote_path = remote_backup_path(&identity.id);
        let remote = &remote_path;
        let scratch = &self.context.scratch;

        let version = scratch
            .with_scratch_file(DOWNLOAD_FILENAME, |download| async move {
                self.context
                    .remote
                    .download(remote, &download)
                    .await
                    .map_err(|e| match e {
                        RemoteError::NotFound(path) => BudgetError::BackupNotFound(path),
                        other => BudgetError::TransferFailed(other.to_string()),
                    })?;

                scratch
                    .with_scratch_dir(EXTRACT_DIRNAME, |dir| async move {
                        let extracted = archive::extract(&download, &dir).await?;
                        ensure_supported_version(extracted.version)?;

                        // Not exclusive against concurrent datastore users
                        self.context
                            .datastore
                            .replace_from_snapshot(&extracted.snapshot_path)
                            .await?;

                        Ok(extracted.version)
                    })
                    .await
            })
            .await?;

        self.context.settings.set_force_reinit_flag()?;

        Ok(RestoreReport {
            remote_path,
            version,
        })
    }

    async fn perform_delete(&self, identity: Identity) -> BudgetResult<bool> {
        self.context
            .remote
            .delete(&remote_backup_path(&identity.id))
            .await
            .map_err(|e| BudgetError::TransferFailed(e.to_string()))
    }
}

fn ensure_supported_version(version: u32) -> BudgetResult<()> {
    if version > BACKUP_VERSION {
        return Err(BudgetError::CorruptArchive(format!(
            "unsupported archive version {} (newest known is {})",
            version, BACKUP_VERSION
        )));
    }
    Ok(())
}
