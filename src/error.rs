//! Custom error types for Family Budget
//!
//! This module defines the error hierarchy for the application using thiserror
//! for ergonomic error definitions. The cloud backup variants carry the
//! retry classification used by the scheduler.

use thiserror::Error;

use crate::backup::OperationKind;

/// The main error type for Family Budget operations
#[derive(Error, Debug)]
pub enum BudgetError {
    /// No authenticated identity is available
    #[error("Authentication required")]
    AuthRequired,

    /// The user does not hold the entitlement required for cloud backup
    #[error("Cloud backup is not available for this account")]
    NotEntitled,

    /// The datastore could not be flushed to durable storage
    #[error("Failed to flush datastore: {0}")]
    FlushFailed(String),

    /// The datastore snapshot could not be copied to scratch space
    #[error("Failed to copy datastore snapshot: {0}")]
    SnapshotCopyFailed(String),

    /// Upload or download against remote storage failed
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// The backup archive is malformed or missing entries
    #[error("Corrupt backup archive: {0}")]
    CorruptArchive(String),

    /// No remote backup exists for the user
    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    /// Another cloud operation is already running
    #[error("A {0} is already in progress")]
    OperationInProgress(OperationKind),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Recurring job registration errors
    #[error("Scheduling error: {0}")]
    Schedule(String),
}

impl BudgetError {
    /// Whether the failure is transient and the whole operation may be retried later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransferFailed(_) | Self::OperationInProgress(_)
        )
    }

    /// Whether the failure is permanent for this attempt
    pub fn is_permanent(&self) -> bool {
        !self.is_retryable()
    }

    /// Short machine-readable name, used by the audit journal
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthRequired => "auth_required",
            Self::NotEntitled => "not_entitled",
            Self::FlushFailed(_) => "flush_failed",
            Self::SnapshotCopyFailed(_) => "snapshot_copy_failed",
            Self::TransferFailed(_) => "transfer_failed",
            Self::CorruptArchive(_) => "corrupt_archive",
            Self::BackupNotFound(_) => "backup_not_found",
            Self::OperationInProgress(_) => "operation_in_progress",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Storage(_) => "storage",
            Self::Schedule(_) => "schedule",
        }
    }
}

impl From<std::io::Error> for BudgetError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BudgetError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for Family Budget operations
pub type BudgetResult<T> = Result<T, BudgetError>;
