//! Interfaces of the collaborators the cloud backup subsystem consumes
//!
//! The datastore, the authentication provider, the entitlement check, remote
//! object storage and the local settings store are owned elsewhere. The
//! backup code only sees them through these traits, which keeps every
//! component substitutable in tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use crate::error::BudgetResult;

/// Signed-in user, as reported by the authentication provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

/// Authentication state published by the provider
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    NotAuthenticated,
    Authenticating,
    Authenticated(Identity),
}

impl AuthState {
    /// The signed-in identity, if any
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }
}

/// Metadata of a stored remote object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteBackupDescriptor {
    pub path: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// Errors reported by a remote storage client
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Remote object not found: {0}")]
    NotFound(String),

    #[error("Remote call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Remote storage error: {0}")]
    Transport(String),
}

impl RemoteError {
    /// Whether a new attempt of the same call may succeed
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::NotFound(_))
    }
}

/// The transactional datastore holding the budget
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Flush every pending write to the on-disk snapshot file
    async fn force_flush_to_durable_storage(&self) -> BudgetResult<()>;

    /// Location of the on-disk snapshot file
    fn snapshot_path(&self) -> PathBuf;

    /// Replace the live datastore with the given snapshot file
    async fn replace_from_snapshot(&self, snapshot: &Path) -> BudgetResult<()>;
}

/// Source of the current user identity
pub trait AuthProvider: Send + Sync {
    /// Subscribe to auth state; the receiver holds the current value immediately
    fn subscribe(&self) -> watch::Receiver<AuthState>;

    /// Snapshot of the current state
    fn current(&self) -> AuthState {
        self.subscribe().borrow().clone()
    }

    /// Sign the current user out
    fn logout(&self) -> BudgetResult<()>;
}

/// Paid-tier gate required for every cloud operation
#[async_trait]
pub trait EntitlementCheck: Send + Sync {
    async fn is_entitled(&self) -> bool;
}

/// Remote object storage addressed by slash-separated paths
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), RemoteError>;

    async fn download(&self, remote: &str, local: &Path) -> Result<(), RemoteError>;

    /// Returns `false` when nothing existed at `remote`
    async fn delete(&self, remote: &str) -> Result<bool, RemoteError>;

    async fn stat_metadata(
        &self,
        remote: &str,
    ) -> Result<Option<RemoteBackupDescriptor>, RemoteError>;
}

/// User-scoped local settings touched by the backup subsystem
pub trait BackupSettingsStore: Send + Sync {
    /// Last successful upload made by this device for `user_id`
    fn last_backup_date(&self, user_id: &str) -> BudgetResult<Option<DateTime<Utc>>>;

    fn set_last_backup_date(&self, user_id: &str, at: DateTime<Utc>) -> BudgetResult<()>;

    /// Ask the app to re-derive its initial tracking date on next start
    fn set_force_reinit_flag(&self) -> BudgetResult<()>;

    fn is_backup_enabled(&self) -> BudgetResult<bool>;

    fn set_backup_enabled(&self, enabled: bool) -> BudgetResult<()>;
}
