//! In-memory collaborators with failure injection, for unit tests

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;
use tokio::sync::watch;

use crate::audit::AuditLogger;
use crate::backup::{
    AuthProvider, AuthState, BackupContext, BackupSettingsStore, BackupTransferService,
    Datastore, EntitlementCheck, Identity, RemoteBackupDescriptor, RemoteError, RemoteStorage,
    ScratchSpace,
};
use crate::error::{BudgetError, BudgetResult};
use crate::storage::replace_file_atomic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Flush,
    Replace,
}

pub struct MockDatastore {
    path: PathBuf,
    failure: Mutex<Option<Failure>>,
    flushes: AtomicUsize,
    replacements: AtomicUsize,
}

impl MockDatastore {
    pub fn new(path: PathBuf) -> Self {
        std::fs::write(&path, b"initial budget").unwrap();
        Self {
            path,
            failure: Mutex::new(None),
            flushes: AtomicUsize::new(0),
            replacements: AtomicUsize::new(0),
        }
    }

    pub fn fail(&self, failure: Failure) {
        *self.failure.lock().unwrap() = Some(failure);
    }

    pub fn write(&self, contents: &[u8]) {
        std::fs::write(&self.path, contents).unwrap();
    }

    pub fn contents(&self) -> Vec<u8> {
        std::fs::read(&self.path).unwrap()
    }

    pub fn remove_snapshot(&self) {
        std::fs::remove_file(&self.path).unwrap();
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn replacements(&self) -> usize {
        self.replacements.load(Ordering::SeqCst)
    }

    fn injected(&self, failure: Failure) -> bool {
        *self.failure.lock().unwrap() == Some(failure)
    }
}

#[async_trait]
impl Datastore for MockDatastore {
    async fn force_flush_to_durable_storage(&self) -> BudgetResult<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        if self.injected(Failure::Flush) {
            return Err(BudgetError::Storage("injected flush failure".into()));
        }
        Ok(())
    }

    fn snapshot_path(&self) -> PathBuf {
        self.path.clone()
    }

    async fn replace_from_snapshot(&self, snapshot: &Path) -> BudgetResult<()> {
        if self.injected(Failure::Replace) {
            return Err(BudgetError::Storage("injected replace failure".into()));
        }
        replace_file_atomic(snapshot, &self.path)?;
        self.replacements.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryRemote {
    objects: Mutex<HashMap<String, (Vec<u8>, DateTime<Utc>)>>,
    calls: AtomicUsize,
    fail_uploads: AtomicBool,
}

impl MemoryRemote {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .map(|(data, _)| data.clone())
    }

    pub fn put(&self, path: &str, data: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), (data, Utc::now()));
    }
}

#[async_trait]
impl RemoteStorage for MemoryRemote {
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("injected network failure".into()));
        }
        let data = tokio::fs::read(local)
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        self.put(remote, data);
        Ok(())
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let data = self
            .object(remote)
            .ok_or_else(|| RemoteError::NotFound(remote.to_string()))?;
        tokio::fs::write(local, data)
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))
    }

    async fn delete(&self, remote: &str) -> Result<bool, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.objects.lock().unwrap().remove(remote).is_some())
    }

    async fn stat_metadata(
        &self,
        remote: &str,
    ) -> Result<Option<RemoteBackupDescriptor>, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(remote)
            .map(|(data, modified)| RemoteBackupDescriptor {
                path: remote.to_string(),
                last_modified: *modified,
                size: data.len() as u64,
            }))
    }
}

pub struct TestAuth {
    tx: watch::Sender<AuthState>,
}

impl TestAuth {
    pub fn new(state: AuthState) -> Self {
        let (tx, _rx) = watch::channel(state);
        Self { tx }
    }

    pub fn set(&self, state: AuthState) {
        self.tx.send_replace(state);
    }
}

impl AuthProvider for TestAuth {
    fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    fn logout(&self) -> BudgetResult<()> {
        self.set(AuthState::NotAuthenticated);
        Ok(())
    }
}

pub struct ToggleEntitlement(AtomicBool);

impl ToggleEntitlement {
    pub fn set(&self, entitled: bool) {
        self.0.store(entitled, Ordering::SeqCst);
    }
}

#[async_trait]
impl EntitlementCheck for ToggleEntitlement {
    async fn is_entitled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct MemorySettings {
    last_backup: Mutex<HashMap<String, DateTime<Utc>>>,
    force_reinit: AtomicBool,
    enabled: AtomicBool,
}

impl MemorySettings {
    pub fn force_reinit_requested(&self) -> bool {
        self.force_reinit.load(Ordering::SeqCst)
    }
}

impl BackupSettingsStore for MemorySettings {
    fn last_backup_date(&self, user_id: &str) -> BudgetResult<Option<DateTime<Utc>>> {
        Ok(self.last_backup.lock().unwrap().get(user_id).copied())
    }

    fn set_last_backup_date(&self, user_id: &str, at: DateTime<Utc>) -> BudgetResult<()> {
        self.last_backup
            .lock()
            .unwrap()
            .insert(user_id.to_string(), at);
        Ok(())
    }

    fn set_force_reinit_flag(&self) -> BudgetResult<()> {
        self.force_reinit.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_backup_enabled(&self) -> BudgetResult<bool> {
        Ok(self.enabled.load(Ordering::SeqCst))
    }

    fn set_backup_enabled(&self, enabled: bool) -> BudgetResult<()> {
        self.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }
}

/// A transfer service wired to in-memory collaborators
pub struct TestEnv {
    pub service: Arc<BackupTransferService>,
    pub datastore: Arc<MockDatastore>,
    pub remote: Arc<MemoryRemote>,
    pub auth: Arc<TestAuth>,
    pub entitlement: Arc<ToggleEntitlement>,
    pub settings: Arc<MemorySettings>,
    pub audit: Arc<AuditLogger>,
    scratch: ScratchSpace,
    _temp: TempDir,
}

impl TestEnv {
    pub fn signed_in(user_id: &str) -> Self {
        Self::with_auth(AuthState::Authenticated(Identity::new(
            user_id,
            format!("{}@example.com", user_id.to_lowercase()),
        )))
    }

    pub fn signed_out() -> Self {
        Self::with_auth(AuthState::NotAuthenticated)
    }

    fn with_auth(state: AuthState) -> Self {
        let temp = TempDir::new().unwrap();
        let datastore = Arc::new(MockDatastore::new(temp.path().join("budget.db")));
        let remote = Arc::new(MemoryRemote::default());
        let auth = Arc::new(TestAuth::new(state));
        let entitlement = Arc::new(ToggleEntitlement(AtomicBool::new(true)));
        let settings = Arc::new(MemorySettings::default());
        let audit = Arc::new(AuditLogger::new(temp.path().join("audit.log")));
        let scratch = ScratchSpace::new(temp.path().join("cache"));

        let context = BackupContext {
            datastore: datastore.clone(),
            auth: auth.clone(),
            entitlement: entitlement.clone(),
            remote: remote.clone(),
            settings: settings.clone(),
            scratch: scratch.clone(),
            audit: Some(audit.clone()),
        };

        Self {
            service: Arc::new(BackupTransferService::new(context)),
            datastore,
            remote,
            auth,
            entitlement,
            settings,
            audit,
            scratch,
            _temp: temp,
        }
    }

    /// Files and directories currently under the scratch root
    pub fn scratch_entries(&self) -> usize {
        std::fs::read_dir(self.scratch.root())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}
