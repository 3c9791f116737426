//! Remote object storage
//!
//! `LocalObjectStore` maps slash-separated object paths onto a directory.
//! `RetryingStorage` wraps any store with a per-attempt timeout and a small
//! bounded retry on transient errors.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::{sleep, timeout};
use tracing::warn;

use crate::backup::{RemoteBackupDescriptor, RemoteError, RemoteStorage};
use crate::config::RemoteSettings;

/// Object store rooted at a local directory
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, remote: &str) -> Result<PathBuf, RemoteError> {
        let relative = Path::new(remote);
        let valid = !remote.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(RemoteError::Transport(format!(
                "invalid object path '{}'",
                remote
            )));
        }
        Ok(self.root.join(relative))
    }
}

fn transport(action: &str, path: &Path, e: std::io::Error) -> RemoteError {
    RemoteError::Transport(format!("failed to {} {}: {}", action, path.display(), e))
}

#[async_trait]
impl RemoteStorage for LocalObjectStore {
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), RemoteError> {
        let dest = self.object_path(remote)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| transport("create", parent, e))?;
        }

        // Readers never see a partially written object
        let partial = dest.with_extension("part");
        tokio::fs::copy(local, &partial)
            .await
            .map_err(|e| transport("write", &partial, e))?;
        tokio::fs::rename(&partial, &dest)
            .await
            .map_err(|e| transport("publish", &dest, e))
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<(), RemoteError> {
        let source = self.object_path(remote)?;
        match tokio::fs::copy(&source, local).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(RemoteError::NotFound(remote.to_string()))
            }
            Err(e) => Err(transport("read", &source, e)),
        }
    }

    async fn delete(&self, remote: &str) -> Result<bool, RemoteError> {
        let path = self.object_path(remote)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(transport("delete", &path, e)),
        }
    }

    async fn stat_metadata(
        &self,
        remote: &str,
    ) -> Result<Option<RemoteBackupDescriptor>, RemoteError> {
        let path = self.object_path(remote)?;
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(transport("stat", &path, e)),
        };
        let modified = metadata
            .modified()
            .map_err(|e| transport("stat", &path, e))?;

        Ok(Some(RemoteBackupDescriptor {
            path: remote.to_string(),
            last_modified: DateTime::<Utc>::from(modified),
            size: metadata.len(),
        }))
    }
}

/// Wraps a remote store with a per-call timeout and retries
pub struct RetryingStorage<S> {
    inner: S,
    settings: RemoteSettings,
}

impl<S: RemoteStorage> RetryingStorage<S> {
    pub fn new(inner: S, settings: RemoteSettings) -> Self {
        Self { inner, settings }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn call<T, F, Fut>(&self, op_name: &str, f: F) -> Result<T, RemoteError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let limit = self.settings.attempt_timeout();
        let mut delay = self.settings.retry_delay();
        let mut attempt = 0;

        loop {
            let result = match timeout(limit, f()).await {
                Ok(result) => result,
                Err(_) => Err(RemoteError::Timeout(limit)),
            };

            match result {
                Err(e) if e.is_transient() && attempt < self.settings.max_retries => {
                    attempt += 1;
                    warn!(
                        "remote {op_name}: transient error (attempt {}/{}), retrying: {e}",
                        attempt, self.settings.max_retries,
                    );
                    sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl<S: RemoteStorage> RemoteStorage for RetryingStorage<S> {
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), RemoteError> {
        self.call("upload", || self.inner.upload(local, remote))
            .await
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<(), RemoteError> {
        self.call("download", || self.inner.download(remote, local))
            .await
    }

    async fn delete(&self, remote: &str) -> Result<bool, RemoteError> {
        self.call("delete", || self.inner.delete(remote)).await
    }

    async fn stat_metadata(
        &self,
        remote: &str,
    ) -> Result<Option<RemoteBackupDescriptor>, RemoteError> {
        self.call("stat", || self.inner.stat_metadata(remote))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_object_lifecycle() {
        let temp = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp.path().join("remote"));
        let local = temp.path().join("archive.zip");
        std::fs::write(&local, b"archive bytes").unwrap();

        assert!(store.stat_metadata("user/U1/backup.zip").await.unwrap().is_none());

        store.upload(&local, "user/U1/backup.zip").await.unwrap();
        let descriptor = store
            .stat_metadata("user/U1/backup.zip")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(descriptor.size, 13);
        assert_eq!(descriptor.path, "user/U1/backup.zip");

        let fetched = temp.path().join("fetched.zip");
        store.download("user/U1/backup.zip", &fetched).await.unwrap();
        assert_eq!(std::fs::read(&fetched).unwrap(), b"archive bytes");

        assert!(store.delete("user/U1/backup.zip").await.unwrap());
        assert!(!store.delete("user/U1/backup.zip").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_object_download_is_not_found() {
        let temp = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp.path());

        let err = store
            .download("user/U1/backup.zip", &temp.path().join("out"))
            .await
            .unwrap_err();

        assert!(matches!(err, RemoteError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let temp = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp.path().join("remote"));

        for path in ["", "../outside", "/etc/passwd", "user/../../x"] {
            assert!(store.delete(path).await.is_err(), "accepted {:?}", path);
        }
    }

    /// Store whose stat fails `failures` times before answering, or hangs
    struct Flaky {
        failures: usize,
        hang: bool,
        not_found: bool,
        calls: AtomicUsize,
    }

    impl Flaky {
        fn failing(failures: usize) -> Self {
            Self {
                failures,
                hang: false,
                not_found: false,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RemoteStorage for Flaky {
        async fn upload(&self, _local: &Path, _remote: &str) -> Result<(), RemoteError> {
            unimplemented!()
        }

        async fn download(&self, _remote: &str, _local: &Path) -> Result<(), RemoteError> {
            unimplemented!()
        }

        async fn delete(&self, remote: &str) -> Result<bool, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.not_found {
                return Err(RemoteError::NotFound(remote.to_string()));
            }
            Ok(true)
        }

        async fn stat_metadata(
            &self,
            _remote: &str,
        ) -> Result<Option<RemoteBackupDescriptor>, RemoteError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if call < self.failures {
                return Err(RemoteError::Transport("connection reset".into()));
            }
            Ok(None)
        }
    }

    fn settings(max_retries: u32) -> RemoteSettings {
        RemoteSettings {
            attempt_timeout_secs: 10,
            max_retries,
            retry_delay_ms: 500,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let storage = RetryingStorage::new(Flaky::failing(2), settings(2));
        let start = tokio::time::Instant::now();

        assert!(storage.stat_metadata("x").await.unwrap().is_none());

        assert_eq!(storage.inner().calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(500 + 1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let storage = RetryingStorage::new(Flaky::failing(10), settings(2));

        let err = storage.stat_metadata("x").await.unwrap_err();

        assert!(matches!(err, RemoteError::Transport(_)));
        assert_eq!(storage.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_attempt_times_out() {
        let mut flaky = Flaky::failing(0);
        flaky.hang = true;
        let storage = RetryingStorage::new(flaky, settings(0));

        let err = storage.stat_metadata("x").await.unwrap_err();

        assert!(matches!(err, RemoteError::Timeout(d) if d == Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_not_retried() {
        let mut flaky = Flaky::failing(0);
        flaky.not_found = true;
        let storage = RetryingStorage::new(flaky, settings(5));

        assert!(matches!(
            storage.delete("x").await,
            Err(RemoteError::NotFound(_))
        ));
        assert_eq!(storage.inner().calls.load(Ordering::SeqCst), 1);
    }
}
