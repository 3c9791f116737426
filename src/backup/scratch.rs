//! Scoped scratch files and directories
//!
//! Every scratch resource lives under a process-private cache root, gets a
//! unique name so two operations never share one, and is removed when its
//! guard is dropped. Removal runs on every exit path: normal return, error,
//! panic unwinding, and cancellation of the owning future. Removal failures
//! are logged and never change the outcome of the scoped work.

use std::fs;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{BudgetError, BudgetResult};

/// Factory for scratch resources under one cache root
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    root: PathBuf,
}

impl ScratchSpace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create an empty scratch file whose name ends with `name`
    pub fn scratch_file(&self, name: &str) -> BudgetResult<ScratchFile> {
        let path = self.unique_path(name)?;
        fs::File::create(&path).map_err(|e| {
            BudgetError::Io(format!(
                "Failed to create scratch file {}: {}",
                path.display(),
                e
            ))
        })?;
        debug!(path = %path.display(), "created scratch file");
        Ok(ScratchFile { path })
    }

    /// Create an empty scratch directory whose name ends with `name`
    pub fn scratch_dir(&self, name: &str) -> BudgetResult<ScratchDir> {
        let path = self.unique_path(name)?;
        fs::create_dir(&path).map_err(|e| {
            BudgetError::Io(format!(
                "Failed to create scratch directory {}: {}",
                path.display(),
                e
            ))
        })?;
        debug!(path = %path.display(), "created scratch directory");
        Ok(ScratchDir { path })
    }

    /// Run `work` with a scratch file that is deleted afterwards
    pub async fn with_scratch_file<F, Fut, T>(&self, name: &str, work: F) -> BudgetResult<T>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = BudgetResult<T>>,
    {
        let file = self.scratch_file(name)?;
        work(file.path().to_path_buf()).await
    }

    /// Run `work` with a scratch directory that is recursively deleted afterwards
    pub async fn with_scratch_dir<F, Fut, T>(&self, name: &str, work: F) -> BudgetResult<T>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = BudgetResult<T>>,
    {
        let dir = self.scratch_dir(name)?;
        work(dir.path().to_path_buf()).await
    }

    fn unique_path(&self, name: &str) -> BudgetResult<PathBuf> {
        fs::create_dir_all(&self.root).map_err(|e| {
            BudgetError::Io(format!(
                "Failed to create scratch root {}: {}",
                self.root.display(),
                e
            ))
        })?;
        Ok(self.root.join(format!("{}-{}", Uuid::new_v4().simple(), name)))
    }
}

/// Scratch file removed on drop
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed scratch file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "failed to delete scratch file"
            ),
        }
    }
}

/// Scratch directory recursively removed on drop
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed scratch directory"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "failed to delete scratch directory"
            ),
        }
    }
}
