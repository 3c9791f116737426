//! Single-file datastore
//!
//! The budget lives in one file. Flushing syncs it to disk, and a restore
//! swaps the file via write-to-temp then rename.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::backup::Datastore;
use crate::error::{BudgetError, BudgetResult};
use crate::storage::replace_file_atomic;

pub struct FileDatastore {
    path: PathBuf,
}

impl FileDatastore {
    /// Open the datastore file, creating an empty one if it does not exist
    pub fn open(path: PathBuf) -> BudgetResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                BudgetError::Storage(format!("Failed to open {}: {}", path.display(), e))
            })?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Datastore for FileDatastore {
    async fn force_flush_to_durable_storage(&self) -> BudgetResult<()> {
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                BudgetError::Storage(format!("Failed to open {}: {}", self.path.display(), e))
            })?;
        file.sync_all().await.map_err(|e| {
            BudgetError::Storage(format!("Failed to sync {}: {}", self.path.display(), e))
        })
    }

    fn snapshot_path(&self) -> PathBuf {
        self.path.clone()
    }

    async fn replace_from_snapshot(&self, snapshot: &Path) -> BudgetResult<()> {
        let source = snapshot.to_path_buf();
        let dest = self.path.clone();
        tokio::task::spawn_blocking(move || replace_file_atomic(&source, &dest))
            .await
            .map_err(|e| BudgetError::Storage(format!("Restore task failed: {}", e)))??;

        info!(path = %self.path.display(), "datastore replaced from snapshot");
        Ok(())
    }
}
