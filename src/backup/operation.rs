//! In-flight operation flag
//!
//! At most one backup, restore or delete runs per transfer service. The flag
//! is published through a watch channel so the sync state machine sees it
//! change, and it is held by an RAII guard so it is cleared on every exit
//! path, including when the operation future is dropped.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{BudgetError, BudgetResult};

/// Kind of cloud operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Backup,
    Restore,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Backup => "backup",
            Self::Restore => "restore",
            Self::Delete => "deletion",
        };
        f.write_str(name)
    }
}

/// Shared indicator of the operation currently in flight
#[derive(Debug, Clone)]
pub struct OperationFlag {
    tx: Arc<watch::Sender<Option<OperationKind>>>,
}

impl Default for OperationFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationFlag {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// The operation in flight, if any
    pub fn current(&self) -> Option<OperationKind> {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<OperationKind>> {
        self.tx.subscribe()
    }

    /// Mark `kind` as in flight, or fail if another operation already is
    pub fn try_begin(&self, kind: OperationKind) -> BudgetResult<OperationGuard> {
        let mut busy = None;
        self.tx.send_if_modified(|current| match current {
            Some(running) => {
                busy = Some(*running);
                false
            }
            None => {
                *current = Some(kind);
                true
            }
        });

        match busy {
            Some(running) => Err(BudgetError::OperationInProgress(running)),
            None => Ok(OperationGuard {
                tx: Arc::clone(&self.tx),
                kind,
            }),
        }
    }
}

/// Clears the operation flag when dropped
#[derive(Debug)]
pub struct OperationGuard {
    tx: Arc<watch::Sender<Option<OperationKind>>>,
    kind: OperationKind,
}

impl OperationGuard {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.tx.send_replace(None);
    }
}
