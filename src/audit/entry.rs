//! Audit entry data structures
//!
//! Defines one journal line per terminal outcome of a cloud backup, restore
//! or delete.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backup::OperationKind;
use crate::error::BudgetError;

/// How a cloud operation ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    /// Operation completed
    Succeeded,
    /// Operation failed; `kind` is the error's short name
    Failed { kind: String, retryable: bool },
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Succeeded => write!(f, "SUCCEEDED"),
            Outcome::Failed { kind, retryable } if *retryable => {
                write!(f, "FAILED ({}, will retry)", kind)
            }
            Outcome::Failed { kind, .. } => write!(f, "FAILED ({})", kind),
        }
    }
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the operation ended (UTC)
    pub timestamp: DateTime<Utc>,

    /// Which cloud operation ran
    pub operation: OperationKind,

    /// User the operation ran for; absent when refused before identification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    pub outcome: Outcome,

    /// Error message for failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEntry {
    /// Entry for a successful operation
    pub fn succeeded(operation: OperationKind, user_id: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            user_id: Some(user_id.into()),
            outcome: Outcome::Succeeded,
            detail: None,
        }
    }

    /// Entry for a failed operation
    pub fn failed(operation: OperationKind, user_id: Option<String>, error: &BudgetError) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            user_id,
            outcome: Outcome::Failed {
                kind: error.kind().to_string(),
                retryable: error.is_retryable(),
            },
            detail: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }

    /// One-line human-readable summary
    pub fn format_human_readable(&self) -> String {
        format!(
            "{} {} {} for {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.operation,
            self.outcome,
            self.user_id.as_deref().unwrap_or("<anonymous>")
        )
    }
}
