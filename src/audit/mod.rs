//! Audit journal for cloud operations
//!
//! Records the terminal outcome of every backup, restore and delete in an
//! append-only JSONL file next to the settings.
//!
//! - `AuditEntry`: timestamp, operation, user and outcome of one operation
//! - `AuditLogger`: appends entries and reads them back

mod entry;
mod logger;

pub use entry::{AuditEntry, Outcome};
pub use logger::AuditLogger;
