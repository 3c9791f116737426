//! Append-only JSONL journal of cloud operations
//!
//! One line per terminal outcome, flushed as soon as it is written.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::backup::OperationKind;
use crate::error::{BudgetError, BudgetResult};

use super::entry::AuditEntry;

/// Writes and reads the cloud operation journal
pub struct AuditLogger {
    log_path: PathBuf,
    /// Concurrent operations append whole lines
    write_lock: Mutex<()>,
}

impl AuditLogger {
    pub fn new(log_path: PathBuf) -> Self {
        Self {
            log_path,
            write_lock: Mutex::new(()),
        }
    }

    /// Append an entry and flush it
    pub fn log(&self, entry: &AuditEntry) -> BudgetResult<()> {
        let mut line = serde_json::to_string(entry)
            .map_err(|e| BudgetError::Json(format!("Failed to serialize audit entry: {}", e)))?;
        line.push('\n');

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| BudgetError::Io("Audit journal lock poisoned".into()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| self.io_error("open", e))?;
        file.write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| self.io_error("append to", e))
    }

    /// Every entry, oldest first
    pub fn read_all(&self) -> BudgetResult<Vec<AuditEntry>> {
        let file = match File::open(&self.log_path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error("open", e)),
        };

        BufReader::new(file)
            .lines()
            .enumerate()
            .filter(|(_, line)| !matches!(line, Ok(text) if text.trim().is_empty()))
            .map(|(index, line)| {
                let text = line.map_err(|e| self.io_error("read", e))?;
                serde_json::from_str::<AuditEntry>(&text).map_err(|e| {
                    BudgetError::Json(format!("Bad audit entry on line {}: {}", index + 1, e))
                })
            })
            .collect()
    }

    /// The newest `count` entries, oldest first
    pub fn read_recent(&self, count: usize) -> BudgetResult<Vec<AuditEntry>> {
        let mut entries = self.read_all()?;
        let skip = entries.len().saturating_sub(count);
        Ok(entries.split_off(skip))
    }

    /// Most recent outcome of one kind of operation
    pub fn last_outcome(&self, operation: OperationKind) -> BudgetResult<Option<AuditEntry>> {
        Ok(self
            .read_all()?
            .into_iter()
            .rev()
            .find(|entry| entry.operation == operation))
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    fn io_error(&self, action: &str, e: std::io::Error) -> BudgetError {
        BudgetError::Io(format!(
            "Failed to {} audit journal {}: {}",
            action,
            self.log_path.display(),
            e
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::entry::Outcome;
    use tempfile::TempDir;

    fn create_test_logger() -> (AuditLogger, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let logger = AuditLogger::new(temp_dir.path().join("audit.log"));
        (logger, temp_dir)
    }

    #[test]
    fn test_log_and_read() {
        let (logger, _temp) = create_test_logger();

        logger
            .log(&AuditEntry::succeeded(OperationKind::Backup, "U1"))
            .unwrap();

        let entries = logger.read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation, OperationKind::Backup);
        assert_eq!(entries[0].outcome, Outcome::Succeeded);
    }

    #[test]
    fn test_read_recent() {
        let (logger, _temp) = create_test_logger();

        for i in 0..10 {
            logger
                .log(&AuditEntry::succeeded(OperationKind::Backup, format!("U{}", i)))
                .unwrap();
        }

        let recent = logger.read_recent(3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].user_id.as_deref(), Some("U7"));
        assert_eq!(recent[2].user_id.as_deref(), Some("U9"));
        assert_eq!(logger.read_recent(50).unwrap().len(), 10);
    }

    #[test]
    fn test_last_outcome() {
        let (logger, _temp) = create_test_logger();
        let failure = BudgetError::TransferFailed("timeout".into());
        logger
            .log(&AuditEntry::succeeded(OperationKind::Backup, "U1"))
            .unwrap();
        logger
            .log(&AuditEntry::failed(OperationKind::Backup, Some("U1".into()), &failure))
            .unwrap();
        logger
            .log(&AuditEntry::succeeded(OperationKind::Delete, "U1"))
            .unwrap();

        let last = logger.last_outcome(OperationKind::Backup).unwrap().unwrap();
        assert!(!last.is_success());
        assert!(logger.last_outcome(OperationKind::Restore).unwrap().is_none());
    }

    #[test]
    fn test_missing_journal_is_empty() {
        let (logger, _temp) = create_test_logger();
        assert!(logger.read_all().unwrap().is_empty());
        assert!(!logger.path().exists());
    }

    #[test]
    fn test_blank_lines_are_skipped_and_bad_lines_reported() {
        let (logger, _temp) = create_test_logger();
        logger
            .log(&AuditEntry::succeeded(OperationKind::Restore, "U1"))
            .unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(logger.path())
            .unwrap()
            .write_all(b"\n\n")
            .unwrap();
        assert_eq!(logger.read_all().unwrap().len(), 1);

        std::fs::OpenOptions::new()
            .append(true)
            .open(logger.path())
            .unwrap()
            .write_all(b"{not json}\n")
            .unwrap();
        let err = logger.read_all().unwrap_err();
        assert!(err.to_string().contains("line 4"));
    }

    #[test]
    fn test_survives_restart() {
        let (logger, temp) = create_test_logger();
        logger
            .log(&AuditEntry::succeeded(OperationKind::Delete, "U1"))
            .unwrap();

        let reopened = AuditLogger::new(temp.path().join("audit.log"));
        assert_eq!(reopened.read_all().unwrap().len(), 1);
    }
}
