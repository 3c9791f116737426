//! Versioned backup archive
//!
//! A backup archive is a zip container with exactly two entries:
//!
//! - `version`: ASCII decimal integer, currently always `"1"`
//! - `db_backup`: raw bytes of the datastore snapshot file
//!
//! The codec never interprets the snapshot itself.

use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{BudgetError, BudgetResult};

/// Archive format version written by this build
pub const BACKUP_VERSION: u32 = 1;

/// Name of the entry holding the version number
pub const VERSION_ENTRY: &str = "version";

/// Name of the entry holding the datastore snapshot
pub const SNAPSHOT_ENTRY: &str = "db_backup";

/// Decoded backup archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArchive {
    pub version: u32,
    pub payload: Vec<u8>,
}

/// An archive unpacked into a directory
#[derive(Debug, Clone)]
pub struct ExtractedBackup {
    pub version: u32,
    pub snapshot_path: PathBuf,
}

/// Pack a datastore snapshot into archive bytes
pub fn pack(snapshot: &[u8], version: u32) -> BudgetResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    writer
        .start_file(VERSION_ENTRY, options)
        .map_err(|e| BudgetError::Storage(format!("Failed to start version entry: {}", e)))?;
    writer
        .write_all(version.to_string().as_bytes())
        .map_err(|e| BudgetError::Storage(format!("Failed to write version entry: {}", e)))?;

    writer
        .start_file(SNAPSHOT_ENTRY, options)
        .map_err(|e| BudgetError::Storage(format!("Failed to start snapshot entry: {}", e)))?;
    writer
        .write_all(snapshot)
        .map_err(|e| BudgetError::Storage(format!("Failed to write snapshot entry: {}", e)))?;

    let cursor = writer
        .finish()
        .map_err(|e| BudgetError::Storage(format!("Failed to finish archive: {}", e)))?;

    Ok(cursor.into_inner())
}

/// Unpack archive bytes into the version and the snapshot bytes
///
/// # Errors
///
/// `CorruptArchive` if the container is unreadable, an entry is missing, or
/// the version entry is not a decimal integer.
pub fn unpack(bytes: &[u8]) -> BudgetResult<BackupArchive> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| BudgetError::CorruptArchive(format!("unreadable container: {}", e)))?;

    let raw_version = read_entry(&mut archive, VERSION_ENTRY)?;
    let version = std::str::from_utf8(&raw_version)
        .ok()
        .and_then(|text| text.trim().parse::<u32>().ok())
        .ok_or_else(|| {
            BudgetError::CorruptArchive(format!(
                "version entry is not an integer: {:?}",
                String::from_utf8_lossy(&raw_version)
            ))
        })?;

    let payload = read_entry(&mut archive, SNAPSHOT_ENTRY)?;

    Ok(BackupArchive { version, payload })
}

/// Unpack the archive file at `archive_path` into `dir`
///
/// Writes the snapshot as `dir/db_backup` and returns its path with the
/// archive version.
pub async fn extract(archive_path: &Path, dir: &Path) -> BudgetResult<ExtractedBackup> {
    let bytes = tokio::fs::read(archive_path).await.map_err(|e| {
        BudgetError::Io(format!(
            "Failed to read archive {}: {}",
            archive_path.display(),
            e
        ))
    })?;

    let archive = unpack(&bytes)?;

    let snapshot_path = dir.join(SNAPSHOT_ENTRY);
    tokio::fs::write(&snapshot_path, &archive.payload)
        .await
        .map_err(|e| BudgetError::Io(format!("Failed to extract snapshot: {}", e)))?;

    Ok(ExtractedBackup {
        version: archive.version,
        snapshot_path,
    })
}

fn read_entry(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> BudgetResult<Vec<u8>> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| BudgetError::CorruptArchive(format!("missing '{}' entry: {}", name, e)))?;

    let mut contents = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut contents)
        .map_err(|e| BudgetError::CorruptArchive(format!("unreadable '{}' entry: {}", name, e)))?;

    Ok(contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn archive_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_round_trip() {
        let snapshot = b"SQLite format 3\0 pretend pages".to_vec();

        let packed = pack(&snapshot, BACKUP_VERSION).unwrap();
        let archive = unpack(&packed).unwrap();

        assert_eq!(archive.version, 1);
        assert_eq!(archive.payload, snapshot);
    }

    #[test]
    fn test_round_trip_empty_snapshot() {
        let archive = unpack(&pack(&[], 7).unwrap()).unwrap();
        assert_eq!(archive.version, 7);
        assert!(archive.payload.is_empty());
    }

    #[test]
    fn test_pack_is_deterministic() {
        let snapshot = vec![0xAB; 4096];
        assert_eq!(pack(&snapshot, 1).unwrap(), pack(&snapshot, 1).unwrap());
    }

    #[test]
    fn test_entries_have_expected_names() {
        let packed = pack(b"data", 1).unwrap();
        let archive = ZipArchive::new(Cursor::new(packed.as_slice())).unwrap();

        let mut names: Vec<&str> = archive.file_names().collect();
        names.sort();
        assert_eq!(names, vec!["db_backup", "version"]);
    }

    #[test]
    fn test_missing_version_is_corrupt() {
        let bytes = archive_with(&[(SNAPSHOT_ENTRY, &b"data"[..])]);
        let err = unpack(&bytes).unwrap_err();
        assert!(matches!(err, BudgetError::CorruptArchive(_)));
    }

    #[test]
    fn test_missing_snapshot_is_corrupt() {
        let bytes = archive_with(&[(VERSION_ENTRY, &b"1"[..])]);
        let err = unpack(&bytes).unwrap_err();
        assert!(matches!(err, BudgetError::CorruptArchive(_)));
    }

    #[test]
    fn test_non_integer_version_is_corrupt() {
        let bytes = archive_with(&[(VERSION_ENTRY, &b"one"[..]), (SNAPSHOT_ENTRY, &b"data"[..])]);
        let err = unpack(&bytes).unwrap_err();
        assert!(err.to_string().contains("not an integer"));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let err = unpack(b"definitely not a zip file").unwrap_err();
        assert!(matches!(err, BudgetError::CorruptArchive(_)));
    }

    #[tokio::test]
    async fn test_extract_writes_snapshot() {
        let temp = TempDir::new().unwrap();
        let archive_path = temp.path().join("backup.zip");
        std::fs::write(&archive_path, pack(b"pages", 1).unwrap()).unwrap();

        let out = temp.path().join("out");
        std::fs::create_dir(&out).unwrap();

        let extracted = extract(&archive_path, &out).await.unwrap();
        assert_eq!(extracted.version, 1);
        assert_eq!(extracted.snapshot_path, out.join("db_backup"));
        assert_eq!(std::fs::read(&extracted.snapshot_path).unwrap(), b"pages");
    }
}
