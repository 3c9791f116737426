//! Crash-safe file writes
//!
//! Every write lands in a sibling temp file that is synced and then renamed
//! over its target, so readers see the old contents or the new, never a mix.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::BudgetError;

/// Load a JSON document, falling back to `T::default()` when it is absent
pub fn read_json<T, P>(path: P) -> Result<T, BudgetError>
where
    T: DeserializeOwned + Default,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(storage_error("open", path, e)),
    };

    serde_json::from_reader(BufReader::new(file)).map_err(|e| storage_error("parse", path, e))
}

/// Serialize `data` as pretty JSON and swap it into place
pub fn write_json_atomic<T, P>(path: P, data: &T) -> Result<(), BudgetError>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    ensure_parent(path)?;
    let temp_path = path.with_extension("json.tmp");

    let file = File::create(&temp_path).map_err(|e| storage_error("create", &temp_path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, data)
        .map_err(|e| storage_error("serialize into", &temp_path, e))?;
    writer
        .flush()
        .and_then(|()| writer.get_ref().sync_all())
        .map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            storage_error("sync", &temp_path, e)
        })?;

    rename_over(&temp_path, path)
}

/// Replace `dest` with a copy of `source` atomically
///
/// The copy is written next to `dest`, synced, then renamed over it. A crash
/// at any point leaves either the previous `dest` or the complete copy.
pub fn replace_file_atomic(source: &Path, dest: &Path) -> Result<(), BudgetError> {
    ensure_parent(dest)?;

    let temp_path = sibling_temp_path(dest);

    fs::copy(source, &temp_path)
        .and_then(|_| File::open(&temp_path))
        .and_then(|f| f.sync_all())
        .map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            storage_error("copy restored datastore into", &temp_path, e)
        })?;

    rename_over(&temp_path, dest)
}

fn sibling_temp_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".restore.tmp");
    dest.with_file_name(name)
}

fn ensure_parent(path: &Path) -> Result<(), BudgetError> {
    match path.parent() {
        Some(parent) => {
            fs::create_dir_all(parent).map_err(|e| storage_error("create directory", parent, e))
        }
        None => Ok(()),
    }
}

fn rename_over(temp_path: &Path, path: &Path) -> Result<(), BudgetError> {
    fs::rename(temp_path, path).map_err(|e| {
        let _ = fs::remove_file(temp_path);
        storage_error("move temp file over", path, e)
    })
}

fn storage_error(action: &str, path: &Path, e: impl std::fmt::Display) -> BudgetError {
    BudgetError::Storage(format!("Failed to {} {}: {}", action, path.display(), e))
}
