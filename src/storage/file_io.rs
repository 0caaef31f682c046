//! File I/O utilities with atomic writes
//!
//! Provides safe file operations that won't leave half-written files behind.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{BackupError, BackupResult};

/// Read JSON from a file, returning a default value if file doesn't exist
pub fn read_json<T, P>(path: P) -> BackupResult<T>
where
    T: DeserializeOwned + Default,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    if !path.exists() {
        return Ok(T::default());
    }

    let file = File::open(path)
        .map_err(|e| BackupError::Io(format!("Failed to open {}: {}", path.display(), e)))?;

    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .map_err(|e| BackupError::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Path of the temporary sibling used while `path` is being written
///
/// `backup-x.zip` becomes `backup-x.zip.tmp`, so the temporary file never
/// carries the final extension.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("file"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write a file atomically through a caller-supplied writer
///
/// The closure receives a freshly created temporary file and must hand it
/// back once everything is written. The file is then synced to disk and
/// renamed over `path`. On any failure the temporary file is removed and
/// `path` is left untouched.
pub fn write_atomic_with<P, F>(path: P, write: F) -> BackupResult<()>
where
    P: AsRef<Path>,
    F: FnOnce(File) -> BackupResult<File>,
{
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                BackupError::Io(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    // Temp file lives in the same directory so the rename stays atomic
    let temp_path = temp_path_for(path);

    let file = File::create(&temp_path)
        .map_err(|e| BackupError::Io(format!("Failed to create temp file: {}", e)))?;

    let result = write(file).and_then(|file| {
        file.sync_all()
            .map_err(|e| BackupError::Io(format!("Failed to sync data: {}", e)))
    });

    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        BackupError::Io(format!("Failed to rename temp file: {}", e))
    })?;

    Ok(())
}

/// Write a UTF-8 text file atomically
pub fn write_text_atomic<P: AsRef<Path>>(path: P, contents: &str) -> BackupResult<()> {
    write_atomic_with(path, |file| {
        let mut writer = BufWriter::new(file);
        writer
            .write_all(contents.as_bytes())
            .map_err(|e| BackupError::Io(format!("Failed to write data: {}", e)))?;
        writer
            .into_inner()
            .map_err(|e| BackupError::Io(format!("Failed to flush data: {}", e.error())))
    })
}

/// Write JSON to a file atomically (write to temp, then rename)
pub fn write_json_atomic<T, P>(path: P, data: &T) -> BackupResult<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| BackupError::Json(format!("Failed to serialize data: {}", e)))?;
    write_text_atomic(path, &json)
}
