//! Enumeration of archives in a target directory

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};

use super::archive::BackupArchive;
use crate::error::{BackupError, BackupResult};

/// File name prefix shared by all archives
pub const ARCHIVE_PREFIX: &str = "backup-";

/// File extension shared by all archives
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Build the file name for an archive created at `timestamp`
///
/// Format: `backup-YYYYMMDD-HHMMSS-mmm.zip`
pub fn archive_file_name(timestamp: DateTime<Utc>) -> String {
    format!(
        "{}{}-{:03}.{}",
        ARCHIVE_PREFIX,
        timestamp.format("%Y%m%d-%H%M%S"),
        timestamp.timestamp_subsec_millis(),
        ARCHIVE_EXTENSION
    )
}

/// Whether `path` follows the archive naming convention
pub fn is_archive_name(path: &Path) -> bool {
    let has_prefix = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(ARCHIVE_PREFIX));
    let has_extension = path
        .extension()
        .is_some_and(|ext| ext == ARCHIVE_EXTENSION);
    has_prefix && has_extension
}

/// Lists archives in a directory
///
/// Listing never opens the archives: a corrupt file still shows up and only
/// fails once its metadata is needed.
pub struct BackupCatalog;

impl BackupCatalog {
    /// List all archives in `directory`, newest first
    ///
    /// Ties on creation time are ordered by path, ascending.
    pub fn list_backups(directory: &Path) -> BackupResult<Vec<BackupArchive>> {
        if !directory.is_dir() {
            return Err(BackupError::InvalidArgument(format!(
                "Backup directory {} does not exist or is not a directory",
                directory.display()
            )));
        }

        let entries = fs::read_dir(directory).map_err(|e| {
            BackupError::Io(format!(
                "Failed to read backup directory {}: {}",
                directory.display(),
                e
            ))
        })?;

        let mut backups = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| {
                BackupError::Io(format!("Failed to read directory entry: {}", e))
            })?;

            let path = entry.path();
            if !is_archive_name(&path) {
                continue;
            }

            match entry.file_type() {
                Ok(file_type) if file_type.is_file() => {}
                _ => continue,
            }

            match BackupArchive::new(&path) {
                Ok(archive) => backups.push(archive),
                // Removed between the scan and the stat
                Err(e) if e.is_not_found() => {
                    tracing::debug!(path = %path.display(), "archive vanished during listing");
                }
                Err(e) => return Err(e),
            }
        }

        backups.sort_by(|a, b| {
            b.created()
                .cmp(&a.created())
                .then_with(|| a.path().cmp(b.path()))
        });

        Ok(backups)
    }

    /// The newest archive in `directory`, if any
    pub fn latest(directory: &Path) -> BackupResult<Option<BackupArchive>> {
        Ok(Self::list_backups(directory)?.into_iter().next())
    }

    /// Resolve an archive by file name inside `directory`
    pub fn find(directory: &Path, name: &str) -> BackupResult<BackupArchive> {
        let path = directory.join(name);
        if !is_archive_name(&path) {
            return Err(BackupError::backup_not_found(name));
        }
        BackupArchive::new(path)
    }
}
