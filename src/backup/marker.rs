//! Persisted "restore on next start" marker
//!
//! The marker is a single text file holding the absolute path of the archive
//! queued for restore. It is read back by a later, independent process, so
//! every write is synced before returning.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::archive::BackupArchive;
use crate::error::{BackupError, BackupResult};
use crate::storage::file_io::write_text_atomic;

/// Single-slot persisted restore marker
#[derive(Debug, Clone)]
pub struct RestoreMarker {
    path: PathBuf,
}

impl RestoreMarker {
    /// Use the marker file at `path`
    ///
    /// The file belongs outside every backup target directory.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the marker file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue `archive` for restore, replacing any previous marker
    pub fn mark(&self, archive: &BackupArchive) -> BackupResult<()> {
        let target = archive.path().to_str().ok_or_else(|| {
            BackupError::InvalidArgument(format!(
                "Backup path {} is not valid UTF-8",
                archive.path().display()
            ))
        })?;

        write_text_atomic(&self.path, &format!("{}\n", target))?;
        tracing::debug!(marker = %self.path.display(), archive = target, "restore marker written");
        Ok(())
    }

    /// The queued archive path, if any
    ///
    /// The path is returned even if the file it names no longer exists.
    pub fn current(&self) -> BackupResult<Option<PathBuf>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BackupError::Io(format!(
                    "Failed to read restore marker {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        // Only the line ending is ours; spaces may be part of the path
        let line = contents.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(PathBuf::from(line)))
        }
    }

    /// Remove the marker; a no-op if there is none
    pub fn clear(&self) -> BackupResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BackupError::Io(format!(
                "Failed to remove restore marker {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}
