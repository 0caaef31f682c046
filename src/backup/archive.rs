//! A single backup archive on disk

use std::fs;
use std::hash::{Hash, Hasher};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::metadata::ArchiveMetadata;
use crate::error::{BackupError, BackupResult};

/// Presentation attributes of an archive
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveAttributes {
    /// File name
    pub name: String,
    /// Last-modified time of the file
    pub created: DateTime<Utc>,
    /// Size in bytes
    pub size: u64,
}

/// One archive file plus its derived attributes
///
/// Identity is the absolute path. The metadata record is read on first
/// access and cached for the lifetime of the value.
#[derive(Debug)]
pub struct BackupArchive {
    path: PathBuf,
    created: DateTime<Utc>,
    size: u64,
    metadata: OnceLock<ArchiveMetadata>,
}

impl BackupArchive {
    /// Wrap an existing archive file
    ///
    /// Fails with `InvalidArgument` for an empty path and `NotFound` when
    /// nothing exists at `path`.
    pub fn new(path: impl AsRef<Path>) -> BackupResult<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(BackupError::InvalidArgument(
                "No backup file given".to_string(),
            ));
        }

        let path = std::path::absolute(path).map_err(|e| {
            BackupError::InvalidArgument(format!("Invalid backup path {}: {}", path.display(), e))
        })?;

        let meta = fs::metadata(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => BackupError::backup_not_found(path.display().to_string()),
            _ => BackupError::Io(format!("Failed to stat {}: {}", path.display(), e)),
        })?;

        if !meta.is_file() {
            return Err(BackupError::InvalidArgument(format!(
                "{} is not a file",
                path.display()
            )));
        }

        // Archives carry no internal timestamp; mtime stands in for creation time
        let created = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .map_err(|e| BackupError::Io(format!("Failed to read mtime of {}: {}", path.display(), e)))?;

        Ok(Self {
            path,
            created,
            size: meta.len(),
            metadata: OnceLock::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the archive
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Name, creation time, and size for presentation
    pub fn attributes(&self) -> ArchiveAttributes {
        ArchiveAttributes {
            name: self.name(),
            created: self.created,
            size: self.size,
        }
    }

    /// The archive's metadata record, loaded on first call
    pub fn metadata(&self) -> BackupResult<&ArchiveMetadata> {
        if let Some(metadata) = self.metadata.get() {
            return Ok(metadata);
        }
        let loaded = ArchiveMetadata::load(&self.path)?;
        Ok(self.metadata.get_or_init(|| loaded))
    }

    /// Whether the metadata record can be read
    pub fn is_valid(&self) -> bool {
        self.metadata().is_ok()
    }
}

impl PartialEq for BackupArchive {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for BackupArchive {}

impl Hash for BackupArchive {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}
