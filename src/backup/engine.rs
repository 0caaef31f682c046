//! Backup orchestration
//!
//! Ties together snapshot creation, retention pruning, and the two-phase
//! restore: an archive is queued now and applied by
//! [`BackupEngine::apply_pending_restore`] on the next process start, before
//! anything else touches the application data.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

use super::archive::BackupArchive;
use super::catalog::{archive_file_name, BackupCatalog, ARCHIVE_EXTENSION};
use super::marker::RestoreMarker;
use super::metadata::ArchiveMetadata;
use super::restore::extract_archive;
use super::snapshot::write_snapshot;
use crate::error::{BackupError, BackupResult};
use crate::storage::file_io::temp_path_for;

/// Metadata key recording the engine version that wrote an archive
pub const ENGINE_VERSION_KEY: &str = "backup-engine";

/// Metadata key recording when an archive was written
pub const CREATED_KEY: &str = "created";

/// Result of a successful [`BackupEngine::create_backup`]
#[derive(Debug)]
pub struct BackupReport {
    /// The archive just written
    pub archive: BackupArchive,
    /// Number of source files stored
    pub files: usize,
    /// Older archives removed by retention
    pub pruned: Vec<PathBuf>,
}

/// What [`BackupEngine::apply_pending_restore`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// No restore was queued
    NothingPending,
    /// The queued archive was extracted over the data directory
    Restored { archive: PathBuf, files: usize },
    /// The queued archive was missing, unreadable, or corrupt; the marker
    /// was dropped
    Discarded { archive: PathBuf, reason: String },
}

/// Orchestrates backup creation, retention, and restore
pub struct BackupEngine {
    marker: RestoreMarker,
    components: ArchiveMetadata,
    writer: Mutex<()>,
    restore_applied: AtomicBool,
    remove_file: fn(&Path) -> io::Result<()>,
}

impl BackupEngine {
    /// Create an engine
    ///
    /// `components` lists installed component names and versions; it is
    /// copied into the metadata entry of every new archive.
    pub fn new(marker: RestoreMarker, components: ArchiveMetadata) -> Self {
        Self {
            marker,
            components,
            writer: Mutex::new(()),
            restore_applied: AtomicBool::new(false),
            remove_file: |path| fs::remove_file(path),
        }
    }

    /// Use `remove_file` to delete pruned archives
    #[cfg(test)]
    fn with_remover(mut self, remove_file: fn(&Path) -> io::Result<()>) -> Self {
        self.remove_file = remove_file;
        self
    }

    pub fn marker(&self) -> &RestoreMarker {
        &self.marker
    }

    /// Replace the component record embedded in new archives
    ///
    /// Lets a caller apply a pending restore before its configuration is
    /// loaded and hand over the installed components afterwards.
    pub fn set_components(&mut self, components: ArchiveMetadata) {
        self.components = components;
    }

    /// Snapshot `sources` into a new archive in `target_dir`, then prune
    ///
    /// Every source must lie inside `data_dir`, the directory a later
    /// restore extracts into. `target_dir` is created if needed. A
    /// `retention_count` of zero or less disables pruning. Failures while
    /// pruning are logged and never fail the call.
    pub fn create_backup(
        &self,
        data_dir: &Path,
        sources: &[PathBuf],
        target_dir: &Path,
        retention_count: i64,
    ) -> BackupResult<BackupReport> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        if target_dir.as_os_str().is_empty() {
            return Err(BackupError::InvalidArgument(
                "No backup directory configured".to_string(),
            ));
        }

        for source in sources {
            if fs::symlink_metadata(source).is_err() {
                return Err(BackupError::InvalidArgument(format!(
                    "Backup source {} does not exist",
                    source.display()
                )));
            }
        }

        if target_dir.exists() && !target_dir.is_dir() {
            return Err(BackupError::InvalidArgument(format!(
                "{} is not a directory",
                target_dir.display()
            )));
        }

        fs::create_dir_all(target_dir).map_err(|e| {
            BackupError::Io(format!(
                "Failed to create backup directory {}: {}",
                target_dir.display(),
                e
            ))
        })?;

        let target_dir = std::path::absolute(target_dir)?;
        let data_dir = std::path::absolute(data_dir)?;
        let sources = sources
            .iter()
            .map(std::path::absolute)
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(outside) = sources.iter().find(|s| !s.starts_with(&data_dir)) {
            return Err(BackupError::InvalidArgument(format!(
                "Backup source {} is outside the data directory {}",
                outside.display(),
                data_dir.display()
            )));
        }

        let now = Utc::now();
        let path = unique_archive_path(&target_dir, now);
        let record = self.metadata_record(now);

        let files = write_snapshot(&path, &record, &data_dir, &sources, &target_dir)?;
        let archive = BackupArchive::new(&path)?;

        tracing::info!(
            archive = %archive.path().display(),
            files,
            size = archive.size(),
            "backup created"
        );

        let pruned = match self.prune_locked(&target_dir, retention_count, Some(&archive)) {
            Ok(pruned) => pruned,
            Err(e) => {
                tracing::warn!(dir = %target_dir.display(), error = %e, "retention skipped");
                Vec::new()
            }
        };

        Ok(BackupReport {
            archive,
            files,
            pruned,
        })
    }

    /// Apply retention to `target_dir` now
    pub fn prune(&self, target_dir: &Path, retention_count: i64) -> BackupResult<Vec<PathBuf>> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.prune_locked(target_dir, retention_count, None)
    }

    /// Keep the newest `retention_count` archives, `keep` counted first
    ///
    /// Each deletion stands alone: one failure is logged and the rest still
    /// proceed. Returns the paths actually removed.
    fn prune_locked(
        &self,
        target_dir: &Path,
        retention_count: i64,
        keep: Option<&BackupArchive>,
    ) -> BackupResult<Vec<PathBuf>> {
        if retention_count <= 0 {
            return Ok(Vec::new());
        }
        let limit = usize::try_from(retention_count).unwrap_or(usize::MAX);

        let backups = BackupCatalog::list_backups(target_dir)?;
        let ordered: Vec<&BackupArchive> = keep
            .into_iter()
            .chain(backups.iter().filter(|b| keep.map_or(true, |k| k != *b)))
            .collect();

        let mut deleted = Vec::new();
        for backup in ordered.into_iter().skip(limit) {
            match (self.remove_file)(backup.path()) {
                Ok(()) => {
                    tracing::info!(archive = %backup.path().display(), "pruned old backup");
                    deleted.push(backup.path().to_path_buf());
                }
                Err(e) => {
                    tracing::warn!(
                        archive = %backup.path().display(),
                        error = %e,
                        "failed to prune old backup"
                    );
                }
            }
        }

        Ok(deleted)
    }

    /// All archives in `target_dir`, newest first
    pub fn list_backups(&self, target_dir: &Path) -> BackupResult<Vec<BackupArchive>> {
        if target_dir.as_os_str().is_empty() {
            return Err(BackupError::InvalidArgument(
                "No backup directory configured".to_string(),
            ));
        }
        BackupCatalog::list_backups(target_dir)
    }

    /// The archive queued for restore, if it still exists
    pub fn current_restore(&self) -> BackupResult<Option<BackupArchive>> {
        let Some(path) = self.marker.current()? else {
            return Ok(None);
        };

        match BackupArchive::new(&path) {
            Ok(archive) => Ok(Some(archive)),
            Err(e) if e.is_not_found() || e.is_invalid_argument() => {
                tracing::debug!(archive = %path.display(), "queued backup no longer exists");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Queue `archive` to be restored on the next start
    ///
    /// The archive's metadata must be readable. Live data is not touched.
    pub fn queue_restore(&self, archive: &BackupArchive) -> BackupResult<()> {
        if !archive.path().is_file() {
            return Err(BackupError::backup_not_found(
                archive.path().display().to_string(),
            ));
        }

        archive.metadata()?;
        self.marker.mark(archive)?;

        tracing::info!(archive = %archive.path().display(), "backup queued for restore");
        Ok(())
    }

    /// Cancel a queued restore
    pub fn undo_restore(&self) {
        match self.marker.clear() {
            Ok(()) => tracing::info!("queued restore cancelled"),
            Err(e) => tracing::warn!(error = %e, "failed to remove restore marker"),
        }
    }

    /// Apply a queued restore to `data_dir`
    ///
    /// Must run once per process, before any other component opens files
    /// under `data_dir`. A marker that points at an archive that is missing,
    /// cannot be read, or is corrupt is dropped with a warning, and
    /// `data_dir` is left as it was. If moving the restored files into
    /// `data_dir` fails the marker stays so the restore is retried on the
    /// next start.
    pub fn apply_pending_restore(&self, data_dir: &Path) -> BackupResult<RestoreOutcome> {
        if self.restore_applied.swap(true, Ordering::SeqCst) {
            return Err(BackupError::InvalidArgument(
                "Pending restore has already been applied in this process".to_string(),
            ));
        }

        let Some(path) = self.marker.current()? else {
            return Ok(RestoreOutcome::NothingPending);
        };

        // Every failure on the archive side makes it unusable
        let archive = match BackupArchive::new(&path) {
            Ok(archive) => archive,
            Err(e) => return Ok(self.discard(path, e)),
        };
        if let Err(e) = archive.metadata() {
            return Ok(self.discard(path, e));
        }

        tracing::info!(
            archive = %archive.path().display(),
            data_dir = %data_dir.display(),
            "restoring backup"
        );

        match extract_archive(archive.path(), data_dir) {
            Ok(files) => {
                self.marker.clear()?;
                tracing::info!(archive = %archive.path().display(), files, "backup restored");
                Ok(RestoreOutcome::Restored {
                    archive: archive.path().to_path_buf(),
                    files,
                })
            }
            Err(e) if e.is_invalid_format() || e.is_not_found() => Ok(self.discard(path, e)),
            Err(e) => Err(e),
        }
    }

    fn discard(&self, archive: PathBuf, reason: BackupError) -> RestoreOutcome {
        tracing::warn!(
            archive = %archive.display(),
            reason = %reason,
            "discarding queued restore"
        );
        if let Err(e) = self.marker.clear() {
            tracing::warn!(error = %e, "failed to remove restore marker");
        }
        RestoreOutcome::Discarded {
            archive,
            reason: reason.to_string(),
        }
    }

    fn metadata_record(&self, now: DateTime<Utc>) -> ArchiveMetadata {
        let mut record = ArchiveMetadata::new();
        record.insert(ENGINE_VERSION_KEY, env!("CARGO_PKG_VERSION"));
        for (name, version) in self.components.iter() {
            record.insert(name, version);
        }
        record.insert(CREATED_KEY, now.to_rfc3339());
        record
    }
}

/// First free archive path for `now`, adding `-N` on collision
fn unique_archive_path(dir: &Path, now: DateTime<Utc>) -> PathBuf {
    let name = archive_file_name(now);
    let stem = name
        .strip_suffix(&format!(".{}", ARCHIVE_EXTENSION))
        .unwrap_or(&name)
        .to_string();

    let mut path = dir.join(&name);
    let mut n = 1;
    while path.exists() || temp_path_for(&path).exists() {
        path = dir.join(format!("{}-{}.{}", stem, n, ARCHIVE_EXTENSION));
        n += 1;
    }
    path
}
