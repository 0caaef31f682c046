//! Backup and restore engine
//!
//! Snapshots the application's persistent state into dated zip archives,
//! enforces a retention policy, and restores in two phases.
//!
//! # Architecture
//!
//! - `ArchiveMetadata`: the component-version record stored in every archive
//! - `BackupArchive`: one archive file and its attributes
//! - `BackupCatalog`: lists the archives in a directory, newest first
//! - `RestoreMarker`: persisted "restore this on next start" slot
//! - `BackupEngine`: creation, retention, queueing, and applying restores
//!
//! # Archive Format
//!
//! Archives are zip files named `backup-YYYYMMDD-HHMMSS-mmm.zip`. The entry
//! `cfg/plugin-versions.properties` holds `key=value` lines naming the
//! installed components and their versions; an archive without it is not a
//! valid backup. Every source is stored under its path relative to the data
//! directory.
//!
//! # Restore
//!
//! Live data cannot be replaced while the application runs. Queueing a
//! restore only writes the marker; the next process start calls
//! `apply_pending_restore` before anything else reads the data directory.
//! The archive is fully extracted and verified in a staging directory next
//! to the data directory before any live file is replaced.
//!
//! # Example
//!
//! ```rust,ignore
//! use backup_engine::backup::{ArchiveMetadata, BackupEngine, RestoreMarker};
//!
//! let engine = BackupEngine::new(RestoreMarker::new(marker_path), ArchiveMetadata::new());
//! engine.apply_pending_restore(&data_dir)?;
//!
//! let report = engine.create_backup(&data_dir, &[data_dir.join("cfg")], &backup_dir, 5)?;
//! engine.queue_restore(&report.archive)?;
//! ```

mod archive;
mod catalog;
mod engine;
mod marker;
mod metadata;
mod restore;
mod snapshot;

pub use archive::{ArchiveAttributes, BackupArchive};
pub use catalog::{archive_file_name, is_archive_name, BackupCatalog};
pub use engine::{BackupEngine, BackupReport, RestoreOutcome, CREATED_KEY, ENGINE_VERSION_KEY};
pub use marker::RestoreMarker;
pub use metadata::{ArchiveMetadata, METADATA_ENTRY};
