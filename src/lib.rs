//! Backup engine - dated archive backups with two-phase restore
//!
//! This library snapshots an application's persistent state (configuration
//! plus installed-plugin data) into dated zip archives, enforces a retention
//! policy, and restores in two phases: an archive is queued now and applied
//! on the next process start.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `backup`: Archives, catalog, restore marker, and the engine
//! - `config`: Configuration and path management
//! - `error`: Custom error types
//! - `storage`: Atomic file writes
//! - `cli`: Command handlers for the `backup-engine` binary
//! - `logging`: tracing subscriber setup
//!
//! # Example
//!
//! ```rust,ignore
//! use backup_engine::backup::{BackupEngine, RestoreMarker};
//! use backup_engine::config::{paths::AppPaths, settings::Settings};
//!
//! let paths = AppPaths::new()?;
//! let mut engine = BackupEngine::new(RestoreMarker::new(paths.restore_marker()), Default::default());
//! engine.apply_pending_restore(&paths.data_dir())?;
//!
//! let settings = Settings::load_or_create(&paths)?;
//! engine.set_components(settings.component_metadata());
//! ```

pub mod backup;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod storage;

pub use error::{BackupError, BackupResult};
