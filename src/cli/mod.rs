//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the backup engine.

pub mod backup;
pub mod config;

pub use backup::{handle_backup_command, report_restore_outcome, BackupCommands};
pub use config::{handle_config_command, ConfigCommands};
