//! Backup CLI commands
//!
//! Implements CLI commands for backup management.

use clap::Subcommand;
use std::path::{Path, PathBuf};

use crate::backup::{BackupArchive, BackupCatalog, BackupEngine, RestoreOutcome};
use crate::config::paths::AppPaths;
use crate::config::settings::Settings;
use crate::error::{BackupError, BackupResult};

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Create a new backup now
    Create,

    /// Create a backup only if automatic backups are enabled
    Auto,

    /// List all available backups
    List {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,

        /// Print the list as JSON
        #[arg(long, conflicts_with = "verbose")]
        json: bool,
    },

    /// Show information about a specific backup
    Info {
        /// Backup filename or path (use 'latest' for most recent)
        backup: String,
    },

    /// Queue a backup to be restored on the next start
    Restore {
        /// Backup filename or path (use 'latest' for most recent)
        backup: String,
    },

    /// Cancel the queued restore
    Undo,

    /// Show the backup queued for restore
    Pending,

    /// Delete old backups according to the retention count
    Prune,
}

/// Handle a backup command
pub fn handle_backup_command(
    engine: &BackupEngine,
    paths: &AppPaths,
    settings: &Settings,
    cmd: BackupCommands,
) -> BackupResult<()> {
    let backup_dir = settings.backup_dir(paths);
    let retention = settings.backup.retention_count;

    match cmd {
        BackupCommands::Create => create(engine, paths, settings, &backup_dir)?,

        BackupCommands::Auto => {
            if settings.backup.enabled {
                create(engine, paths, settings, &backup_dir)?;
            } else {
                println!("Automatic backups are disabled.");
            }
        }

        BackupCommands::List { verbose, json } => {
            let backups = list_or_empty(engine, &backup_dir)?;

            if json {
                let attributes: Vec<_> = backups.iter().map(|b| b.attributes()).collect();
                println!("{}", serde_json::to_string_pretty(&attributes)?);
                return Ok(());
            }

            if backups.is_empty() {
                println!("No backups found in {}.", backup_dir.display());
                println!("Create one with: backup-engine backup create");
                return Ok(());
            }

            println!("Available Backups");
            println!("=================");
            println!();

            for (i, backup) in backups.iter().enumerate() {
                let age = chrono::Utc::now().signed_duration_since(backup.created());

                if verbose {
                    println!(
                        "{}. {}\n   Created: {}\n   Size: {}\n   Age: {}\n   Valid: {}\n",
                        i + 1,
                        backup.name(),
                        backup.created().format("%Y-%m-%d %H:%M:%S UTC"),
                        format_size(backup.size()),
                        format_duration(age),
                        if backup.is_valid() { "yes" } else { "no" },
                    );
                } else {
                    println!(
                        "  {}. {} ({} ago, {})",
                        i + 1,
                        backup.name(),
                        format_duration(age),
                        format_size(backup.size()),
                    );
                }
            }

            println!();
            println!("Total: {} backup(s)", backups.len());
        }

        BackupCommands::Info { backup } => {
            let archive = resolve_backup(&backup_dir, &backup)?;

            println!("Backup Details");
            println!("==============");
            println!("File: {}", archive.path().display());
            println!("Size: {}", format_size(archive.size()));
            println!(
                "Created: {}",
                archive.created().format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!();

            match archive.metadata() {
                Ok(metadata) => {
                    println!("Components:");
                    for (name, version) in metadata.iter() {
                        println!("  {}: {}", name, version);
                    }
                    println!();
                    println!("Status: Valid");
                }
                Err(e) if e.is_invalid_format() => {
                    println!("Status: Invalid ({})", e);
                }
                Err(e) => return Err(e),
            }
        }

        BackupCommands::Restore { backup } => {
            let archive = resolve_backup(&backup_dir, &backup)?;
            engine.queue_restore(&archive)?;

            println!("Backup queued for restore: {}", archive.name());
            println!("It will be applied the next time the application starts.");
            println!("To cancel, run: backup-engine backup undo");
        }

        BackupCommands::Undo => {
            engine.undo_restore();
            println!("Queued restore cancelled.");
        }

        BackupCommands::Pending => match engine.current_restore()? {
            Some(archive) => println!("Queued for restore: {}", archive.name()),
            None => println!("No restore queued."),
        },

        BackupCommands::Prune => {
            if retention <= 0 {
                println!("Retention is unlimited; nothing to prune.");
                return Ok(());
            }
            let deleted = engine.prune(&backup_dir, retention)?;
            println!(
                "Deleted {} backup(s), keeping at most {}.",
                deleted.len(),
                retention
            );
        }
    }

    Ok(())
}

/// Report what the startup restore did
pub fn report_restore_outcome(outcome: &RestoreOutcome) {
    match outcome {
        RestoreOutcome::NothingPending => {}
        RestoreOutcome::Restored { archive, files } => {
            println!(
                "Restored backup {} ({} file(s)).",
                archive.display(),
                files
            );
        }
        RestoreOutcome::Discarded { archive, reason } => {
            eprintln!(
                "Warning: queued backup {} could not be restored and was dropped: {}",
                archive.display(),
                reason
            );
        }
    }
}

fn create(
    engine: &BackupEngine,
    paths: &AppPaths,
    settings: &Settings,
    backup_dir: &Path,
) -> BackupResult<()> {
    println!("Creating backup...");
    let report = engine.create_backup(
        &paths.data_dir(),
        &settings.backup_sources(paths),
        backup_dir,
        settings.backup.retention_count,
    )?;

    println!("Backup created: {}", report.archive.name());
    println!("Location: {}", report.archive.path().display());
    println!(
        "Files: {}, size: {}",
        report.files,
        format_size(report.archive.size())
    );
    if !report.pruned.is_empty() {
        println!("Pruned {} old backup(s).", report.pruned.len());
    }
    Ok(())
}

/// A backup directory that was never created has no backups yet
fn list_or_empty(engine: &BackupEngine, backup_dir: &Path) -> BackupResult<Vec<BackupArchive>> {
    if !backup_dir.exists() {
        return Ok(Vec::new());
    }
    engine.list_backups(backup_dir)
}

/// Resolve a backup identifier to an archive
fn resolve_backup(backup_dir: &Path, backup: &str) -> BackupResult<BackupArchive> {
    if backup.eq_ignore_ascii_case("latest") {
        if !backup_dir.exists() {
            return Err(BackupError::backup_not_found("latest"));
        }
        return BackupCatalog::latest(backup_dir)?
            .ok_or_else(|| BackupError::backup_not_found("latest"));
    }

    // Check if it's a full path
    let path = PathBuf::from(backup);
    if path.is_file() {
        return BackupArchive::new(path);
    }

    // Check if it's a filename in the backup directory, with or without extension
    for candidate in [backup.to_string(), format!("{}.zip", backup)] {
        match BackupCatalog::find(backup_dir, &candidate) {
            Ok(archive) => return Ok(archive),
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e),
        }
    }

    Err(BackupError::backup_not_found(backup))
}

/// Format a duration in human-readable form
fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    format!("{}mo", days / 30)
}

/// Format a file size in human-readable form
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(chrono::Duration::seconds(42)), "42s");
        assert_eq!(format_duration(chrono::Duration::minutes(90)), "1h");
        assert_eq!(format_duration(chrono::Duration::days(3)), "3d");
        assert_eq!(format_duration(chrono::Duration::days(65)), "2mo");
    }

    #[test]
    fn test_resolve_backup_by_name_and_stem() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("backup-x.zip"), "x").unwrap();

        assert_eq!(
            resolve_backup(temp.path(), "backup-x.zip").unwrap().name(),
            "backup-x.zip"
        );
        assert_eq!(
            resolve_backup(temp.path(), "backup-x").unwrap().name(),
            "backup-x.zip"
        );
        assert!(resolve_backup(temp.path(), "backup-y")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_resolve_latest_without_backups() {
        let temp = TempDir::new().unwrap();
        assert!(resolve_backup(&temp.path().join("missing"), "latest")
            .unwrap_err()
            .is_not_found());
    }
}
