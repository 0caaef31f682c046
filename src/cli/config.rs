//! Configuration CLI commands
//!
//! Shows the resolved paths and settings, and changes the backup policy.

use clap::Subcommand;
use std::path::PathBuf;

use crate::config::{paths::AppPaths, settings::Settings};
use crate::error::{BackupError, BackupResult};

/// Configuration commands
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration and paths
    Show,

    /// Change the backup settings and save them
    Set {
        /// Turn automatic backups on or off
        #[arg(long)]
        enabled: Option<bool>,

        /// Directory to write backups to
        #[arg(long, conflicts_with = "default_dir")]
        dir: Option<PathBuf>,

        /// Go back to the default backup directory
        #[arg(long)]
        default_dir: bool,

        /// Number of backups to keep (zero or less keeps all)
        #[arg(long, allow_negative_numbers = true)]
        retention: Option<i64>,
    },
}

/// Handle a config command
pub fn handle_config_command(
    paths: &AppPaths,
    settings: &mut Settings,
    cmd: ConfigCommands,
) -> BackupResult<()> {
    match cmd {
        ConfigCommands::Show => show(paths, settings),

        ConfigCommands::Set {
            enabled,
            dir,
            default_dir,
            retention,
        } => {
            if enabled.is_none() && dir.is_none() && !default_dir && retention.is_none() {
                return Err(BackupError::InvalidArgument(
                    "Nothing to change; see 'backup-engine config set --help'".to_string(),
                ));
            }

            if let Some(enabled) = enabled {
                settings.backup.enabled = enabled;
            }
            if default_dir {
                settings.set_backup_dir(None)?;
            } else if let Some(dir) = dir {
                settings.set_backup_dir(Some(dir))?;
            }
            if let Some(count) = retention {
                settings.set_retention_count(count);
            }

            settings.save(paths)?;
            tracing::info!(file = %paths.settings_file().display(), "settings saved");

            println!("Settings saved to {}", paths.settings_file().display());
            show(paths, settings);
        }
    }

    Ok(())
}

fn show(paths: &AppPaths, settings: &Settings) {
    println!("Backup Engine Configuration");
    println!("===========================");
    println!("Base directory:   {}", paths.base_dir().display());
    println!("Data directory:   {}", paths.data_dir().display());
    println!("Backup directory: {}", settings.backup_dir(paths).display());
    println!("Restore marker:   {}", paths.restore_marker().display());
    println!();
    println!("Settings:");
    println!("  Automatic backups: {}", settings.backup.enabled);
    if settings.backup.retention_count > 0 {
        println!("  Retention count:   {}", settings.backup.retention_count);
    } else {
        println!("  Retention count:   unlimited");
    }
    println!("  Sources:");
    for source in settings.backup_sources(paths) {
        println!("    {}", source.display());
    }
    if !settings.components.is_empty() {
        println!("  Components:");
        for (name, version) in &settings.components {
            println!("    {}: {}", name, version);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn set(
        enabled: Option<bool>,
        dir: Option<PathBuf>,
        default_dir: bool,
        retention: Option<i64>,
    ) -> ConfigCommands {
        ConfigCommands::Set {
            enabled,
            dir,
            default_dir,
            retention,
        }
    }

    #[test]
    fn test_set_saves_changes() {
        let temp = TempDir::new().unwrap();
        let paths = AppPaths::with_base_dir(temp.path().to_path_buf());
        let mut settings = Settings::default();

        handle_config_command(
            &paths,
            &mut settings,
            set(Some(false), Some(temp.path().join("archives")), false, Some(-7)),
        )
        .unwrap();

        let loaded = Settings::load_or_create(&paths).unwrap();
        assert!(!loaded.backup.enabled);
        assert_eq!(loaded.backup.retention_count, 0);
        assert_eq!(loaded.backup_dir(&paths), temp.path().join("archives"));
    }

    #[test]
    fn test_set_without_changes_is_rejected() {
        let temp = TempDir::new().unwrap();
        let paths = AppPaths::with_base_dir(temp.path().to_path_buf());
        let mut settings = Settings::default();

        let err = handle_config_command(&paths, &mut settings, set(None, None, false, None))
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(!paths.settings_file().exists());
    }

    #[test]
    fn test_set_rejects_file_as_backup_dir() {
        let temp = TempDir::new().unwrap();
        let paths = AppPaths::with_base_dir(temp.path().to_path_buf());
        let file = temp.path().join("file");
        std::fs::write(&file, "x").unwrap();
        let mut settings = Settings::default();

        let err = handle_config_command(&paths, &mut settings, set(None, Some(file), false, Some(3)))
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(!paths.settings_file().exists());
    }
}
