use anyhow::Result;
use clap::{Parser, Subcommand};

use backup_engine::backup::{ArchiveMetadata, BackupEngine, RestoreMarker};
use backup_engine::cli::{
    handle_backup_command, handle_config_command, report_restore_outcome, BackupCommands,
    ConfigCommands,
};
use backup_engine::config::{paths::AppPaths, settings::Settings};
use backup_engine::logging;

#[derive(Parser)]
#[command(
    name = "backup-engine",
    version,
    about = "Dated archive backups with retention and two-phase restore",
    long_about = "Snapshots application configuration and plugin data into dated \
                  zip archives, keeps a bounded number of them, and restores a \
                  chosen archive on the next start."
)]
struct Cli {
    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, global = true, env = "BACKUP_ENGINE_LOG", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Backup management commands
    #[command(subcommand)]
    Backup(BackupCommands),

    /// Show or change the configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level)?;

    let paths = AppPaths::new()?;

    // A queued restore must land before anything reads the data directory
    let mut engine = BackupEngine::new(
        RestoreMarker::new(paths.restore_marker()),
        ArchiveMetadata::new(),
    );
    // A restore that cannot be applied must not block the other commands
    match engine.apply_pending_restore(&paths.data_dir()) {
        Ok(outcome) => report_restore_outcome(&outcome),
        Err(e) => {
            tracing::warn!(error = %e, "queued restore not applied");
            eprintln!("Warning: queued restore could not be applied: {}", e);
        }
    }

    paths.ensure_directories()?;
    let mut settings = Settings::load_or_create(&paths)?;
    engine.set_components(settings.component_metadata());

    match cli.command {
        Some(Commands::Backup(cmd)) => {
            handle_backup_command(&engine, &paths, &settings, cmd)?;
        }
        Some(Commands::Config { command }) => {
            handle_config_command(
                &paths,
                &mut settings,
                command.unwrap_or(ConfigCommands::Show),
            )?;
        }
        None => {
            println!("backup-engine - dated archive backups with two-phase restore");
            println!();
            println!("Run 'backup-engine --help' for usage information.");
        }
    }

    Ok(())
}
