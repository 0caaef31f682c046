//! User settings for the backup engine
//!
//! Owns the inputs the engine takes as plain parameters: whether automatic
//! backups are on, the target directory, the retention count, and the data
//! to include.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::paths::AppPaths;
use crate::backup::ArchiveMetadata;
use crate::error::BackupError;
use crate::storage::file_io::{read_json, write_json_atomic};

/// Backup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSettings {
    /// Whether automatic backups are enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Backup target directory; the default backup dir when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_dir: Option<PathBuf>,

    /// Maximum number of archives to keep (zero or less keeps all)
    #[serde(default = "default_retention_count")]
    pub retention_count: i64,

    /// Source roots inside the data directory, relative to it unless absolute
    #[serde(default = "default_sources")]
    pub sources: Vec<PathBuf>,
}

fn default_enabled() -> bool {
    true
}

fn default_retention_count() -> i64 {
    5
}

fn default_sources() -> Vec<PathBuf> {
    vec![PathBuf::from("cfg"), PathBuf::from("plugins")]
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            target_dir: None,
            retention_count: default_retention_count(),
            sources: default_sources(),
        }
    }
}

/// User settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Backup policy
    #[serde(default)]
    pub backup: BackupSettings,

    /// Installed components and their versions, recorded in every archive
    #[serde(default)]
    pub components: BTreeMap<String, String>,
}

impl Settings {
    /// Load settings from disk, or default settings if the file doesn't exist
    pub fn load_or_create(paths: &AppPaths) -> Result<Self, BackupError> {
        read_json(paths.settings_file())
    }

    /// Save settings to disk
    pub fn save(&self, paths: &AppPaths) -> Result<(), BackupError> {
        write_json_atomic(paths.settings_file(), self)
    }

    /// Set the retention count, storing any non-positive count as 0
    pub fn set_retention_count(&mut self, count: i64) {
        self.backup.retention_count = count.max(0);
    }

    /// Set the backup directory, or go back to the default with `None`
    ///
    /// The directory is stored as an absolute path. It need not exist yet,
    /// but must not be an existing file.
    pub fn set_backup_dir(&mut self, dir: Option<PathBuf>) -> Result<(), BackupError> {
        let Some(dir) = dir else {
            self.backup.target_dir = None;
            return Ok(());
        };

        if dir.as_os_str().is_empty() {
            return Err(BackupError::InvalidArgument(
                "Backup directory must not be empty".to_string(),
            ));
        }
        if dir.exists() && !dir.is_dir() {
            return Err(BackupError::InvalidArgument(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        self.backup.target_dir = Some(std::path::absolute(&dir)?);
        Ok(())
    }

    /// Effective backup directory
    pub fn backup_dir(&self, paths: &AppPaths) -> PathBuf {
        match &self.backup.target_dir {
            Some(dir) => dir.clone(),
            None => paths.default_backup_dir(),
        }
    }

    /// Source roots resolved against the data directory
    pub fn backup_sources(&self, paths: &AppPaths) -> Vec<PathBuf> {
        let data_dir = paths.data_dir();
        self.backup
            .sources
            .iter()
            .map(|source| data_dir.join(source))
            .collect()
    }

    /// Component record for new archives
    pub fn component_metadata(&self) -> ArchiveMetadata {
        let mut metadata = ArchiveMetadata::new();
        for (name, version) in &self.components {
            metadata.insert(name.as_str(), version.as_str());
        }
        metadata
    }
}
