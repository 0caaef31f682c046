//! Custom error types for the backup engine
//!
//! This module defines the error hierarchy for the engine using thiserror
//! for ergonomic error definitions.

use thiserror::Error;

/// The main error type for backup engine operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// Bad input: empty path, non-directory target, missing source
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Archive present but its metadata entry is missing or unreadable
    #[error("Invalid backup format: {0}")]
    InvalidFormat(String),

    /// Underlying read/write/close failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Referenced file no longer exists
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),
}

impl BackupError {
    /// Create a "not found" error for backup archives
    pub fn backup_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: identifier.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is an invalid format error
    pub fn is_invalid_format(&self) -> bool {
        matches!(self, Self::InvalidFormat(_))
    }

    /// Check if this is an invalid argument error
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for backup engine operations
pub type BackupResult<T> = Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BackupError::InvalidArgument("empty path".into());
        assert_eq!(err.to_string(), "Invalid argument: empty path");
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_not_found_error() {
        let err = BackupError::backup_not_found("backup-20250101-000000-000.zip");
        assert_eq!(
            err.to_string(),
            "Backup not found: backup-20250101-000000-000.zip"
        );
        assert!(err.is_not_found());
        assert!(!err.is_invalid_format());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: BackupError = io_err.into();
        assert!(matches!(err, BackupError::Io(_)));
    }
}
