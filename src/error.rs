//! Error taxonomy for backup and restore invocations

use crate::config::ConfigError;

/// Failure of a single backup or restore invocation.
///
/// Everything except `Configuration` and `Precondition` can happen after the
/// origin container was stopped; those are still routed through finalize, so
/// by the time the caller sees them the origin has been started again. The
/// only exception is `OriginRestart`, which means it could not be.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Failed to stop container '{container}': {reason}")]
    WorkloadStop { container: String, reason: String },

    #[error("Failed to spawn temporary container from '{origin}': {reason}")]
    Spawn { origin: String, reason: String },

    #[error("Pack command failed (exit code {code:?}): {stderr}")]
    PackExecution { code: Option<i32>, stderr: String },

    #[error("Restore command failed (exit code {code:?}): {stderr}")]
    RestoreExecution { code: Option<i32>, stderr: String },

    #[error("Origin container '{container}' could not be started again: {reason}")]
    OriginRestart {
        container: String,
        reason: String,
        /// Error the invocation had already failed with before restart was attempted
        previous: Option<Box<BackupError>>,
    },

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackupError {
    /// Wrap a collaborator (encryption, access, consumer) failure
    pub fn transfer(err: impl std::fmt::Display) -> Self {
        BackupError::Transfer(err.to_string())
    }

    /// Whether this error leaves the origin container down
    pub fn is_origin_down(&self) -> bool {
        matches!(self, BackupError::OriginRestart { .. })
    }
}

impl From<ConfigError> for BackupError {
    fn from(err: ConfigError) -> Self {
        BackupError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
