//! Unified error hierarchy for the load engine
//!
//! Module errors convert into [`TrainLoadError`], which carries a severity
//! for logging and a user-facing message for the CLI.

use crate::database::DatabaseError;
use crate::import::ImportError;
use crate::pmc::PmcError;
use crate::repository::RepositoryError;
use thiserror::Error;

/// Top-level error type for engine operations
#[derive(Debug, Error)]
pub enum TrainLoadError {
    /// Caller broke an input contract (bad range, zero-day window, unknown athlete)
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("PMC error: {0}")]
    Pmc(#[from] PmcError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, TrainLoadError>;

impl TrainLoadError {
    /// How loudly the CLI should log this failure
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TrainLoadError::Validation(_) => ErrorSeverity::Warning,
            TrainLoadError::Import(_) => ErrorSeverity::Warning,
            TrainLoadError::Repository(RepositoryError::AthleteNotFound(_))
            | TrainLoadError::Repository(RepositoryError::SessionNotFound(_))
            | TrainLoadError::Repository(RepositoryError::InvalidQuery(_)) => ErrorSeverity::Warning,
            TrainLoadError::Pmc(PmcError::InsufficientData(_)) => ErrorSeverity::Info,
            TrainLoadError::Database(DatabaseError::LockPoisoned) => ErrorSeverity::Critical,
            TrainLoadError::Internal(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Message printed to the terminal; falls back to `Display`
    pub fn user_message(&self) -> String {
        match self {
            TrainLoadError::Repository(RepositoryError::AthleteNotFound(id)) => {
                format!("No athlete named '{}'. Import sessions or set thresholds first.", id)
            }
            TrainLoadError::Import(ImportError::InvalidRow { line, reason }) => {
                format!("Import stopped at line {}: {}", line, reason)
            }
            TrainLoadError::Import(ImportError::UnsupportedFormat(path)) => {
                format!("Cannot import {}: only CSV files are supported", path.display())
            }
            TrainLoadError::Database(_) | TrainLoadError::Repository(RepositoryError::Database(_)) => {
                "The session database could not be opened or queried. Check settings.database_path in config.toml.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Log weight of a [`TrainLoadError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Storage or engine state can no longer be trusted
    Critical,
    Error,
    /// The request was wrong, not the engine
    Warning,
    Info,
}

impl ErrorSeverity {
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical | ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}
