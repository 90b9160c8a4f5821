//! CLI error type.

use std::fmt;

use tirecast::artifact::ArtifactError;
use tirecast::config::ConfigError;
use tirecast::logging::LoggingError;
use tirecast::storage::StorageError;
use tirecast::trainer::TrainingError;

/// Errors reported to the user before exiting non-zero.
#[derive(Debug)]
pub enum CliError {
    Config(String),
    Logging(LoggingError),
    Storage(String),
    Training(TrainingError),
    SessionNotFound(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Storage(msg) => write!(f, "Storage error: {}", msg),
            CliError::Training(e) => write!(f, "Training failed: {}", e),
            CliError::SessionNotFound(id) => write!(
                f,
                "No stored session '{}'. Use 'tirecast stats' to list sessions.",
                id
            ),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<ArtifactError> for CliError {
    fn from(e: ArtifactError) -> Self {
        CliError::Storage(e.to_string())
    }
}

impl From<StorageError> for CliError {
    fn from(e: StorageError) -> Self {
        CliError::Storage(e.to_string())
    }
}

impl From<TrainingError> for CliError {
    fn from(e: TrainingError) -> Self {
        CliError::Training(e)
    }
}
