//! Tracing subscriber setup.
//!
//! Installs a console layer and, when a log directory is given, a daily
//! rolling file layer written through a non-blocking worker:
//!
//! ```text
//! tracing macros ──► EnvFilter ──┬──► fmt (stderr)
//!                                └──► fmt (no ANSI) ──► non_blocking ──► logs/tirecast.log.YYYY-MM-DD
//! ```
//!
//! `RUST_LOG` overrides the configured level when set.
//!
//! # Example
//!
//! ```ignore
//! use tirecast::logging::{init_logging, LoggingConfig};
//!
//! let _guard = init_logging(LoggingConfig::new("info").with_log_dir(logs_dir))?;
//! tracing::info!("ready");
//! // Keep _guard alive until exit or buffered file output is lost
//! ```

use std::path::PathBuf;

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::UtcOffset;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default log file prefix; the appender adds the date.
pub const DEFAULT_LOG_FILE_PREFIX: &str = "tirecast.log";

/// Errors installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level '{level}': {reason}")]
    InvalidLevel { level: String, reason: String },

    #[error("failed to create log directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("logging already initialized")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info` or `tirecast=debug`.
    pub level: String,

    /// Directory for rolling log files. `None` logs to the console only.
    pub log_dir: Option<PathBuf>,

    pub file_prefix: String,

    /// Write to stderr as well.
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            file_prefix: DEFAULT_LOG_FILE_PREFIX.to_string(),
            console: true,
        }
    }
}

impl LoggingConfig {
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Self::default()
        }
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }
}

/// Keeps the file writer flushing. Drop it last.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug)]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber.
pub fn init_logging(config: LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| LoggingError::InvalidLevel {
            level: config.level.clone(),
            reason: e.to_string(),
        })?,
    };

    // Local offsets are unavailable in some multi-threaded contexts
    let timer = OffsetTime::local_rfc_3339()
        .unwrap_or_else(|_| OffsetTime::new(UtcOffset::UTC, Rfc3339));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| LoggingError::Directory {
                path: dir.clone(),
                source: e,
            })?;
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_timer(timer.clone());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = config.console.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_timer(timer)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(LoggingGuard { _file: guard })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_builders() {
        let config = LoggingConfig::new("debug")
            .with_log_dir("/tmp/logs")
            .with_console(false);
        assert_eq!(config.level, "debug");
        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/logs")));
        assert!(!config.console);
        assert_eq!(config.file_prefix, DEFAULT_LOG_FILE_PREFIX);
    }

    #[test]
    fn test_init_creates_log_dir_once() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("logs");

        let guard = init_logging(
            LoggingConfig::new("info")
                .with_log_dir(&dir)
                .with_console(false),
        )
        .unwrap();
        assert!(dir.is_dir());

        let again = init_logging(LoggingConfig::default());
        assert!(matches!(again, Err(LoggingError::AlreadyInitialized(_))));
        drop(guard);
    }
}
