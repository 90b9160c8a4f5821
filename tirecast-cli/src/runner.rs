//! Shared setup for commands that touch the data directory.

use tirecast::collector::SessionStore;
use tirecast::config::ConfigFile;
use tirecast::engine::EngineConfig;
use tirecast::logging::{init_logging, LoggingGuard};
use tirecast::patterns::PatternLearner;
use tirecast::trainer::{ModelRegistry, SyntheticStore};
use tracing::info;

use crate::error::CliError;

/// Loads configuration and installs file logging for one command run.
pub struct CliRunner {
    config: ConfigFile,
    engine: EngineConfig,
    _logging: LoggingGuard,
}

impl CliRunner {
    /// `verbose` mirrors log output to stderr at debug level.
    pub fn new(verbose: bool) -> Result<Self, CliError> {
        let config = ConfigFile::load()?;
        let mut logging = config.logging_config().with_console(verbose);
        if verbose {
            logging.level = "debug".to_string();
        }
        let guard = init_logging(logging)?;

        Ok(Self {
            engine: config.to_engine_config(),
            config,
            _logging: guard,
        })
    }

    pub fn log_startup(&self, command: &str) {
        info!(
            version = tirecast::VERSION,
            command = command,
            data_dir = %self.engine.data_dir.display(),
            "tirecast CLI"
        );
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn store(&self) -> SessionStore {
        SessionStore::new(self.engine.sessions_dir())
    }

    pub fn learner(&self) -> PatternLearner {
        PatternLearner::open(self.engine.patterns_path())
    }

    pub fn registry(&self) -> ModelRegistry {
        ModelRegistry::open(self.engine.models_dir())
    }

    pub fn synthetic(&self) -> SyntheticStore {
        SyntheticStore::open(self.engine.synthetic_path())
    }
}
