//! Engine configuration and data directory layout.

use std::path::{Path, PathBuf};

use crate::collector::CollectorConfig;
use crate::physics::PhysicsConfig;
use crate::predictor::CoordinatorConfig;
use crate::storage::StorageBudget;
use crate::trainer::TrainerConfig;

/// Default capacity of the live-path sample channel.
pub const DEFAULT_SAMPLE_CHANNEL_CAPACITY: usize = 1024;

/// Directory holding session segments.
pub const SESSIONS_DIR: &str = "sessions";

/// Directory holding per-car models.
pub const MODELS_DIR: &str = "models";

/// Directory holding the pattern snapshot.
pub const PATTERNS_DIR: &str = "patterns";

/// Pattern snapshot file name.
pub const PATTERNS_FILE: &str = "patterns.tpa";

/// Synthesized training samples file name, kept beside the patterns.
pub const SYNTHETIC_FILE: &str = "synthesized.tsy";

/// Directory holding log files.
pub const LOGS_DIR: &str = "logs";

/// Everything needed to start a [`super::TireEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root of all persisted data.
    pub data_dir: PathBuf,

    pub physics: PhysicsConfig,
    pub collector: CollectorConfig,
    pub trainer: TrainerConfig,
    pub coordinator: CoordinatorConfig,
    pub budget: StorageBudget,

    /// Samples buffered between the live path and the collector.
    pub sample_channel_capacity: usize,
}

impl EngineConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            physics: PhysicsConfig::default(),
            collector: CollectorConfig::default(),
            trainer: TrainerConfig::default(),
            coordinator: CoordinatorConfig::default(),
            budget: StorageBudget::default(),
            sample_channel_capacity: DEFAULT_SAMPLE_CHANNEL_CAPACITY,
        }
    }

    pub fn with_collector(mut self, collector: CollectorConfig) -> Self {
        self.collector = collector;
        self
    }

    pub fn with_trainer(mut self, trainer: TrainerConfig) -> Self {
        self.trainer = trainer;
        self
    }

    pub fn with_coordinator(mut self, coordinator: CoordinatorConfig) -> Self {
        self.coordinator = coordinator;
        self
    }

    pub fn with_budget(mut self, budget: StorageBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_sample_channel_capacity(mut self, capacity: usize) -> Self {
        self.sample_channel_capacity = capacity.max(1);
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join(SESSIONS_DIR)
    }

    pub fn models_dir(&self) -> PathBuf {
        self.data_dir.join(MODELS_DIR)
    }

    pub fn patterns_path(&self) -> PathBuf {
        self.data_dir.join(PATTERNS_DIR).join(PATTERNS_FILE)
    }

    pub fn synthetic_path(&self) -> PathBuf {
        self.data_dir.join(PATTERNS_DIR).join(SYNTHETIC_FILE)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join(LOGS_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let config = EngineConfig::new("/data");
        assert_eq!(config.sessions_dir(), PathBuf::from("/data/sessions"));
        assert_eq!(config.models_dir(), PathBuf::from("/data/models"));
        assert_eq!(
            config.patterns_path(),
            PathBuf::from("/data/patterns/patterns.tpa")
        );
        assert_eq!(
            config.synthetic_path(),
            PathBuf::from("/data/patterns/synthesized.tsy")
        );
        assert_eq!(config.logs_dir(), PathBuf::from("/data/logs"));
    }

    #[test]
    fn test_channel_capacity_is_positive() {
        let config = EngineConfig::new("/data").with_sample_channel_capacity(0);
        assert_eq!(config.sample_channel_capacity, 1);
    }
}
