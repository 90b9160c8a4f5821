//! The INI configuration file.

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;
use tracing::debug;

use super::keys::ConfigKey;
use crate::collector::{CollectorConfig, DEFAULT_FLUSH_THRESHOLD, DEFAULT_SAMPLE_INTERVAL_SECS};
use crate::engine::{EngineConfig, LOGS_DIR};
use crate::logging::LoggingConfig;
use crate::predictor::{AdvisoryThresholds, CoordinatorConfig, LayerToggles, DEFAULT_MAX_VALIDATION_MAE};
use crate::storage::{StorageBudget, DEFAULT_BUDGET_MB, DEFAULT_RETENTION_COUNT};
use crate::trainer::{
    TrainerConfig, DEFAULT_LABEL_WINDOW_SECS, DEFAULT_MIN_GROUND_TRUTH, DEFAULT_VALIDATION_SPLIT,
};

/// Name of the directory under the home directory holding config and data.
pub const APP_DIR: &str = ".tirecast";

/// Configuration file name.
pub const CONFIG_FILE: &str = "config.ini";

/// Errors reading, writing or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// `~/.tirecast`, or `./.tirecast` without a home directory.
pub fn app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Default location of the configuration file.
pub fn config_file_path() -> PathBuf {
    app_dir().join(CONFIG_FILE)
}

/// Default data directory.
pub fn default_data_dir() -> PathBuf {
    app_dir().join("data")
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneralSettings {
    pub data_dir: PathBuf,
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageSettings {
    pub budget_mb: u64,
    pub retention_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectorSettings {
    pub sample_interval_secs: f64,
    pub flush_threshold: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSettings {
    pub min_ground_truth: usize,
    pub validation_split: f64,
    pub max_validation_mae: f64,
    pub label_window_secs: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionSettings {
    pub car_class_patterns: bool,
    pub track_patterns: bool,
    pub models: bool,
    pub critical_temp_f: f64,
    pub cold_temp_f: f64,
    pub imbalance_f: f64,
}

/// Parsed `config.ini`.
///
/// Every key is optional in the file; missing keys keep their defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub general: GeneralSettings,
    pub storage: StorageSettings,
    pub collector: CollectorSettings,
    pub training: TrainingSettings,
    pub prediction: PredictionSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let advisories = AdvisoryThresholds::default();
        Self {
            general: GeneralSettings {
                data_dir: default_data_dir(),
                log_level: "info".to_string(),
            },
            storage: StorageSettings {
                budget_mb: DEFAULT_BUDGET_MB,
                retention_count: DEFAULT_RETENTION_COUNT,
            },
            collector: CollectorSettings {
                sample_interval_secs: DEFAULT_SAMPLE_INTERVAL_SECS,
                flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            },
            training: TrainingSettings {
                min_ground_truth: DEFAULT_MIN_GROUND_TRUTH,
                validation_split: DEFAULT_VALIDATION_SPLIT,
                max_validation_mae: DEFAULT_MAX_VALIDATION_MAE,
                label_window_secs: DEFAULT_LABEL_WINDOW_SECS,
            },
            prediction: PredictionSettings {
                car_class_patterns: true,
                track_patterns: true,
                models: true,
                critical_temp_f: advisories.critical,
                cold_temp_f: advisories.cold,
                imbalance_f: advisories.imbalance,
            },
        }
    }
}

impl ConfigFile {
    /// Load from the default path. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_ini(&ini)
    }

    /// Parse INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|props| props.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            ini.with_section(Some(key.section()))
                .set(key.key_name(), key.get(self));
        }
        ini
    }

    /// Save to the default path.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        self.to_ini().write_to_file(path).map_err(write_err)
    }

    /// Logging to `<data_dir>/logs` at the configured level.
    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::new(self.general.log_level.clone())
            .with_log_dir(self.general.data_dir.join(LOGS_DIR))
    }

    /// Build the engine configuration these settings describe.
    pub fn to_engine_config(&self) -> EngineConfig {
        let collector = CollectorConfig::default()
            .with_sample_interval(self.collector.sample_interval_secs)
            .with_flush_threshold(self.collector.flush_threshold);

        let trainer = TrainerConfig::default()
            .with_min_ground_truth(self.training.min_ground_truth)
            .with_validation_split(self.training.validation_split)
            .with_label_window(self.training.label_window_secs);

        let coordinator = CoordinatorConfig::default()
            .with_max_validation_mae(self.training.max_validation_mae)
            .with_layers(LayerToggles {
                car_class_pattern: self.prediction.car_class_patterns,
                track_pattern: self.prediction.track_patterns,
                model: self.prediction.models,
            })
            .with_advisories(AdvisoryThresholds {
                critical: self.prediction.critical_temp_f,
                cold: self.prediction.cold_temp_f,
                imbalance: self.prediction.imbalance_f,
                ..AdvisoryThresholds::default()
            });

        EngineConfig::new(self.general.data_dir.clone())
            .with_collector(collector)
            .with_trainer(trainer)
            .with_coordinator(coordinator)
            .with_budget(StorageBudget::from_megabytes(
                self.storage.budget_mb,
                self.storage.retention_count,
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_keys_keep_defaults() {
        let config = ConfigFile::parse("[storage]\nbudget_mb = 250\n").unwrap();
        assert_eq!(config.storage.budget_mb, 250);
        assert_eq!(config.storage.retention_count, DEFAULT_RETENTION_COUNT);
        assert_eq!(config.training, ConfigFile::default().training);
    }

    #[test]
    fn test_collector_defaults_match_collector() {
        let config = ConfigFile::parse("[collector]\n").unwrap();
        assert_eq!(config.collector.sample_interval_secs, DEFAULT_SAMPLE_INTERVAL_SECS);
        assert_eq!(config.collector.flush_threshold, DEFAULT_FLUSH_THRESHOLD);

        let collector = CollectorConfig::default();
        assert_eq!(collector.sample_interval_secs, config.collector.sample_interval_secs);
        assert_eq!(collector.flush_threshold, config.collector.flush_threshold);
    }

    #[test]
    fn test_invalid_value_is_an_error() {
        let err = ConfigFile::parse("[training]\nmin_ground_truth = lots\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "training.min_ground_truth"));

        let err = ConfigFile::parse("[training]\nvalidation_split = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&temp.path().join("absent.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.general.data_dir = temp.path().join("data");
        config.prediction.models = false;
        config.collector.sample_interval_secs = 0.5;
        config.save_to(&path).unwrap();

        assert_eq!(ConfigFile::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_engine_config_reflects_settings() {
        let text = "\
[general]
data_dir = /var/lib/tirecast

[storage]
budget_mb = 10
retention_count = 1

[training]
min_ground_truth = 8

[prediction]
track_patterns = false
critical_temp_f = 240
";
        let engine = ConfigFile::parse(text).unwrap().to_engine_config();
        assert_eq!(engine.data_dir, PathBuf::from("/var/lib/tirecast"));
        assert_eq!(engine.budget.ceiling_bytes, 10 * 1024 * 1024);
        assert_eq!(engine.budget.retention_count, 1);
        assert_eq!(engine.trainer.min_ground_truth, 8);
        assert!(!engine.coordinator.layers.track_pattern);
        assert!(engine.coordinator.layers.model);
        assert_eq!(engine.coordinator.advisories.critical, 240.0);
    }

    #[test]
    fn test_logging_config_uses_data_dir() {
        let config = ConfigFile::parse("[general]\ndata_dir = /data\nlog_level = debug\n").unwrap();
        let logging = config.logging_config();
        assert_eq!(logging.level, "debug");
        assert_eq!(logging.log_dir, Some(PathBuf::from("/data/logs")));
    }
}
