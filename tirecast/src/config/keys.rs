//! Addressable configuration keys (`section.key`).

use std::str::FromStr;

use super::file::{expand_home, ConfigError, ConfigFile};

/// Every setting in `config.ini`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    GeneralDataDir,
    GeneralLogLevel,
    StorageBudgetMb,
    StorageRetentionCount,
    CollectorSampleIntervalSecs,
    CollectorFlushThreshold,
    TrainingMinGroundTruth,
    TrainingValidationSplit,
    TrainingMaxValidationMae,
    TrainingLabelWindowSecs,
    PredictionCarClassPatterns,
    PredictionTrackPatterns,
    PredictionModels,
    PredictionCriticalTempF,
    PredictionColdTempF,
    PredictionImbalanceF,
}

const ALL_KEYS: [ConfigKey; 16] = [
    ConfigKey::GeneralDataDir,
    ConfigKey::GeneralLogLevel,
    ConfigKey::StorageBudgetMb,
    ConfigKey::StorageRetentionCount,
    ConfigKey::CollectorSampleIntervalSecs,
    ConfigKey::CollectorFlushThreshold,
    ConfigKey::TrainingMinGroundTruth,
    ConfigKey::TrainingValidationSplit,
    ConfigKey::TrainingMaxValidationMae,
    ConfigKey::TrainingLabelWindowSecs,
    ConfigKey::PredictionCarClassPatterns,
    ConfigKey::PredictionTrackPatterns,
    ConfigKey::PredictionModels,
    ConfigKey::PredictionCriticalTempF,
    ConfigKey::PredictionColdTempF,
    ConfigKey::PredictionImbalanceF,
];

impl ConfigKey {
    /// All keys in file order.
    pub fn all() -> &'static [ConfigKey] {
        &ALL_KEYS
    }

    pub fn section(&self) -> &'static str {
        match self {
            ConfigKey::GeneralDataDir | ConfigKey::GeneralLogLevel => "general",
            ConfigKey::StorageBudgetMb | ConfigKey::StorageRetentionCount => "storage",
            ConfigKey::CollectorSampleIntervalSecs | ConfigKey::CollectorFlushThreshold => {
                "collector"
            }
            ConfigKey::TrainingMinGroundTruth
            | ConfigKey::TrainingValidationSplit
            | ConfigKey::TrainingMaxValidationMae
            | ConfigKey::TrainingLabelWindowSecs => "training",
            ConfigKey::PredictionCarClassPatterns
            | ConfigKey::PredictionTrackPatterns
            | ConfigKey::PredictionModels
            | ConfigKey::PredictionCriticalTempF
            | ConfigKey::PredictionColdTempF
            | ConfigKey::PredictionImbalanceF => "prediction",
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            ConfigKey::GeneralDataDir => "data_dir",
            ConfigKey::GeneralLogLevel => "log_level",
            ConfigKey::StorageBudgetMb => "budget_mb",
            ConfigKey::StorageRetentionCount => "retention_count",
            ConfigKey::CollectorSampleIntervalSecs => "sample_interval_secs",
            ConfigKey::CollectorFlushThreshold => "flush_threshold",
            ConfigKey::TrainingMinGroundTruth => "min_ground_truth",
            ConfigKey::TrainingValidationSplit => "validation_split",
            ConfigKey::TrainingMaxValidationMae => "max_validation_mae",
            ConfigKey::TrainingLabelWindowSecs => "label_window_secs",
            ConfigKey::PredictionCarClassPatterns => "car_class_patterns",
            ConfigKey::PredictionTrackPatterns => "track_patterns",
            ConfigKey::PredictionModels => "models",
            ConfigKey::PredictionCriticalTempF => "critical_temp_f",
            ConfigKey::PredictionColdTempF => "cold_temp_f",
            ConfigKey::PredictionImbalanceF => "imbalance_f",
        }
    }

    /// `section.key`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as it would be written to the file.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            ConfigKey::GeneralDataDir => config.general.data_dir.display().to_string(),
            ConfigKey::GeneralLogLevel => config.general.log_level.clone(),
            ConfigKey::StorageBudgetMb => config.storage.budget_mb.to_string(),
            ConfigKey::StorageRetentionCount => config.storage.retention_count.to_string(),
            ConfigKey::CollectorSampleIntervalSecs => {
                config.collector.sample_interval_secs.to_string()
            }
            ConfigKey::CollectorFlushThreshold => config.collector.flush_threshold.to_string(),
            ConfigKey::TrainingMinGroundTruth => config.training.min_ground_truth.to_string(),
            ConfigKey::TrainingValidationSplit => config.training.validation_split.to_string(),
            ConfigKey::TrainingMaxValidationMae => config.training.max_validation_mae.to_string(),
            ConfigKey::TrainingLabelWindowSecs => config.training.label_window_secs.to_string(),
            ConfigKey::PredictionCarClassPatterns => {
                config.prediction.car_class_patterns.to_string()
            }
            ConfigKey::PredictionTrackPatterns => config.prediction.track_patterns.to_string(),
            ConfigKey::PredictionModels => config.prediction.models.to_string(),
            ConfigKey::PredictionCriticalTempF => config.prediction.critical_temp_f.to_string(),
            ConfigKey::PredictionColdTempF => config.prediction.cold_temp_f.to_string(),
            ConfigKey::PredictionImbalanceF => config.prediction.imbalance_f.to_string(),
        }
    }

    /// Parse and validate `value`, then store it.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match self {
            ConfigKey::GeneralDataDir => {
                if value.is_empty() {
                    return Err(self.invalid(value, "must not be empty"));
                }
                config.general.data_dir = expand_home(value);
            }
            ConfigKey::GeneralLogLevel => {
                if value.is_empty() {
                    return Err(self.invalid(value, "must not be empty"));
                }
                config.general.log_level = value.to_string();
            }
            ConfigKey::StorageBudgetMb => config.storage.budget_mb = self.parse(value)?,
            ConfigKey::StorageRetentionCount => config.storage.retention_count = self.parse(value)?,
            ConfigKey::CollectorSampleIntervalSecs => {
                config.collector.sample_interval_secs = self.positive(value)?
            }
            ConfigKey::CollectorFlushThreshold => {
                config.collector.flush_threshold = self.at_least_one(value)?
            }
            ConfigKey::TrainingMinGroundTruth => {
                config.training.min_ground_truth = self.at_least_one(value)?
            }
            ConfigKey::TrainingValidationSplit => {
                let split: f64 = self.parse(value)?;
                if !(0.0..=0.9).contains(&split) {
                    return Err(self.invalid(value, "must be between 0 and 0.9"));
                }
                config.training.validation_split = split;
            }
            ConfigKey::TrainingMaxValidationMae => {
                config.training.max_validation_mae = self.positive(value)?
            }
            ConfigKey::TrainingLabelWindowSecs => {
                config.training.label_window_secs = self.positive(value)?
            }
            ConfigKey::PredictionCarClassPatterns => {
                config.prediction.car_class_patterns = self.parse(value)?
            }
            ConfigKey::PredictionTrackPatterns => {
                config.prediction.track_patterns = self.parse(value)?
            }
            ConfigKey::PredictionModels => config.prediction.models = self.parse(value)?,
            ConfigKey::PredictionCriticalTempF => {
                config.prediction.critical_temp_f = self.finite(value)?
            }
            ConfigKey::PredictionColdTempF => config.prediction.cold_temp_f = self.finite(value)?,
            ConfigKey::PredictionImbalanceF => config.prediction.imbalance_f = self.positive(value)?,
        }
        Ok(())
    }

    fn invalid(&self, value: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    fn parse<T>(&self, value: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        value.parse().map_err(|e: T::Err| self.invalid(value, e.to_string()))
    }

    fn finite(&self, value: &str) -> Result<f64, ConfigError> {
        let parsed: f64 = self.parse(value)?;
        if !parsed.is_finite() {
            return Err(self.invalid(value, "must be a finite number"));
        }
        Ok(parsed)
    }

    fn positive(&self, value: &str) -> Result<f64, ConfigError> {
        let parsed = self.finite(value)?;
        if parsed <= 0.0 {
            return Err(self.invalid(value, "must be greater than zero"));
        }
        Ok(parsed)
    }

    fn at_least_one(&self, value: &str) -> Result<usize, ConfigError> {
        let parsed: usize = self.parse(value)?;
        if parsed == 0 {
            return Err(self.invalid(value, "must be at least 1"));
        }
        Ok(parsed)
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == s)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

impl std::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for key in ConfigKey::all() {
            assert_eq!(key.name().parse::<ConfigKey>().unwrap(), *key);
        }
        assert!(matches!(
            "storage.nope".parse::<ConfigKey>(),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_set_validates() {
        let mut config = ConfigFile::default();
        ConfigKey::StorageBudgetMb.set(&mut config, "64").unwrap();
        assert_eq!(config.storage.budget_mb, 64);

        assert!(ConfigKey::CollectorFlushThreshold.set(&mut config, "0").is_err());
        assert!(ConfigKey::CollectorSampleIntervalSecs.set(&mut config, "-1").is_err());
        assert!(ConfigKey::PredictionModels.set(&mut config, "maybe").is_err());
        assert!(ConfigKey::PredictionColdTempF.set(&mut config, "NaN").is_err());
    }

    #[test]
    fn test_data_dir_expands_home() {
        let mut config = ConfigFile::default();
        ConfigKey::GeneralDataDir
            .set(&mut config, "~/racing/tirecast")
            .unwrap();
        if let Some(home) = dirs::home_dir() {
            assert_eq!(config.general.data_dir, home.join("racing/tirecast"));
        }
    }
}
