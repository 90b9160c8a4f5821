//! User configuration stored in `~/.tirecast/config.ini`.
//!
//! ```ini
//! [general]
//! data_dir = ~/.tirecast/data
//! log_level = info
//!
//! [storage]
//! budget_mb = 100
//! retention_count = 3
//!
//! [collector]
//! sample_interval_secs = 1.0
//! flush_threshold = 600
//!
//! [training]
//! min_ground_truth = 5
//! validation_split = 0.2
//! max_validation_mae = 25.0
//! label_window_secs = 120
//!
//! [prediction]
//! car_class_patterns = true
//! track_patterns = true
//! models = true
//! critical_temp_f = 230
//! cold_temp_f = 150
//! imbalance_f = 15
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tirecast::config::ConfigFile;
//!
//! let config = ConfigFile::load()?;
//! let engine = TireEngine::start(config.to_engine_config()).await?;
//! ```

mod file;
mod keys;

pub use file::{
    app_dir, config_file_path, default_data_dir, expand_home, CollectorSettings, ConfigError,
    ConfigFile, GeneralSettings, PredictionSettings, StorageSettings, TrainingSettings, APP_DIR,
    CONFIG_FILE,
};
pub use keys::ConfigKey;
