//! Per-car temperature models.
//!
//! Each car gets twelve regressors, one per (tire, zone), fitted on
//! telemetry features labelled by the pit-lane ground truth that followed.
//!
//! ```text
//! SessionRecord[] ──► TrainingSet ──► 12 × Regressor ──► PerCarModel
//!   (oldest first)    (label windows)  (rayon, one per   (installed into
//!                                       tire/zone)        ModelRegistry)
//! ```
//!
//! Training is gated on a minimum amount of ground truth, and a new model
//! only replaces the installed one if its validation error is lower (unless
//! forced). A pass that is skipped or fails leaves the previously installed
//! model untouched. Samples synthesized from deleted sessions keep counting
//! as ground truth.
//!
//! # Example
//!
//! ```ignore
//! use tirecast::trainer::{ModelRegistry, ModelTrainer, SyntheticStore, TrainerConfig};
//!
//! let registry = ModelRegistry::open(models_dir);
//! let synthetic = SyntheticStore::open(synthetic_path);
//! let trainer = ModelTrainer::new(TrainerConfig::default());
//! let outcome = trainer.train_car(
//!     "porsche_992_gt3r",
//!     &records,
//!     &synthetic.samples_for_car("porsche_992_gt3r"),
//!     &registry,
//! );
//! ```

mod error;
mod features;
mod gbt;
mod model;
mod model_trainer;
mod regressor;
mod synthetic;

pub use error::{SkipReason, TrainingError, TrainingResult};
pub use features::{
    feature_matrix, FeatureTracker, DEFAULT_SMOOTHING_TAU_SECS, FEATURE_COUNT, FEATURE_NAMES,
    STINT_MINUTES_FEATURE,
};
pub use gbt::{BoostingParams, GradientBoostedTrees, LinearBaseline};
pub use model::{ModelMetadata, ModelRegistry, PerCarModel};
pub use model_trainer::{
    ModelTrainer, TrainerConfig, TrainingOutcome, TrainingSet, DEFAULT_LABEL_WINDOW_SECS,
    DEFAULT_MIN_GROUND_TRUTH, DEFAULT_VALIDATION_SPLIT,
};
pub use regressor::{Regressor, RegressorArtifact};
pub use synthetic::{
    select_representative, SyntheticSample, SyntheticSet, SyntheticStore, MAX_SYNTHETIC_SAMPLES,
};
