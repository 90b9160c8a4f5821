//! Training error types.

use thiserror::Error;

use crate::artifact::ArtifactError;

/// Result type for training operations.
pub type TrainingResult<T> = Result<T, TrainingError>;

/// Errors raised while fitting or installing a model.
///
/// None of these reach the live path: the trainer logs them and keeps the
/// previously installed model.
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("malformed features: {0}")]
    MalformedFeatures(String),

    #[error("training diverged for {regressor}: non-finite output")]
    Divergence { regressor: String },

    #[error("failed to persist model: {0}")]
    Persist(#[from] ArtifactError),

    #[error("failed to load recorded sessions: {0}")]
    Records(#[source] ArtifactError),
}

/// Why a training pass did not install a model.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Not enough pit-stop measurements for this car yet.
    InsufficientGroundTruth { have: usize, need: usize },

    /// Ground truth exists but no telemetry falls in any label window.
    NoTrainingRows,

    /// The new model validated no better than the installed one.
    NotBetter { current_mae: f64, candidate_mae: f64 },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::InsufficientGroundTruth { have, need } => {
                write!(f, "insufficient ground truth ({} of {})", have, need)
            }
            SkipReason::NoTrainingRows => write!(f, "no telemetry near any ground truth"),
            SkipReason::NotBetter {
                current_mae,
                candidate_mae,
            } => write!(
                f,
                "new model is not better (MAE {:.2}°F vs installed {:.2}°F)",
                candidate_mae, current_mae
            ),
        }
    }
}
