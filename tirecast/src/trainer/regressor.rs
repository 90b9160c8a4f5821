//! The regressor seam used by per-car models.

use linfa::DatasetView;
use ndarray::{Array1, ArrayView1, ArrayView2, Ix1};
use serde::{Deserialize, Serialize};

use super::error::TrainingResult;
use super::gbt::GradientBoostedTrees;

/// A single-output regression model.
///
/// Each per-car model holds one regressor per (tire, zone). Implementations
/// must be deterministic for a given training set.
pub trait Regressor: Send + Sync + std::fmt::Debug {
    /// Fit to a dataset of feature rows and labels.
    fn fit(&mut self, dataset: &DatasetView<'_, f64, f64, Ix1>) -> TrainingResult<()>;

    /// Predict one value.
    fn predict(&self, features: ArrayView1<'_, f64>) -> f64;

    /// Predict one value per row.
    fn predict_rows(&self, records: ArrayView2<'_, f64>) -> Array1<f64> {
        records.rows().into_iter().map(|row| self.predict(row)).collect()
    }

    /// Short name of the algorithm.
    fn kind(&self) -> &'static str;

    /// Serializable form for persistence.
    fn to_artifact(&self) -> RegressorArtifact;
}

/// Persisted form of every supported regressor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegressorArtifact {
    GradientBoosted(GradientBoostedTrees),
}

impl RegressorArtifact {
    pub fn into_regressor(self) -> Box<dyn Regressor> {
        match self {
            RegressorArtifact::GradientBoosted(model) => Box::new(model),
        }
    }
}
