//! Per-car models and the registry serving them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ndarray::aview1;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::regressor::{Regressor, RegressorArtifact};
use crate::artifact::{read_artifact, write_artifact, ArtifactError, ArtifactKind};
use crate::collector::unique_file_stem;
use crate::telemetry::{Tire, TireTemps, Zone};

/// Describes how and when a model was trained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub car_id: String,

    /// Ground truth samples available when training ran.
    pub ground_truth_count: usize,

    pub training_rows: usize,
    pub validation_rows: usize,

    /// Unix seconds.
    pub trained_at: i64,

    /// Held-out mean absolute error per (tire, zone), °F.
    pub validation_mae: TireTemps,

    /// Mean of `validation_mae`.
    pub mean_validation_mae: f64,

    pub regressor_kind: String,

    /// Crate version that produced the model.
    pub version: String,
}

impl ModelMetadata {
    pub fn trained_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.trained_at, 0)
    }
}

/// Twelve regressors for one car, one per (tire, zone).
///
/// Always complete: a model is only built after every regressor fitted.
#[derive(Debug)]
pub struct PerCarModel {
    metadata: ModelMetadata,
    regressors: Vec<Box<dyn Regressor>>,
}

#[derive(Serialize, Deserialize)]
struct ModelArtifact {
    metadata: ModelMetadata,
    regressors: Vec<RegressorArtifact>,
}

fn slot(tire: Tire, zone: Zone) -> usize {
    tire.index() * 3 + zone.index()
}

impl PerCarModel {
    /// Assemble a model. `regressors` must be in (tire, zone) grid order.
    pub fn new(metadata: ModelMetadata, regressors: Vec<Box<dyn Regressor>>) -> Option<Self> {
        if regressors.len() != 12 {
            return None;
        }
        Some(Self {
            metadata,
            regressors,
        })
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn car_id(&self) -> &str {
        &self.metadata.car_id
    }

    pub fn predict(&self, features: &[f64]) -> TireTemps {
        let features = aview1(features);
        TireTemps::from_fn(|tire, zone| self.regressors[slot(tire, zone)].predict(features))
    }

    /// Persist to `path`. Returns bytes written.
    pub fn save(&self, path: &Path) -> Result<u64, ArtifactError> {
        let artifact = ModelArtifact {
            metadata: self.metadata.clone(),
            regressors: self.regressors.iter().map(|r| r.to_artifact()).collect(),
        };
        write_artifact(path, ArtifactKind::CarModel, &artifact)
    }

    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let artifact: ModelArtifact = read_artifact(path, ArtifactKind::CarModel)?;
        let regressors = artifact
            .regressors
            .into_iter()
            .map(RegressorArtifact::into_regressor)
            .collect();
        Self::new(artifact.metadata, regressors).ok_or_else(|| ArtifactError::Corrupt {
            path: path.to_path_buf(),
            reason: "model does not hold 12 regressors".to_string(),
        })
    }
}

/// Installed per-car models, keyed by car id.
///
/// Installing replaces the whole model for a car in one step; readers hold
/// an `Arc` to whichever model was current when they looked.
#[derive(Debug)]
pub struct ModelRegistry {
    models: DashMap<String, Arc<PerCarModel>>,
    dir: Option<PathBuf>,
}

impl ModelRegistry {
    pub fn in_memory() -> Self {
        Self {
            models: DashMap::new(),
            dir: None,
        }
    }

    /// Load every model under `dir`, skipping unreadable ones.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let registry = Self {
            models: DashMap::new(),
            dir: Some(dir.clone()),
        };

        let pattern = format!(
            "{}/*.{}",
            glob::Pattern::escape(&dir.to_string_lossy()),
            ArtifactKind::CarModel.extension()
        );
        let paths = match glob::glob(&pattern) {
            Ok(paths) => paths.filter_map(Result::ok).collect::<Vec<_>>(),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Cannot scan model directory");
                Vec::new()
            }
        };

        let mut skipped = 0;
        for path in paths {
            match PerCarModel::load(&path) {
                Ok(model) => {
                    registry
                        .models
                        .insert(model.car_id().to_string(), Arc::new(model));
                }
                Err(e) => {
                    skipped += 1;
                    warn!(path = %path.display(), error = %e, "Skipping unreadable model");
                }
            }
        }

        info!(
            dir = %dir.display(),
            loaded = registry.models.len(),
            skipped,
            "Loaded car models"
        );
        registry
    }

    /// Where a car's model is persisted, if this registry persists.
    pub fn path_for(&self, car_id: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| {
            dir.join(format!(
                "{}.{}",
                unique_file_stem(car_id),
                ArtifactKind::CarModel.extension()
            ))
        })
    }

    pub fn get(&self, car_id: &str) -> Option<Arc<PerCarModel>> {
        self.models.get(car_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Persist and install a model, replacing any previous one.
    pub fn install(&self, model: PerCarModel) -> Result<Arc<PerCarModel>, ArtifactError> {
        if let Some(path) = self.path_for(model.car_id()) {
            model.save(&path)?;
        }
        let model = Arc::new(model);
        self.models
            .insert(model.car_id().to_string(), Arc::clone(&model));
        Ok(model)
    }

    pub fn cars(&self) -> Vec<String> {
        let mut cars: Vec<String> = self.models.iter().map(|e| e.key().clone()).collect();
        cars.sort();
        cars
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer::{GradientBoostedTrees, Regressor};
    use linfa::Dataset;
    use ndarray::{Array1, Array2};
    use tempfile::TempDir;

    fn constant_model(car_id: &str, temp: f64) -> PerCarModel {
        let data = Dataset::new(
            Array2::from_shape_fn((10, 1), |(i, _)| i as f64),
            Array1::from_elem(10, temp),
        );
        let regressors = (0..12)
            .map(|_| {
                let mut r = GradientBoostedTrees::default();
                r.fit(&data.view()).unwrap();
                Box::new(r) as Box<dyn Regressor>
            })
            .collect();
        let metadata = ModelMetadata {
            car_id: car_id.to_string(),
            ground_truth_count: 6,
            training_rows: 10,
            validation_rows: 2,
            trained_at: 1_700_000_000,
            validation_mae: TireTemps::uniform(4.0),
            mean_validation_mae: 4.0,
            regressor_kind: "gradient-boosted-trees".to_string(),
            version: crate::VERSION.to_string(),
        };
        PerCarModel::new(metadata, regressors).unwrap()
    }

    #[test]
    fn test_new_requires_twelve_regressors() {
        let model = constant_model("car", 180.0);
        assert!(PerCarModel::new(model.metadata().clone(), Vec::new()).is_none());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("car.tpm");
        let model = constant_model("car", 182.0);
        model.save(&path).unwrap();

        let loaded = PerCarModel::load(&path).unwrap();
        assert_eq!(loaded.metadata(), model.metadata());
        assert!((loaded.predict(&[3.0]).average() - 182.0).abs() < 1e-9);
    }

    #[test]
    fn test_registry_install_replaces_and_persists() {
        let temp = TempDir::new().unwrap();
        let registry = ModelRegistry::open(temp.path());
        assert!(registry.is_empty());

        registry.install(constant_model("Car A", 170.0)).unwrap();
        let held = registry.get("Car A").unwrap();
        registry.install(constant_model("Car A", 190.0)).unwrap();

        // An earlier reader keeps the model it looked up
        assert!((held.predict(&[1.0]).average() - 170.0).abs() < 1e-9);
        assert!((registry.get("Car A").unwrap().predict(&[1.0]).average() - 190.0).abs() < 1e-9);
        assert!(temp.path().join(format!("{}.tpm", unique_file_stem("Car A"))).exists());

        // Ids that sanitize alike keep separate files
        registry.install(constant_model("car_a", 150.0)).unwrap();
        assert_eq!(registry.len(), 2);

        let reopened = ModelRegistry::open(temp.path());
        assert_eq!(reopened.cars(), vec!["Car A".to_string(), "car_a".to_string()]);
        assert!((reopened.get("car_a").unwrap().predict(&[1.0]).average() - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_registry_skips_corrupt_files() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("broken.tpm"), b"junk").unwrap();

        let registry = ModelRegistry::open(temp.path());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_trained_at_converts() {
        let model = constant_model("car", 180.0);
        assert_eq!(model.metadata().trained_at().unwrap().timestamp(), 1_700_000_000);
    }
}
