//! Fitting per-car models from recorded sessions.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use linfa::DatasetView;
use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::error::{SkipReason, TrainingError, TrainingResult};
use super::features::{
    feature_matrix, FeatureTracker, DEFAULT_SMOOTHING_TAU_SECS, FEATURE_COUNT,
    STINT_MINUTES_FEATURE,
};
use super::gbt::{BoostingParams, GradientBoostedTrees};
use super::model::{ModelMetadata, ModelRegistry, PerCarModel};
use super::regressor::Regressor;
use super::synthetic::SyntheticSample;
use crate::collector::SessionRecord;
use crate::telemetry::{Tire, TireTemps, Zone};

/// Default ground truth samples required before a car gets a model.
pub const DEFAULT_MIN_GROUND_TRUTH: usize = 5;

/// Default share of ground truth held out for validation.
pub const DEFAULT_VALIDATION_SPLIT: f64 = 0.2;

/// Default seconds of telemetry before a ground truth sample it labels.
pub const DEFAULT_LABEL_WINDOW_SECS: f64 = 120.0;

/// Trainer configuration.
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub min_ground_truth: usize,
    pub validation_split: f64,
    pub label_window_secs: f64,
    pub smoothing_tau_secs: f64,
    pub boosting: BoostingParams,

    /// Install a new model even if it validates worse than the current one.
    pub force: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            min_ground_truth: DEFAULT_MIN_GROUND_TRUTH,
            validation_split: DEFAULT_VALIDATION_SPLIT,
            label_window_secs: DEFAULT_LABEL_WINDOW_SECS,
            smoothing_tau_secs: DEFAULT_SMOOTHING_TAU_SECS,
            boosting: BoostingParams::default(),
            force: false,
        }
    }
}

impl TrainerConfig {
    pub fn with_min_ground_truth(mut self, min: usize) -> Self {
        self.min_ground_truth = min.max(1);
        self
    }

    pub fn with_validation_split(mut self, split: f64) -> Self {
        self.validation_split = split.clamp(0.0, 0.9);
        self
    }

    pub fn with_label_window(mut self, secs: f64) -> Self {
        self.label_window_secs = secs;
        self
    }

    pub fn with_boosting(mut self, boosting: BoostingParams) -> Self {
        self.boosting = boosting;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Result of one training pass.
#[derive(Debug)]
pub enum TrainingOutcome {
    /// A new model was installed.
    Trained(ModelMetadata),

    /// No model was installed; the previous model (if any) is unchanged.
    Skipped(SkipReason),

    /// Training ran and failed; the previous model (if any) is unchanged.
    Failed(TrainingError),
}

impl TrainingOutcome {
    pub fn is_trained(&self) -> bool {
        matches!(self, TrainingOutcome::Trained(_))
    }
}

/// Feature rows labelled by one ground truth sample.
#[derive(Debug)]
struct LabelGroup {
    session_id: String,
    captured_at: f64,
    rows: Array2<f64>,
    labels: TireTemps,
}

impl LabelGroup {
    fn label_column(&self, tire: Tire, zone: Zone) -> Array1<f64> {
        Array1::from_elem(self.rows.nrows(), self.labels.get(tire, zone))
    }
}

/// Labelled rows for one car, in time order.
#[derive(Debug)]
pub struct TrainingSet {
    groups: Vec<LabelGroup>,
    ground_truth_count: usize,
    synthetic_groups: usize,
}

impl TrainingSet {
    pub fn ground_truth_count(&self) -> usize {
        self.ground_truth_count
    }

    pub fn row_count(&self) -> usize {
        self.groups.iter().map(|g| g.rows.nrows()).sum()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Groups rebuilt from synthesized samples of deleted sessions.
    pub fn synthetic_group_count(&self) -> usize {
        self.synthetic_groups
    }
}

/// Builds training sets and fits per-car models.
#[derive(Debug, Clone, Default)]
pub struct ModelTrainer {
    config: TrainerConfig,
}

impl ModelTrainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Train a car and install the result if it beats the current model.
    ///
    /// `records` should be ordered oldest first; the newest ground truth is
    /// held out for validation. `synthetic` holds samples kept from deleted
    /// sessions and is treated as older than every record. Never panics and
    /// never leaves a partially trained model installed.
    pub fn train_car(
        &self,
        car_id: &str,
        records: &[SessionRecord],
        synthetic: &[SyntheticSample],
        registry: &ModelRegistry,
    ) -> TrainingOutcome {
        let set = match self.training_set(car_id, records, synthetic) {
            Ok(set) => set,
            Err(reason) => {
                info!(car = %car_id, reason = %reason, "Training skipped");
                return TrainingOutcome::Skipped(reason);
            }
        };

        let model = match self.fit(car_id, &set) {
            Ok(model) => model,
            Err(e) => {
                warn!(car = %car_id, error = %e, "Training failed, keeping previous model");
                return TrainingOutcome::Failed(e);
            }
        };

        if !self.config.force {
            if let Some(current) = registry.get(car_id) {
                let current_mae = current.metadata().mean_validation_mae;
                let candidate_mae = model.metadata().mean_validation_mae;
                if candidate_mae >= current_mae {
                    let reason = SkipReason::NotBetter {
                        current_mae,
                        candidate_mae,
                    };
                    info!(car = %car_id, reason = %reason, "Keeping installed model");
                    return TrainingOutcome::Skipped(reason);
                }
            }
        }

        match registry.install(model) {
            Ok(installed) => {
                let metadata = installed.metadata().clone();
                info!(
                    car = %car_id,
                    ground_truth = metadata.ground_truth_count,
                    rows = metadata.training_rows,
                    synthetic_groups = set.synthetic_groups,
                    validation_mae = metadata.mean_validation_mae,
                    forced = self.config.force,
                    "Installed car model"
                );
                TrainingOutcome::Trained(metadata)
            }
            Err(e) => {
                warn!(car = %car_id, error = %e, "Could not persist model, keeping previous model");
                TrainingOutcome::Failed(e.into())
            }
        }
    }

    /// Gather labelled rows for a car, or say why training cannot run.
    ///
    /// Synthesized samples from a session that is still on disk are ignored
    /// so that stop is not counted twice.
    pub fn training_set(
        &self,
        car_id: &str,
        records: &[SessionRecord],
        synthetic: &[SyntheticSample],
    ) -> Result<TrainingSet, SkipReason> {
        let records: Vec<&SessionRecord> =
            records.iter().filter(|r| r.info.car_id == car_id).collect();
        let recorded: BTreeSet<&str> = records.iter().map(|r| r.info.session_id.as_str()).collect();

        let mut groups = group_synthetic(
            synthetic
                .iter()
                .filter(|s| !recorded.contains(s.session_id.as_str())),
        );
        let synthetic_groups = groups.len();

        let ground_truth_count =
            records.iter().map(|r| r.ground_truth.len()).sum::<usize>() + synthetic_groups;
        if ground_truth_count < self.config.min_ground_truth {
            return Err(SkipReason::InsufficientGroundTruth {
                have: ground_truth_count,
                need: self.config.min_ground_truth,
            });
        }

        for record in records {
            groups.extend(self.label_record(record));
        }
        if groups.is_empty() {
            return Err(SkipReason::NoTrainingRows);
        }

        Ok(TrainingSet {
            groups,
            ground_truth_count,
            synthetic_groups,
        })
    }

    /// Representative labelled rows of a session: the first, middle and
    /// last row of each label window.
    pub fn synthesize(&self, record: &SessionRecord) -> Vec<SyntheticSample> {
        let mut samples = Vec::new();
        for group in self.label_record(record) {
            let n = group.rows.nrows();
            let picks: BTreeSet<usize> = [0, n / 2, n.saturating_sub(1)].into_iter().collect();
            for i in picks {
                let row = group.rows.row(i);
                let mut features = [0.0; FEATURE_COUNT];
                for (slot, value) in features.iter_mut().zip(row.iter()) {
                    *slot = *value;
                }
                samples.push(SyntheticSample {
                    session_id: group.session_id.clone(),
                    captured_at: group.captured_at,
                    stint_time: features[STINT_MINUTES_FEATURE] * 60.0,
                    features,
                    temps: group.labels,
                });
            }
        }
        debug!(
            session = %record.info.session_id,
            samples = samples.len(),
            "Synthesized training samples"
        );
        samples
    }

    fn label_record(&self, record: &SessionRecord) -> Vec<LabelGroup> {
        let mut samples: Vec<_> = record.samples.iter().collect();
        samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        let mut tracker = FeatureTracker::new(self.config.smoothing_tau_secs);
        let featured: Vec<(f64, [f64; FEATURE_COUNT])> = samples
            .iter()
            .map(|s| (s.timestamp, tracker.update(s)))
            .collect();

        let mut truths: Vec<_> = record.ground_truth.iter().collect();
        truths.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        let mut groups = Vec::new();
        let mut previous = f64::NEG_INFINITY;
        for gt in truths {
            let start = (gt.timestamp - self.config.label_window_secs).max(previous);
            let rows: Vec<[f64; FEATURE_COUNT]> = featured
                .iter()
                .filter(|(t, _)| *t > start && *t <= gt.timestamp)
                .map(|(_, f)| *f)
                .collect();
            previous = gt.timestamp;

            if !rows.is_empty() {
                groups.push(LabelGroup {
                    session_id: record.info.session_id.clone(),
                    captured_at: gt.timestamp,
                    rows: feature_matrix(&rows),
                    labels: gt.temps,
                });
            }
        }
        groups
    }

    /// Fit all twelve regressors. Holds out the newest groups for validation.
    pub fn fit(&self, car_id: &str, set: &TrainingSet) -> TrainingResult<PerCarModel> {
        let n = set.groups.len();
        let held_out = if n >= 2 {
            ((n as f64 * self.config.validation_split).round() as usize).clamp(1, n - 1)
        } else {
            0
        };
        let (train, validation) = set.groups.split_at(n - held_out);
        // With nothing held out, report the training error instead
        let validation = if validation.is_empty() { train } else { validation };

        let views: Vec<ArrayView2<'_, f64>> = train.iter().map(|g| g.rows.view()).collect();
        let train_x = concatenate(Axis(0), &views)
            .map_err(|e| TrainingError::MalformedFeatures(e.to_string()))?;
        let validation_rows: usize = validation.iter().map(|g| g.rows.nrows()).sum();

        let slots: Vec<(Tire, Zone)> = Tire::ALL
            .into_iter()
            .flat_map(|tire| Zone::ALL.into_iter().map(move |zone| (tire, zone)))
            .collect();

        let fitted = slots
            .par_iter()
            .map(|&(tire, zone)| self.fit_slot(tire, zone, &train_x, train, validation))
            .collect::<TrainingResult<Vec<_>>>()?;

        let mut mae = TireTemps::default();
        let mut regressors = Vec::with_capacity(12);
        for ((tire, zone), (regressor, error)) in slots.into_iter().zip(fitted) {
            mae.set(tire, zone, error);
            regressors.push(regressor);
        }

        let metadata = ModelMetadata {
            car_id: car_id.to_string(),
            ground_truth_count: set.ground_truth_count,
            training_rows: train_x.nrows(),
            validation_rows,
            trained_at: Utc::now().timestamp(),
            validation_mae: mae,
            mean_validation_mae: mae.average(),
            regressor_kind: regressors
                .first()
                .map(|r| r.kind().to_string())
                .unwrap_or_default(),
            version: crate::VERSION.to_string(),
        };

        PerCarModel::new(metadata, regressors).ok_or_else(|| {
            TrainingError::MalformedFeatures("incomplete regressor set".to_string())
        })
    }

    fn fit_slot(
        &self,
        tire: Tire,
        zone: Zone,
        train_x: &Array2<f64>,
        train: &[LabelGroup],
        validation: &[LabelGroup],
    ) -> TrainingResult<(Box<dyn Regressor>, f64)> {
        let name = format!("{}-{}", tire.label(), zone.label());
        let labels: Array1<f64> = train
            .iter()
            .flat_map(|g| std::iter::repeat(g.labels.get(tire, zone)).take(g.rows.nrows()))
            .collect();

        let mut regressor = GradientBoostedTrees::new(self.config.boosting.clone());
        let dataset = DatasetView::new(train_x.view(), labels.view());
        regressor.fit(&dataset).map_err(|e| match e {
            TrainingError::Divergence { .. } => TrainingError::Divergence {
                regressor: name.clone(),
            },
            other => other,
        })?;

        let mut total = 0.0;
        let mut count = 0usize;
        for group in validation {
            let predicted = regressor.predict_rows(group.rows.view());
            let expected = group.label_column(tire, zone);
            total += (&predicted - &expected).mapv(f64::abs).sum();
            count += group.rows.nrows();
        }
        let mae = total / count.max(1) as f64;
        if !mae.is_finite() {
            return Err(TrainingError::Divergence { regressor: name });
        }

        let regressor: Box<dyn Regressor> = Box::new(regressor);
        Ok((regressor, mae))
    }
}

/// Rebuild label groups from synthesized samples, one per pit stop.
fn group_synthetic<'a>(samples: impl Iterator<Item = &'a SyntheticSample>) -> Vec<LabelGroup> {
    let mut order: Vec<(String, u64)> = Vec::new();
    let mut stops: BTreeMap<(String, u64), (f64, TireTemps, Vec<[f64; FEATURE_COUNT]>)> =
        BTreeMap::new();
    for sample in samples {
        let key = (sample.session_id.clone(), sample.captured_at.to_bits());
        let entry = stops.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            (sample.captured_at, sample.temps, Vec::new())
        });
        entry.2.push(sample.features);
    }

    order
        .into_iter()
        .filter_map(|key| {
            let (captured_at, labels, rows) = stops.remove(&key)?;
            Some(LabelGroup {
                session_id: key.0,
                captured_at,
                rows: feature_matrix(&rows),
                labels,
            })
        })
        .collect()
}
