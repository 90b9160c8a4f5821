//! The per-tick forecasting loop.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace};

use super::advisory;
use super::config::CoordinatorConfig;
use super::metrics::CoordinatorMetrics;
use super::result::{blend, Layer, LayerContribution, PredictionResult};
use super::trend::{TireTrend, TrendTracker};
use crate::patterns::{PatternLearner, PatternQuery};
use crate::physics::{PhysicsModel, ThermalState};
use crate::telemetry::{SampleError, SessionInfo, TelemetrySample, Tire, TireTemps};
use crate::trainer::{FeatureTracker, ModelRegistry, DEFAULT_SMOOTHING_TAU_SECS};

/// Blends physics, patterns and per-car models into one forecast per tick.
///
/// Reads whatever pattern snapshot and models are installed at the moment
/// of the call and never waits on training. All per-session state (physics
/// state, feature smoothing, trend windows) is reset on session change.
pub struct PredictionCoordinator {
    config: CoordinatorConfig,
    physics: PhysicsModel,
    learner: Arc<PatternLearner>,
    registry: Arc<ModelRegistry>,
    metrics: Arc<CoordinatorMetrics>,

    session: Option<SessionInfo>,
    thermal: Option<ThermalState>,
    features: FeatureTracker,
    trends: [TrendTracker; 4],
    last: Option<PredictionResult>,
}

impl PredictionCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        physics: PhysicsModel,
        learner: Arc<PatternLearner>,
        registry: Arc<ModelRegistry>,
    ) -> Self {
        let trends = std::array::from_fn(|_| TrendTracker::new(config.trend.clone()));
        Self {
            config,
            physics,
            learner,
            registry,
            metrics: Arc::new(CoordinatorMetrics::new()),
            session: None,
            thermal: None,
            features: FeatureTracker::new(DEFAULT_SMOOTHING_TAU_SECS),
            trends,
            last: None,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<CoordinatorMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn session(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }

    pub fn last_result(&self) -> Option<&PredictionResult> {
        self.last.as_ref()
    }

    /// Switch to a new session (or none) and forget per-session state.
    pub fn set_session(&mut self, session: Option<SessionInfo>) {
        self.session = session;
        self.thermal = None;
        self.features.reset();
        for tracker in &mut self.trends {
            tracker.reset();
        }
        self.last = None;
    }

    /// Forecast tire temperatures for one sample.
    ///
    /// `measured` carries pit-box temperatures when the source has them;
    /// they are used only while the sample is in the pits.
    pub fn predict(
        &mut self,
        sample: &TelemetrySample,
        measured: Option<&TireTemps>,
    ) -> Result<PredictionResult, SampleError> {
        let started = Instant::now();

        if let Err(e) = sample.validate() {
            self.metrics.record_rejected();
            return Err(e);
        }
        if measured.is_some_and(|m| !m.is_finite()) {
            self.metrics.record_rejected();
            return Err(SampleError::NonFinite {
                field: "measured_temps",
            });
        }

        let features = self.features.update(sample);
        let previous = match self.thermal.take() {
            Some(state) => state,
            None => self.physics.initial_state(sample),
        };
        let physics = self.physics.estimate(sample, &previous);

        let (temps, confidence, layers, is_measured) = match measured {
            Some(measured) if sample.in_pit => {
                self.thermal = Some(self.physics.calibrate(measured, sample.timestamp));
                (*measured, 0.0, Vec::new(), true)
            }
            _ => {
                let layers = self.layers(sample, &features, &physics);
                self.thermal = Some(physics.clone());
                let (temps, confidence) =
                    blend(&layers).unwrap_or((physics.temps, self.config.physics_confidence));
                (temps, confidence, layers, false)
            }
        };

        let trends: [TireTrend; 4] = std::array::from_fn(|i| {
            let tire = Tire::ALL[i];
            self.trends[i].update(sample.timestamp, temps.tire_average(tire))
        });
        let advisories = advisory::evaluate(&temps, &trends, &self.config.advisories);

        let result = PredictionResult {
            timestamp: sample.timestamp,
            temps,
            confidence,
            trends,
            advisories,
            layers,
            measured: is_measured,
        };

        self.metrics.record(&result, started.elapsed());
        trace!(
            timestamp = sample.timestamp,
            confidence = result.confidence,
            layers = result.layers.len(),
            "Prediction"
        );
        self.last = Some(result.clone());
        Ok(result)
    }

    fn layers(
        &self,
        sample: &TelemetrySample,
        features: &[f64],
        physics: &ThermalState,
    ) -> Vec<LayerContribution> {
        let mut layers = vec![LayerContribution {
            layer: Layer::Physics,
            confidence: self.config.physics_confidence,
            temps: physics.temps,
        }];

        let Some(info) = self
            .session
            .as_ref()
            .filter(|info| info.session_id == sample.session_id)
        else {
            return layers;
        };
        let toggles = self.config.layers;

        if toggles.car_class_pattern || toggles.track_pattern {
            let snapshot = self.learner.snapshot();
            let base = PatternQuery {
                car_class: None,
                track_id: None,
                stint_time: sample.stint_time,
                lap_pct: sample.lap_pct,
            };

            if toggles.car_class_pattern {
                let query = PatternQuery {
                    car_class: Some(&info.car_class),
                    ..base
                };
                if let Some(estimate) = snapshot.lookup(&query) {
                    layers.push(LayerContribution {
                        layer: Layer::CarClassPattern,
                        confidence: estimate.confidence,
                        temps: estimate.temps,
                    });
                }
            }
            if toggles.track_pattern {
                let query = PatternQuery {
                    track_id: Some(&info.track_id),
                    ..base
                };
                if let Some(estimate) = snapshot.lookup(&query) {
                    layers.push(LayerContribution {
                        layer: Layer::TrackPattern,
                        confidence: estimate.confidence,
                        temps: estimate.temps,
                    });
                }
            }
        }

        if toggles.model {
            if let Some(model) = self.registry.get(&info.car_id) {
                let mae = model.metadata().mean_validation_mae;
                if mae <= self.config.max_validation_mae {
                    let temps = model.predict(features);
                    if temps.is_finite() {
                        layers.push(LayerContribution {
                            layer: Layer::Model,
                            confidence: self.config.model_confidence(mae),
                            temps,
                        });
                    } else {
                        debug!(car = %info.car_id, "Model produced non-finite output, skipping");
                    }
                }
            }
        }

        layers
    }
}

impl std::fmt::Debug for PredictionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionCoordinator")
            .field("config", &self.config)
            .field("session", &self.session)
            .field("models", &self.registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::SessionRecord;
    use crate::predictor::{LayerToggles, PHYSICS_CONFIDENCE};
    use crate::telemetry::GroundTruthSample;
    use crate::trainer::{
        GradientBoostedTrees, ModelMetadata, PerCarModel, Regressor, FEATURE_COUNT,
    };
    use linfa::Dataset;
    use ndarray::{Array1, Array2};

    fn info() -> SessionInfo {
        SessionInfo::new("race-1", "bmw_m4_gt3", "gt3", "monza")
    }

    fn coordinator(
        config: CoordinatorConfig,
        learner: PatternLearner,
        registry: ModelRegistry,
    ) -> PredictionCoordinator {
        let mut coordinator = PredictionCoordinator::new(
            config,
            PhysicsModel::default(),
            Arc::new(learner),
            Arc::new(registry),
        );
        coordinator.set_session(Some(info()));
        coordinator
    }

    fn fresh() -> PredictionCoordinator {
        coordinator(
            CoordinatorConfig::default(),
            PatternLearner::in_memory(),
            ModelRegistry::in_memory(),
        )
    }

    fn driving(t: f64) -> TelemetrySample {
        TelemetrySample::new("race-1", t)
            .with_speed(180.0)
            .with_pedals(0.8, 0.0)
            .with_stint_time(t)
    }

    fn constant_model(temp: f64, mae: f64) -> PerCarModel {
        let data = Dataset::new(
            Array2::from_shape_fn((8, FEATURE_COUNT), |(i, _)| i as f64),
            Array1::from_elem(8, temp),
        );
        let regressors = (0..12)
            .map(|_| {
                let mut r = GradientBoostedTrees::default();
                r.fit(&data.view()).unwrap();
                Box::new(r) as Box<dyn Regressor>
            })
            .collect();
        let metadata = ModelMetadata {
            car_id: "bmw_m4_gt3".to_string(),
            ground_truth_count: 8,
            training_rows: 8,
            validation_rows: 2,
            trained_at: 0,
            validation_mae: TireTemps::uniform(mae),
            mean_validation_mae: mae,
            regressor_kind: "gradient-boosted-trees".to_string(),
            version: crate::VERSION.to_string(),
        };
        PerCarModel::new(metadata, regressors).unwrap()
    }

    #[test]
    fn test_fresh_car_is_physics_only() {
        let mut coordinator = fresh();
        let result = coordinator.predict(&driving(1.0), None).unwrap();

        assert_eq!(result.layers.len(), 1);
        assert_eq!(result.layers[0].layer, Layer::Physics);
        assert_eq!(result.confidence, PHYSICS_CONFIDENCE);
        assert!(!result.measured);
        assert_eq!(result.temps, result.layers[0].temps);
    }

    #[test]
    fn test_malformed_sample_is_rejected() {
        let mut coordinator = fresh();
        let bad = driving(1.0).with_pedals(1.5, 0.0);

        assert!(matches!(
            coordinator.predict(&bad, None),
            Err(SampleError::OutOfRange { field: "throttle", .. })
        ));
        assert!(coordinator.last_result().is_none());
        assert_eq!(coordinator.metrics().snapshot().rejected, 1);
    }

    #[test]
    fn test_measured_temps_supersede_forecast_in_pit() {
        let mut coordinator = fresh();
        let measured = TireTemps::uniform(205.0);
        let stopped = TelemetrySample::new("race-1", 10.0).with_pit(true);

        let result = coordinator.predict(&stopped, Some(&measured)).unwrap();
        assert!(result.measured);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.temps, measured);

        // Physics continues from the measurement
        let next = coordinator.predict(&driving(11.0), None).unwrap();
        assert!(!next.measured);
        assert!((next.layers[0].temps.average() - 205.0).abs() < 15.0);
    }

    #[test]
    fn test_measured_temps_ignored_on_track() {
        let mut coordinator = fresh();
        let measured = TireTemps::uniform(205.0);
        let result = coordinator.predict(&driving(1.0), Some(&measured)).unwrap();
        assert!(!result.measured);
    }

    #[test]
    fn test_model_layer_joins_blend() {
        let registry = ModelRegistry::in_memory();
        registry.install(constant_model(200.0, 5.0)).unwrap();
        let mut coordinator =
            coordinator(CoordinatorConfig::default(), PatternLearner::in_memory(), registry);

        let result = coordinator.predict(&driving(1.0), None).unwrap();
        let model = result.layer(Layer::Model).unwrap();
        assert!((model.confidence - 0.95 * 0.9).abs() < 1e-9);
        assert!((result.confidence - model.confidence).abs() < 1e-12);
        assert!((model.temps.average() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_inaccurate_model_is_not_used() {
        let registry = ModelRegistry::in_memory();
        registry.install(constant_model(200.0, 30.0)).unwrap();
        let mut coordinator =
            coordinator(CoordinatorConfig::default(), PatternLearner::in_memory(), registry);

        let result = coordinator.predict(&driving(1.0), None).unwrap();
        assert!(result.layer(Layer::Model).is_none());
    }

    #[test]
    fn test_toggles_disable_layers() {
        let registry = ModelRegistry::in_memory();
        registry.install(constant_model(200.0, 5.0)).unwrap();
        let config = CoordinatorConfig::default().with_layers(LayerToggles::physics_only());
        let mut coordinator = coordinator(config, PatternLearner::in_memory(), registry);

        let result = coordinator.predict(&driving(1.0), None).unwrap();
        assert_eq!(result.layers.len(), 1);
    }

    #[test]
    fn test_pattern_layers_from_learned_sessions() {
        let learner = PatternLearner::in_memory();
        for i in 0..3 {
            let session = SessionInfo::new(format!("old-{}", i), "bmw_m4_gt3", "gt3", "monza");
            let mut record = SessionRecord::new(session.clone(), 0);
            let sample = TelemetrySample::new(session.session_id.clone(), 100.0).with_stint_time(100.0);
            record.ground_truth.push(GroundTruthSample::from_sample(
                "bmw_m4_gt3",
                &sample,
                TireTemps::uniform(195.0),
            ));
            learner.fold(&record);
        }

        let mut coordinator =
            coordinator(CoordinatorConfig::default(), learner, ModelRegistry::in_memory());
        let result = coordinator.predict(&driving(100.0), None).unwrap();

        assert!(result.layer(Layer::CarClassPattern).is_some());
        assert!(result.layer(Layer::TrackPattern).is_some());
        assert!(result.confidence > PHYSICS_CONFIDENCE);
    }

    #[test]
    fn test_other_session_gets_physics_only() {
        let registry = ModelRegistry::in_memory();
        registry.install(constant_model(200.0, 5.0)).unwrap();
        let mut coordinator =
            coordinator(CoordinatorConfig::default(), PatternLearner::in_memory(), registry);

        let stray = TelemetrySample::new("other", 1.0);
        let result = coordinator.predict(&stray, None).unwrap();
        assert_eq!(result.layers.len(), 1);
    }

    #[test]
    fn test_session_change_resets_state() {
        let mut coordinator = fresh();
        coordinator.predict(&driving(1.0), None).unwrap();
        coordinator.set_session(None);
        assert!(coordinator.last_result().is_none());
        assert!(coordinator.session().is_none());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn confidence_bounded_by_layers(
                speed in 0.0f64..320.0,
                throttle in 0.0f64..=1.0,
                brake in 0.0f64..=1.0,
                lateral in -3.0f64..3.0,
                mae in 0.0f64..25.0,
            ) {
                let registry = ModelRegistry::in_memory();
                registry.install(constant_model(190.0, mae)).unwrap();
                let mut coordinator =
                    coordinator(CoordinatorConfig::default(), PatternLearner::in_memory(), registry);

                let sample = TelemetrySample::new("race-1", 1.0)
                    .with_speed(speed)
                    .with_pedals(throttle, brake)
                    .with_g(lateral, 0.0);
                let result = coordinator.predict(&sample, None).unwrap();

                let strongest = result.layers.iter().map(|l| l.confidence).fold(0.0, f64::max);
                prop_assert!((0.0..=1.0).contains(&result.confidence));
                prop_assert!(result.confidence <= strongest + 1e-12);
                prop_assert!(result.temps.is_finite());
            }
        }
    }
}
