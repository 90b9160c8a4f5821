//! Offline replay of a recorded session through a coordinator.

use serde::Serialize;
use tracing::debug;

use super::coordinator::PredictionCoordinator;
use crate::collector::SessionRecord;
use crate::telemetry::TireTemps;

/// Forecast error at one pit-box measurement.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayPoint {
    pub timestamp: f64,
    pub stint_time: f64,
    pub lap: u32,
    /// Confidence of the forecast being scored.
    pub confidence: f64,
    /// Mean absolute error across all twelve zones, °F.
    pub mae: f64,
    pub max_error: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplayReport {
    pub session_id: String,
    pub samples: usize,
    pub rejected: usize,
    pub points: Vec<ReplayPoint>,
}

impl ReplayReport {
    pub fn mean_mae(&self) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        Some(self.points.iter().map(|p| p.mae).sum::<f64>() / self.points.len() as f64)
    }
}

fn errors(forecast: &TireTemps, measured: &TireTemps) -> (f64, f64) {
    let diffs: Vec<f64> = forecast
        .iter()
        .map(|(tire, zone, temp)| (temp - measured.get(tire, zone)).abs())
        .collect();
    let mae = diffs.iter().sum::<f64>() / diffs.len() as f64;
    let max = diffs.iter().copied().fold(0.0, f64::max);
    (mae, max)
}

/// Feed `record` through `coordinator` in timestamp order.
///
/// Each measurement is scored against the forecast made on the tick before
/// it, then handed to the coordinator the same way the live path does.
pub fn replay_session(
    coordinator: &mut PredictionCoordinator,
    record: &SessionRecord,
) -> ReplayReport {
    coordinator.set_session(Some(record.info.clone()));

    let mut samples: Vec<_> = record.samples.iter().collect();
    samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    let mut ground_truth: Vec<_> = record.ground_truth.iter().collect();
    ground_truth.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    let mut pending = ground_truth.into_iter().peekable();

    let mut report = ReplayReport {
        session_id: record.info.session_id.clone(),
        ..ReplayReport::default()
    };

    for sample in samples {
        let mut measured = None;
        while let Some(gt) = pending.next_if(|gt| gt.timestamp <= sample.timestamp) {
            if let Some(forecast) = coordinator.last_result().filter(|r| !r.measured) {
                let (mae, max_error) = errors(&forecast.temps, &gt.temps);
                report.points.push(ReplayPoint {
                    timestamp: gt.timestamp,
                    stint_time: gt.stint_time,
                    lap: gt.lap,
                    confidence: forecast.confidence,
                    mae,
                    max_error,
                });
            }
            measured = Some(gt.temps);
        }

        report.samples += 1;
        if coordinator.predict(sample, measured.as_ref()).is_err() {
            report.rejected += 1;
        }
    }

    debug!(
        session = %report.session_id,
        samples = report.samples,
        scored = report.points.len(),
        "Replay complete"
    );
    coordinator.set_session(None);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::patterns::PatternLearner;
    use crate::physics::PhysicsModel;
    use crate::predictor::CoordinatorConfig;
    use crate::telemetry::{GroundTruthSample, SessionInfo, TelemetrySample};
    use crate::trainer::ModelRegistry;

    fn coordinator() -> PredictionCoordinator {
        PredictionCoordinator::new(
            CoordinatorConfig::default(),
            PhysicsModel::default(),
            Arc::new(PatternLearner::in_memory()),
            Arc::new(ModelRegistry::in_memory()),
        )
    }

    fn record() -> SessionRecord {
        let info = SessionInfo::new("race-1", "bmw_m4_gt3", "gt3", "monza");
        let mut record = SessionRecord::new(info, 0);
        for t in 0..120 {
            let t = t as f64;
            let in_pit = t == 60.0 || t == 119.0;
            record.samples.push(
                TelemetrySample::new("race-1", t)
                    .with_speed(if in_pit { 0.0 } else { 180.0 })
                    .with_pedals(0.7, 0.0)
                    .with_stint_time(t)
                    .with_pit(in_pit),
            );
        }
        for &t in &[60.0, 119.0] {
            let sample = record.samples[t as usize].clone();
            record.ground_truth.push(GroundTruthSample::from_sample(
                "bmw_m4_gt3",
                &sample,
                TireTemps::uniform(190.0),
            ));
        }
        // Out of order on purpose
        record.samples.swap(10, 20);
        record
    }

    #[test]
    fn test_scores_every_measurement() {
        let mut coordinator = coordinator();
        let report = replay_session(&mut coordinator, &record());

        assert_eq!(report.samples, 120);
        assert_eq!(report.rejected, 0);
        assert_eq!(report.points.len(), 2);
        for point in &report.points {
            assert!(point.mae.is_finite());
            assert!(point.max_error >= point.mae);
            assert!(point.confidence > 0.0);
        }
        assert!(report.mean_mae().is_some());
        assert!(coordinator.session().is_none());
    }

    #[test]
    fn test_empty_session() {
        let info = SessionInfo::new("empty", "car", "gt3", "spa");
        let report = replay_session(&mut coordinator(), &SessionRecord::new(info, 0));
        assert_eq!(report.samples, 0);
        assert!(report.mean_mae().is_none());
    }

    #[test]
    fn test_error_metrics() {
        let forecast = TireTemps::uniform(200.0);
        let mut measured = TireTemps::uniform(200.0);
        measured.set(crate::telemetry::Tire::LeftFront, crate::telemetry::Zone::Left, 212.0);
        let (mae, max) = errors(&forecast, &measured);
        assert!((mae - 1.0).abs() < 1e-9);
        assert_eq!(max, 12.0);
    }
}
