//! Feature extraction shared by training and live prediction.
//!
//! Driver inputs are noisy at tick rate but tires respond over tens of
//! seconds, so inputs are exponentially smoothed on the sample clock. The
//! smoothing is time based, which makes a 1 Hz recording and a 60 Hz live
//! feed produce the same features.

use ndarray::Array2;

use crate::telemetry::TelemetrySample;

/// Length of a feature vector.
pub const FEATURE_COUNT: usize = 10;

/// Feature names, in vector order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "speed_kph",
    "throttle",
    "brake",
    "abs_lateral_g",
    "longitudinal_g",
    "track_temp",
    "ambient_temp",
    "mean_pressure",
    "stint_minutes",
    "lap",
];

/// Position of `stint_minutes` in a feature vector.
pub const STINT_MINUTES_FEATURE: usize = 8;

/// Default smoothing time constant.
pub const DEFAULT_SMOOTHING_TAU_SECS: f64 = 10.0;

/// Largest gap between samples treated as continuous.
const MAX_GAP_SECS: f64 = 30.0;

#[derive(Debug, Clone, Copy)]
struct Smoothed {
    speed: f64,
    throttle: f64,
    brake: f64,
    abs_lateral: f64,
    longitudinal: f64,
}

impl Smoothed {
    fn from_sample(sample: &TelemetrySample) -> Self {
        Self {
            speed: sample.speed_kph,
            throttle: sample.throttle,
            brake: sample.brake,
            abs_lateral: sample.lateral_g.abs(),
            longitudinal: sample.longitudinal_g,
        }
    }
}

/// Running feature state for one car.
#[derive(Debug, Clone)]
pub struct FeatureTracker {
    tau_secs: f64,
    smoothed: Option<Smoothed>,
    last_timestamp: Option<f64>,
}

impl FeatureTracker {
    pub fn new(tau_secs: f64) -> Self {
        Self {
            tau_secs: tau_secs.max(f64::EPSILON),
            smoothed: None,
            last_timestamp: None,
        }
    }

    pub fn reset(&mut self) {
        self.smoothed = None;
        self.last_timestamp = None;
    }

    /// Fold in a sample and return the feature vector at that instant.
    pub fn update(&mut self, sample: &TelemetrySample) -> [f64; FEATURE_COUNT] {
        let raw = Smoothed::from_sample(sample);

        let smoothed = match (self.smoothed, self.last_timestamp) {
            (Some(prev), Some(last)) => {
                let dt = sample.timestamp - last;
                if dt <= 0.0 || dt > MAX_GAP_SECS {
                    raw
                } else {
                    let alpha = 1.0 - (-dt / self.tau_secs).exp();
                    let blend = |old: f64, new: f64| old + (new - old) * alpha;
                    Smoothed {
                        speed: blend(prev.speed, raw.speed),
                        throttle: blend(prev.throttle, raw.throttle),
                        brake: blend(prev.brake, raw.brake),
                        abs_lateral: blend(prev.abs_lateral, raw.abs_lateral),
                        longitudinal: blend(prev.longitudinal, raw.longitudinal),
                    }
                }
            }
            _ => raw,
        };

        self.smoothed = Some(smoothed);
        self.last_timestamp = Some(sample.timestamp);

        [
            smoothed.speed,
            smoothed.throttle,
            smoothed.brake,
            smoothed.abs_lateral,
            smoothed.longitudinal,
            sample.track_temp,
            sample.ambient_temp,
            sample.mean_pressure(),
            sample.stint_time / 60.0,
            sample.lap as f64,
        ]
    }
}

impl Default for FeatureTracker {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_TAU_SECS)
    }
}

/// Stack feature vectors into an `(n, FEATURE_COUNT)` matrix.
pub fn feature_matrix(rows: &[[f64; FEATURE_COUNT]]) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), FEATURE_COUNT), |(i, j)| rows[i][j])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_is_raw() {
        let mut tracker = FeatureTracker::default();
        let features = tracker.update(&TelemetrySample::new("s", 0.0).with_speed(100.0));
        assert_eq!(features[0], 100.0);
        assert_eq!(features.len(), FEATURE_NAMES.len());
    }

    #[test]
    fn test_smoothing_lags_step_change() {
        let mut tracker = FeatureTracker::new(10.0);
        tracker.update(&TelemetrySample::new("s", 0.0).with_speed(0.0));
        let features = tracker.update(&TelemetrySample::new("s", 10.0).with_speed(100.0));

        // One time constant: 1 - 1/e of the way there
        assert!((features[0] - 63.21).abs() < 0.01);
    }

    #[test]
    fn test_rate_independence() {
        let mut slow = FeatureTracker::new(10.0);
        let mut fast = FeatureTracker::new(10.0);
        slow.update(&TelemetrySample::new("s", 0.0));
        fast.update(&TelemetrySample::new("s", 0.0));

        let mut slow_out = [0.0; FEATURE_COUNT];
        for t in 1..=20 {
            slow_out = slow.update(&TelemetrySample::new("s", t as f64).with_speed(200.0));
        }
        let mut fast_out = [0.0; FEATURE_COUNT];
        for i in 1..=1200 {
            fast_out = fast.update(&TelemetrySample::new("s", i as f64 / 60.0).with_speed(200.0));
        }

        assert!((slow_out[0] - fast_out[0]).abs() < 1e-6);
    }

    #[test]
    fn test_feature_matrix_keeps_row_order() {
        let mut tracker = FeatureTracker::default();
        let rows: Vec<_> = (0..3)
            .map(|t| tracker.update(&TelemetrySample::new("s", 100.0 * t as f64).with_lap(t, 0.0)))
            .collect();

        let matrix = feature_matrix(&rows);
        assert_eq!(matrix.dim(), (3, FEATURE_COUNT));
        assert_eq!(matrix[[2, 9]], 2.0);
        assert!(feature_matrix(&[]).is_empty());
    }

    #[test]
    fn test_gap_resets_smoothing() {
        let mut tracker = FeatureTracker::default();
        tracker.update(&TelemetrySample::new("s", 0.0).with_speed(50.0));
        let features = tracker.update(&TelemetrySample::new("s", 500.0).with_speed(150.0));
        assert_eq!(features[0], 150.0);
    }
}
