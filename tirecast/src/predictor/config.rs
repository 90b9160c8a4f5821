//! Coordinator configuration.

/// Fixed confidence of the physics layer.
pub const PHYSICS_CONFIDENCE: f64 = 0.35;

/// Models with a mean validation error above this (°F) are not used.
pub const DEFAULT_MAX_VALIDATION_MAE: f64 = 25.0;

/// Validation error (°F) at which a model's confidence reaches zero.
pub const MODEL_MAE_SCALE: f64 = 50.0;

/// Upper bound on model confidence.
pub const MODEL_CONFIDENCE_CEILING: f64 = 0.95;

/// Which learned layers may contribute. Physics always does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerToggles {
    pub car_class_pattern: bool,
    pub track_pattern: bool,
    pub model: bool,
}

impl Default for LayerToggles {
    fn default() -> Self {
        Self {
            car_class_pattern: true,
            track_pattern: true,
            model: true,
        }
    }
}

impl LayerToggles {
    /// Physics only.
    pub fn physics_only() -> Self {
        Self {
            car_class_pattern: false,
            track_pattern: false,
            model: false,
        }
    }
}

/// Thresholds for driver advisories, °F.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisoryThresholds {
    /// Tire average at or above this is overheating.
    pub critical: f64,

    /// Tire average at or below this, and not rising, is cold.
    pub cold: f64,

    /// Left/right difference on one axle above this is an imbalance.
    pub imbalance: f64,

    /// Edge-to-edge difference across one tire above this is a camber hint.
    pub tread_spread: f64,
}

impl Default for AdvisoryThresholds {
    fn default() -> Self {
        Self {
            critical: 230.0,
            cold: 150.0,
            imbalance: 15.0,
            tread_spread: 25.0,
        }
    }
}

/// Sliding-window trend detection.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendConfig {
    /// Seconds of history kept per tire.
    pub window_secs: f64,

    /// Rate (°F/s) needed to start rising or falling.
    pub enter_rate: f64,

    /// Rate (°F/s) below which a rising or falling trend ends.
    pub exit_rate: f64,

    /// History span (s) required before any trend is reported.
    pub min_span_secs: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window_secs: 5.0,
            enter_rate: 0.5,
            exit_rate: 0.2,
            min_span_secs: 2.0,
        }
    }
}

/// Configuration for [`super::PredictionCoordinator`].
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    pub physics_confidence: f64,
    pub max_validation_mae: f64,
    pub layers: LayerToggles,
    pub advisories: AdvisoryThresholds,
    pub trend: TrendConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            physics_confidence: PHYSICS_CONFIDENCE,
            max_validation_mae: DEFAULT_MAX_VALIDATION_MAE,
            layers: LayerToggles::default(),
            advisories: AdvisoryThresholds::default(),
            trend: TrendConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    pub fn with_layers(mut self, layers: LayerToggles) -> Self {
        self.layers = layers;
        self
    }

    pub fn with_max_validation_mae(mut self, mae: f64) -> Self {
        self.max_validation_mae = mae;
        self
    }

    pub fn with_advisories(mut self, advisories: AdvisoryThresholds) -> Self {
        self.advisories = advisories;
        self
    }

    /// Confidence of a model with the given mean validation error.
    pub fn model_confidence(&self, mae: f64) -> f64 {
        MODEL_CONFIDENCE_CEILING * (1.0 - mae / MODEL_MAE_SCALE).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_confidence_scales_with_error() {
        let config = CoordinatorConfig::default();
        assert!((config.model_confidence(0.0) - 0.95).abs() < 1e-12);
        assert!((config.model_confidence(25.0) - 0.475).abs() < 1e-12);
        assert_eq!(config.model_confidence(80.0), 0.0);
    }

    #[test]
    fn test_physics_only_disables_learned_layers() {
        let toggles = LayerToggles::physics_only();
        assert!(!toggles.car_class_pattern && !toggles.track_pattern && !toggles.model);
    }
}
