//! Forecast output.

use serde::Serialize;

use super::advisory::Advisory;
use super::trend::TireTrend;
use crate::telemetry::TireTemps;

/// A forecasting layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Layer {
    Physics,
    CarClassPattern,
    TrackPattern,
    Model,
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Layer::Physics => "physics",
            Layer::CarClassPattern => "car-class",
            Layer::TrackPattern => "track",
            Layer::Model => "model",
        };
        f.write_str(name)
    }
}

/// One layer's estimate and how much it is trusted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerContribution {
    pub layer: Layer,
    pub confidence: f64,
    pub temps: TireTemps,
}

/// The blended forecast for one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    /// Timestamp of the sample this forecast is for.
    pub timestamp: f64,

    pub temps: TireTemps,

    /// Overall confidence in [0, 1].
    pub confidence: f64,

    /// Per tire, in [`crate::telemetry::Tire::ALL`] order.
    pub trends: [TireTrend; 4],

    pub advisories: Vec<Advisory>,

    /// Layers that contributed, strongest evidence last.
    pub layers: Vec<LayerContribution>,

    /// Temperatures are a pit measurement, not a forecast.
    pub measured: bool,
}

impl PredictionResult {
    /// A placeholder with no information, used before any sample was accepted.
    pub fn empty(timestamp: f64) -> Self {
        Self {
            timestamp,
            temps: TireTemps::default(),
            confidence: 0.0,
            trends: [TireTrend::default(); 4],
            advisories: Vec::new(),
            layers: Vec::new(),
            measured: false,
        }
    }

    pub fn layer(&self, layer: Layer) -> Option<&LayerContribution> {
        self.layers.iter().find(|c| c.layer == layer)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Confidence-weighted blend of the given layers.
///
/// Returns `None` when no layer carries positive confidence. Overall
/// confidence is the strongest layer's.
pub fn blend(layers: &[LayerContribution]) -> Option<(TireTemps, f64)> {
    let total: f64 = layers.iter().map(|c| c.confidence.max(0.0)).sum();
    if total <= 0.0 {
        return None;
    }

    let temps = TireTemps::from_fn(|tire, zone| {
        layers
            .iter()
            .map(|c| c.confidence.max(0.0) * c.temps.get(tire, zone))
            .sum::<f64>()
            / total
    });
    let confidence = layers
        .iter()
        .map(|c| c.confidence)
        .fold(0.0_f64, f64::max)
        .clamp(0.0, 1.0);

    Some((temps, confidence))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(layer: Layer, confidence: f64, temp: f64) -> LayerContribution {
        LayerContribution {
            layer,
            confidence,
            temps: TireTemps::uniform(temp),
        }
    }

    #[test]
    fn test_blend_weights_by_confidence() {
        let (temps, confidence) = blend(&[
            layer(Layer::Physics, 0.25, 160.0),
            layer(Layer::Model, 0.75, 200.0),
        ])
        .unwrap();
        assert!((temps.average() - 190.0).abs() < 1e-9);
        assert_eq!(confidence, 0.75);
    }

    #[test]
    fn test_blend_without_confidence() {
        assert!(blend(&[]).is_none());
        assert!(blend(&[layer(Layer::Physics, 0.0, 160.0)]).is_none());
    }

    #[test]
    fn test_json_output() {
        let mut result = PredictionResult::empty(12.0);
        result.layers.push(layer(Layer::Physics, 0.35, 170.0));
        let json = result.to_json().unwrap();
        assert!(json.contains("\"measured\":false"));
        assert!(json.contains("\"Physics\""));
        assert!(result.layer(Layer::Physics).is_some());
        assert!(result.layer(Layer::Model).is_none());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn confidence_never_exceeds_strongest_layer(
                confidences in proptest::collection::vec(0.0f64..=1.0, 1..4),
                temps in proptest::collection::vec(100.0f64..260.0, 4),
            ) {
                let layers: Vec<_> = confidences
                    .iter()
                    .zip(&temps)
                    .map(|(c, t)| layer(Layer::Physics, *c, *t))
                    .collect();
                let strongest = confidences.iter().cloned().fold(0.0, f64::max);

                if let Some((blended, confidence)) = blend(&layers) {
                    prop_assert!((0.0..=1.0).contains(&confidence));
                    prop_assert!(confidence <= strongest + 1e-12);
                    let lo = temps.iter().cloned().fold(f64::INFINITY, f64::min);
                    let hi = temps.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                    prop_assert!(blended.average() >= lo - 1e-9);
                    prop_assert!(blended.average() <= hi + 1e-9);
                }
            }

            #[test]
            fn adding_a_layer_never_lowers_confidence(
                base in 0.01f64..=1.0,
                extra in 0.0f64..=1.0,
            ) {
                let one = [layer(Layer::Physics, base, 170.0)];
                let two = [layer(Layer::Physics, base, 170.0), layer(Layer::Model, extra, 190.0)];
                let (_, c1) = blend(&one).unwrap();
                let (_, c2) = blend(&two).unwrap();
                prop_assert!(c2 >= c1);
            }
        }
    }
}
