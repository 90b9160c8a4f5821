//! Confidence-weighted forecasting.
//!
//! Every tick the coordinator asks each available layer for an estimate and
//! blends them, weighting by confidence:
//!
//! ```text
//!   layer              confidence
//!   ─────────────────  ─────────────────────
//!   physics            0.35 (always present)
//!   car-class pattern  0.85 · (1 − e^(−n/4))
//!   track pattern      0.85 · (1 − e^(−n/4))      ──► blend ──► trends ──► advisories
//!   car model          0.95 · (1 − mae/50)
//! ```
//!
//! Overall confidence is that of the strongest contributing layer. Pit-box
//! measurements replace the forecast outright and carry zero confidence,
//! since nothing was predicted.
//!
//! # Example
//!
//! ```ignore
//! use tirecast::predictor::{CoordinatorConfig, PredictionCoordinator};
//!
//! let mut coordinator = PredictionCoordinator::new(
//!     CoordinatorConfig::default(),
//!     PhysicsModel::default(),
//!     learner,
//!     registry,
//! );
//! coordinator.set_session(Some(info));
//! let result = coordinator.predict(&sample, None)?;
//! println!("{}", result.to_json()?);
//! ```

mod advisory;
mod config;
mod coordinator;
mod metrics;
mod replay;
mod result;
mod trend;

pub use advisory::{evaluate as evaluate_advisories, Advisory, Axle};
pub use config::{
    AdvisoryThresholds, CoordinatorConfig, LayerToggles, TrendConfig, DEFAULT_MAX_VALIDATION_MAE,
    MODEL_CONFIDENCE_CEILING, MODEL_MAE_SCALE, PHYSICS_CONFIDENCE,
};
pub use coordinator::PredictionCoordinator;
pub use metrics::{CoordinatorMetrics, CoordinatorSnapshot};
pub use replay::{replay_session, ReplayPoint, ReplayReport};
pub use result::{blend, Layer, LayerContribution, PredictionResult};
pub use trend::{TireTrend, Trend, TrendTracker};
