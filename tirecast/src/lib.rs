//! Tirecast - continual tire temperature forecasting for sim-racing telemetry
//!
//! Tire carcass and tread temperatures are only measurable while the car is
//! stationary in the pits. Tirecast estimates them on every telemetry tick by
//! blending four layers of knowledge:
//!
//! ```text
//!                    TelemetrySample (per tick)
//!                              │
//!        ┌─────────────────────┼──────────────────────┐
//!        ▼                     ▼                      ▼
//!  ┌───────────┐      ┌────────────────┐      ┌──────────────┐
//!  │  Physics  │      │ Pattern lookup │      │ Per-car model│
//!  │  (always) │      │ class + track  │      │ (if trained) │
//!  └─────┬─────┘      └───────┬────────┘      └──────┬───────┘
//!        └────────────────────┼──────────────────────┘
//!                             ▼
//!                 PredictionCoordinator (blend)
//!                             │
//!                             ▼
//!              PredictionResult (temps, trend, advice)
//! ```
//!
//! In the background the [`collector`] records sessions and pit-stop ground
//! truth, the [`patterns`] learner folds them into statistical profiles, the
//! [`trainer`] fits per-car regressors at session end, and the [`storage`]
//! manager keeps raw data under a byte budget.
//!
//! [`engine::TireEngine`] wires all of it together.

pub mod artifact;
pub mod collector;
pub mod config;
pub mod engine;
pub mod logging;
pub mod patterns;
pub mod physics;
pub mod predictor;
pub mod session;
pub mod storage;
pub mod telemetry;
pub mod trainer;

/// Crate version, stamped into persisted model metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
