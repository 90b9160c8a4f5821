//! Deterministic thermodynamic tire model.
//!
//! The physics layer is the only layer that is always available: it needs
//! no history, no learned data and never fails. Each tick it integrates
//! heat input from driver inputs and cornering load against convective
//! cooling towards a floor set by ambient and track temperature.
//!
//! # Heat balance (per tire, per zone)
//!
//! ```text
//! heat    = load × (throttle·Kt·share_t + brake·Kb·share_b
//!                   + zone_factor·|lat g|·Kl + speed/100·Ks) · dt
//!         + stint_minutes · Kstint · dt
//! cooling = min(1, (Kc + speed/100·Kcs) · dt) · max(temp − floor, 0)
//! next    = clamp(prev + heat − cooling, floor, ceiling)
//! ```
//!
//! `load` depends only on accelerations, so heat is monotonic in throttle
//! and brake, and cooling is monotonic in speed.

mod config;
mod model;

pub use config::PhysicsConfig;
pub use model::{PhysicsModel, ThermalState};
