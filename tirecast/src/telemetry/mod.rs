//! Telemetry data model shared by every component.
//!
//! Samples are pushed in by an external collaborator (a simulator bridge).
//! They are immutable once built and validated at the engine boundary, so
//! nothing downstream ever sees a non-finite value.
//!
//! # Conventions
//!
//! ```text
//! Temperatures   °F
//! Speed          km/h
//! Accelerations  g   (lateral > 0 loads the right-hand tires,
//!                     longitudinal < 0 is braking)
//! Time           seconds on the simulator clock
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tirecast::telemetry::{TelemetrySample, Tire, Zone, TireTemps};
//!
//! let sample = TelemetrySample::new("race-42", 1250.0)
//!     .with_speed(212.0)
//!     .with_pedals(1.0, 0.0)
//!     .with_g(1.4, 0.2);
//! sample.validate()?;
//!
//! let temps = TireTemps::uniform(180.0);
//! assert_eq!(temps.get(Tire::LeftFront, Zone::Center), 180.0);
//! ```

mod sample;
mod tire;

pub use sample::{GroundTruthSample, SampleError, SessionInfo, TelemetrySample};
pub use tire::{Tire, TireTemps, Zone};
