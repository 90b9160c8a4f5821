//! Statistical tire temperature profiles learned from recorded sessions.
//!
//! Two aggregate kinds are maintained:
//!
//! - [`CarClassPattern`]: how temperatures evolve over a stint for a class
//!   of car, regardless of track.
//! - [`TrackPattern`]: the same stint curve per track, plus where on the lap
//!   the car corners hard enough to heat the loaded tires.
//!
//! Aggregates hold integer sums only (milli-degrees, milli-g), so merging is
//! exactly associative and commutative: the order sessions are folded in
//! never changes the result.
//!
//! # Concurrency
//!
//! ```text
//!  readers (predict, every tick)         single writer (fold / persist)
//!        │                                        │
//!        ▼                                        ▼
//!  RwLock<Arc<PatternSnapshot>> ◄── swap ── new snapshot built off-lock
//! ```
//!
//! Readers clone the `Arc` and never wait on a fold in progress.

mod aggregate;
mod learner;
mod snapshot;

pub use aggregate::{
    confidence_for, CarClassPattern, CornerHeating, CornerProfile, StintCurve, TrackPattern,
    CORNER_THRESHOLD_G, LAP_BINS, STINT_BIN_SECS,
};
pub use learner::PatternLearner;
pub use snapshot::{
    PatternEstimate, PatternQuery, PatternSnapshot, PatternStats, PatternSummary,
    CORNER_HEAT_PER_G,
};
