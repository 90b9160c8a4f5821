//! Pit lane state detection.

use tracing::debug;

/// Default speed below which a car in the pit lane counts as stationary.
pub const DEFAULT_STATIONARY_SPEED_KPH: f64 = 1.0;

/// Where the car is relative to the pit box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PitState {
    #[default]
    OnTrack,

    /// In the pit lane and still rolling.
    ApproachingPit,

    /// Stopped in the pit box. Tire temperatures are measurable here.
    InPit,
}

impl std::fmt::Display for PitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PitState::OnTrack => write!(f, "on-track"),
            PitState::ApproachingPit => write!(f, "approaching-pit"),
            PitState::InPit => write!(f, "in-pit"),
        }
    }
}

/// Tracks pit state and whether this stop has produced ground truth yet.
#[derive(Debug)]
pub struct PitDetector {
    state: PitState,
    stationary_speed_kph: f64,
    captured: bool,
}

impl PitDetector {
    pub fn new(stationary_speed_kph: f64) -> Self {
        Self {
            state: PitState::OnTrack,
            stationary_speed_kph,
            captured: false,
        }
    }

    pub fn state(&self) -> PitState {
        self.state
    }

    /// Advance the state machine with one tick.
    pub fn update(&mut self, in_pit: bool, speed_kph: f64) -> PitState {
        let stationary = speed_kph <= self.stationary_speed_kph;

        let next = match (self.state, in_pit) {
            (_, false) => PitState::OnTrack,
            // Once stopped, stay in the box until the pit flag clears
            (PitState::InPit, true) => PitState::InPit,
            (_, true) if stationary => PitState::InPit,
            (_, true) => PitState::ApproachingPit,
        };

        if next != self.state {
            debug!(from = %self.state, to = %next, speed_kph, "Pit state transition");
            if self.state == PitState::InPit {
                self.captured = false;
            }
            self.state = next;
        }

        next
    }

    /// Whether the current stop still needs its ground truth sample.
    pub fn should_capture(&self) -> bool {
        self.state == PitState::InPit && !self.captured
    }

    pub fn mark_captured(&mut self) {
        self.captured = true;
    }

    pub fn reset(&mut self) {
        self.state = PitState::OnTrack;
        self.captured = false;
    }
}

impl Default for PitDetector {
    fn default() -> Self {
        Self::new(DEFAULT_STATIONARY_SPEED_KPH)
    }
}
