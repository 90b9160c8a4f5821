//! Telemetry samples, pit-stop ground truth and session metadata.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::tire::TireTemps;

/// Reasons a telemetry sample is rejected at the boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    #[error("sample field `{field}` is not finite")]
    NonFinite { field: &'static str },

    #[error("sample field `{field}` out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("sample has an empty session id")]
    MissingSession,
}

/// Metadata for one driving session.
///
/// Supplied by the simulator bridge whenever the session id changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub car_id: String,
    pub car_class: String,
    pub track_id: String,
}

impl SessionInfo {
    pub fn new(
        session_id: impl Into<String>,
        car_id: impl Into<String>,
        car_class: impl Into<String>,
        track_id: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            car_id: car_id.into(),
            car_class: car_class.into(),
            track_id: track_id.into(),
        }
    }
}

/// One telemetry reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Simulator clock, seconds.
    pub timestamp: f64,
    pub session_id: String,
    pub lap: u32,
    /// Fraction of the current lap completed, 0..1.
    pub lap_pct: f64,
    /// Seconds since the car last left the pits.
    pub stint_time: f64,
    pub speed_kph: f64,
    pub throttle: f64,
    pub brake: f64,
    pub clutch: f64,
    pub lateral_g: f64,
    pub longitudinal_g: f64,
    pub ambient_temp: f64,
    pub track_temp: f64,
    /// Cold-reference pressures in tire order, psi.
    pub pressures: [f64; 4],
    pub in_pit: bool,
}

impl TelemetrySample {
    /// A stationary car on track at mild conditions.
    pub fn new(session_id: impl Into<String>, timestamp: f64) -> Self {
        Self {
            timestamp,
            session_id: session_id.into(),
            lap: 1,
            lap_pct: 0.0,
            stint_time: 0.0,
            speed_kph: 0.0,
            throttle: 0.0,
            brake: 0.0,
            clutch: 0.0,
            lateral_g: 0.0,
            longitudinal_g: 0.0,
            ambient_temp: 77.0,
            track_temp: 95.0,
            pressures: [27.0; 4],
            in_pit: false,
        }
    }

    pub fn with_speed(mut self, speed_kph: f64) -> Self {
        self.speed_kph = speed_kph;
        self
    }

    pub fn with_pedals(mut self, throttle: f64, brake: f64) -> Self {
        self.throttle = throttle;
        self.brake = brake;
        self
    }

    pub fn with_g(mut self, lateral_g: f64, longitudinal_g: f64) -> Self {
        self.lateral_g = lateral_g;
        self.longitudinal_g = longitudinal_g;
        self
    }

    pub fn with_lap(mut self, lap: u32, lap_pct: f64) -> Self {
        self.lap = lap;
        self.lap_pct = lap_pct;
        self
    }

    pub fn with_stint_time(mut self, stint_time: f64) -> Self {
        self.stint_time = stint_time;
        self
    }

    pub fn with_conditions(mut self, ambient_temp: f64, track_temp: f64) -> Self {
        self.ambient_temp = ambient_temp;
        self.track_temp = track_temp;
        self
    }

    pub fn with_pit(mut self, in_pit: bool) -> Self {
        self.in_pit = in_pit;
        self
    }

    /// Mean of the four tire pressures.
    pub fn mean_pressure(&self) -> f64 {
        self.pressures.iter().sum::<f64>() / 4.0
    }

    /// Check every field is finite and within its physical range.
    pub fn validate(&self) -> Result<(), SampleError> {
        if self.session_id.is_empty() {
            return Err(SampleError::MissingSession);
        }

        let fields = [
            ("timestamp", self.timestamp),
            ("lap_pct", self.lap_pct),
            ("stint_time", self.stint_time),
            ("speed_kph", self.speed_kph),
            ("throttle", self.throttle),
            ("brake", self.brake),
            ("clutch", self.clutch),
            ("lateral_g", self.lateral_g),
            ("longitudinal_g", self.longitudinal_g),
            ("ambient_temp", self.ambient_temp),
            ("track_temp", self.track_temp),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(SampleError::NonFinite { field });
            }
        }
        if self.pressures.iter().any(|p| !p.is_finite()) {
            return Err(SampleError::NonFinite { field: "pressures" });
        }

        let unit_fields = [
            ("lap_pct", self.lap_pct),
            ("throttle", self.throttle),
            ("brake", self.brake),
            ("clutch", self.clutch),
        ];
        for (field, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(SampleError::OutOfRange { field, value });
            }
        }
        if self.speed_kph < 0.0 {
            return Err(SampleError::OutOfRange {
                field: "speed_kph",
                value: self.speed_kph,
            });
        }
        if self.stint_time < 0.0 {
            return Err(SampleError::OutOfRange {
                field: "stint_time",
                value: self.stint_time,
            });
        }

        Ok(())
    }
}

/// Temperatures measured while the car sat in the pit box.
///
/// Captured once per pit entry; these are the labels the per-car models
/// learn from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthSample {
    pub car_id: String,
    pub session_id: String,
    pub timestamp: f64,
    pub stint_time: f64,
    pub lap: u32,
    pub temps: TireTemps,
}

impl GroundTruthSample {
    pub fn from_sample(car_id: &str, sample: &TelemetrySample, temps: TireTemps) -> Self {
        Self {
            car_id: car_id.to_string(),
            session_id: sample.session_id.clone(),
            timestamp: sample.timestamp,
            stint_time: sample.stint_time,
            lap: sample.lap,
            temps,
        }
    }
}
