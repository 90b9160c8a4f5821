//! Per-tick physics estimator.

use serde::{Deserialize, Serialize};

use super::config::PhysicsConfig;
use crate::telemetry::{TelemetrySample, Tire, TireTemps, Zone};

/// The physics layer's running estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermalState {
    pub temps: TireTemps,

    /// Timestamp of the sample that produced this state, if any.
    pub timestamp: Option<f64>,
}

impl ThermalState {
    pub fn new(temps: TireTemps, timestamp: Option<f64>) -> Self {
        Self { temps, timestamp }
    }
}

/// Stateless thermodynamic estimator.
///
/// All state lives in the [`ThermalState`] passed in and returned, so one
/// model can serve any number of cars.
#[derive(Debug, Clone, Default)]
pub struct PhysicsModel {
    config: PhysicsConfig,
}

impl PhysicsModel {
    pub fn new(config: PhysicsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// A state sitting at the cooling floor for this sample's conditions.
    pub fn initial_state(&self, sample: &TelemetrySample) -> ThermalState {
        ThermalState::new(TireTemps::uniform(self.temperature_floor(sample)), None)
    }

    /// Seed a state from temperatures measured in the pits.
    pub fn calibrate(&self, measured: &TireTemps, timestamp: f64) -> ThermalState {
        ThermalState::new(*measured, Some(timestamp))
    }

    /// Advance `previous` by one sample.
    pub fn estimate(&self, sample: &TelemetrySample, previous: &ThermalState) -> ThermalState {
        let dt = self.effective_dt(sample, previous.timestamp);
        let floor = self.temperature_floor(sample);
        let ceiling = self.config.ceiling.max(floor);

        let temps = TireTemps::from_fn(|tire, zone| {
            let prev = previous.temps.get(tire, zone);
            let heat = self.heat_term(sample, tire, zone, dt);
            let cooling = self.cooling_term(sample, prev, floor, dt);
            (prev + heat - cooling).clamp(floor, ceiling)
        });

        ThermalState::new(temps, Some(sample.timestamp))
    }

    /// Lowest temperature a tire cools to: ambient pulled towards track.
    pub fn temperature_floor(&self, sample: &TelemetrySample) -> f64 {
        sample.ambient_temp + (sample.track_temp - sample.ambient_temp) * self.config.track_influence
    }

    /// Heat added to one zone over `dt` seconds.
    pub fn heat_term(&self, sample: &TelemetrySample, tire: Tire, zone: Zone, dt: f64) -> f64 {
        let c = &self.config;

        let drive_share = if tire.is_front() {
            c.front_drive_share
        } else {
            1.0
        };
        let brake_share = if tire.is_front() {
            1.0
        } else {
            c.rear_brake_share
        };

        let dynamic = sample.throttle * c.throttle_heat * drive_share
            + sample.brake * c.brake_heat * brake_share
            + self.zone_factor(sample, tire, zone) * sample.lateral_g.abs() * c.lateral_heat
            + sample.speed_kph / 100.0 * c.speed_heat;

        let stint = sample.stint_time / 60.0 * c.stint_heat_rate;

        (self.load_factor(sample, tire) * dynamic + stint) * dt
    }

    /// Heat lost by a zone at `temp` over `dt` seconds.
    pub fn cooling_term(&self, sample: &TelemetrySample, temp: f64, floor: f64, dt: f64) -> f64 {
        let c = &self.config;
        let fraction = ((c.cooling_base + sample.speed_kph / 100.0 * c.speed_cooling) * dt).min(1.0);
        fraction * (temp - floor).max(0.0)
    }

    /// Static weight transfer onto a tire, in [0.5, 2.0].
    pub fn load_factor(&self, sample: &TelemetrySample, tire: Tire) -> f64 {
        let mut load = 1.0;

        let lateral = sample.lateral_g.abs();
        if self.on_loaded_side(sample, tire) {
            load += 0.3 * lateral;
        } else {
            load -= 0.2 * lateral;
        }

        let longitudinal = sample.longitudinal_g;
        if longitudinal < 0.0 {
            // Braking pitches weight forward
            if tire.is_front() {
                load += 0.25 * -longitudinal;
            } else {
                load -= 0.15 * -longitudinal;
            }
        } else if tire.is_front() {
            load -= 0.1 * longitudinal;
        } else {
            load += 0.2 * longitudinal;
        }

        load.clamp(0.5, 2.0)
    }

    /// How strongly cornering heats each zone of a tire.
    fn zone_factor(&self, sample: &TelemetrySample, tire: Tire, zone: Zone) -> f64 {
        if sample.lateral_g.abs() < self.config.straight_threshold_g {
            return if zone == Zone::Center { 1.0 } else { 0.8 };
        }

        if self.on_loaded_side(sample, tire) {
            if zone == tire.outer_zone() {
                1.3
            } else if zone == Zone::Center {
                1.0
            } else {
                0.7
            }
        } else if zone == tire.inner_zone() {
            1.2
        } else {
            0.8
        }
    }

    fn on_loaded_side(&self, sample: &TelemetrySample, tire: Tire) -> bool {
        (sample.lateral_g > 0.0) != tire.is_left()
    }

    fn effective_dt(&self, sample: &TelemetrySample, previous: Option<f64>) -> f64 {
        match previous {
            Some(prev) => {
                let dt = sample.timestamp - prev;
                if dt <= 0.0 || dt > self.config.max_dt {
                    self.config.nominal_dt
                } else {
                    dt
                }
            }
            None => self.config.nominal_dt,
        }
    }
}
