//! Physics model coefficients.

/// Default tire temperature ceiling (°F).
pub const DEFAULT_CEILING_F: f64 = 300.0;

/// Coefficients for the thermodynamic model.
///
/// Heat coefficients are in °F per second at full input and unit load.
#[derive(Debug, Clone)]
pub struct PhysicsConfig {
    /// Heat at full throttle.
    pub throttle_heat: f64,

    /// Heat at full brake.
    pub brake_heat: f64,

    /// Heat per g of lateral acceleration.
    pub lateral_heat: f64,

    /// Rolling heat per 100 km/h.
    pub speed_heat: f64,

    /// Heat per stint minute (carcass heat soak).
    pub stint_heat_rate: f64,

    /// Share of throttle heat taken by the fronts (rears take all of it).
    pub front_drive_share: f64,

    /// Share of brake heat taken by the rears (fronts take all of it).
    pub rear_brake_share: f64,

    /// Cooling fraction per second when stationary.
    pub cooling_base: f64,

    /// Extra cooling fraction per second per 100 km/h.
    pub speed_cooling: f64,

    /// How far the floor sits from ambient towards track temperature.
    pub track_influence: f64,

    /// Upper clamp on any estimate.
    pub ceiling: f64,

    /// Lateral acceleration below which the car is treated as straight.
    pub straight_threshold_g: f64,

    /// Time step used when the sample clock is unusable.
    pub nominal_dt: f64,

    /// Largest time step trusted from the sample clock.
    pub max_dt: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            throttle_heat: 3.5,
            brake_heat: 5.0,
            lateral_heat: 1.5,
            speed_heat: 0.8,
            stint_heat_rate: 0.01,
            front_drive_share: 0.25,
            rear_brake_share: 0.6,
            cooling_base: 0.03,
            speed_cooling: 0.015,
            track_influence: 0.4,
            ceiling: DEFAULT_CEILING_F,
            straight_threshold_g: 0.3,
            nominal_dt: 1.0,
            max_dt: 2.0,
        }
    }
}

impl PhysicsConfig {
    /// Set the temperature ceiling.
    pub fn with_ceiling(mut self, ceiling: f64) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Set the track temperature influence on the cooling floor.
    pub fn with_track_influence(mut self, influence: f64) -> Self {
        self.track_influence = influence;
        self
    }
}
