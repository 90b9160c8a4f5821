//! Tire and tread zone identifiers and the 4 × 3 temperature grid.

use serde::{Deserialize, Serialize};

/// One of the four tires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tire {
    LeftFront,
    RightFront,
    LeftRear,
    RightRear,
}

impl Tire {
    /// All tires in grid order.
    pub const ALL: [Tire; 4] = [
        Tire::LeftFront,
        Tire::RightFront,
        Tire::LeftRear,
        Tire::RightRear,
    ];

    /// Row of this tire in a [`TireTemps`] grid.
    pub fn index(self) -> usize {
        match self {
            Tire::LeftFront => 0,
            Tire::RightFront => 1,
            Tire::LeftRear => 2,
            Tire::RightRear => 3,
        }
    }

    /// Short label as shown on timing screens.
    pub fn label(self) -> &'static str {
        match self {
            Tire::LeftFront => "LF",
            Tire::RightFront => "RF",
            Tire::LeftRear => "LR",
            Tire::RightRear => "RR",
        }
    }

    pub fn is_front(self) -> bool {
        matches!(self, Tire::LeftFront | Tire::RightFront)
    }

    pub fn is_left(self) -> bool {
        matches!(self, Tire::LeftFront | Tire::LeftRear)
    }

    /// The tread zone on the outside edge of the car.
    pub fn outer_zone(self) -> Zone {
        if self.is_left() {
            Zone::Left
        } else {
            Zone::Right
        }
    }

    /// The tread zone facing the car's centreline.
    pub fn inner_zone(self) -> Zone {
        if self.is_left() {
            Zone::Right
        } else {
            Zone::Left
        }
    }
}

impl std::fmt::Display for Tire {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Tread zone across the width of a tire, viewed from behind the car.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Zone {
    Left,
    Center,
    Right,
}

impl Zone {
    /// All zones in grid order.
    pub const ALL: [Zone; 3] = [Zone::Left, Zone::Center, Zone::Right];

    /// Column of this zone in a [`TireTemps`] grid.
    pub fn index(self) -> usize {
        match self {
            Zone::Left => 0,
            Zone::Center => 1,
            Zone::Right => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Zone::Left => "L",
            Zone::Center => "C",
            Zone::Right => "R",
        }
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Temperatures for every (tire, zone) pair, in °F.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TireTemps([[f64; 3]; 4]);

impl TireTemps {
    /// Every zone of every tire at the same temperature.
    pub fn uniform(temp: f64) -> Self {
        Self([[temp; 3]; 4])
    }

    /// Build from a raw grid indexed `[tire][zone]`.
    pub fn from_grid(grid: [[f64; 3]; 4]) -> Self {
        Self(grid)
    }

    /// Build by evaluating `f` for each (tire, zone).
    pub fn from_fn(mut f: impl FnMut(Tire, Zone) -> f64) -> Self {
        let mut grid = [[0.0; 3]; 4];
        for tire in Tire::ALL {
            for zone in Zone::ALL {
                grid[tire.index()][zone.index()] = f(tire, zone);
            }
        }
        Self(grid)
    }

    pub fn grid(&self) -> &[[f64; 3]; 4] {
        &self.0
    }

    pub fn get(&self, tire: Tire, zone: Zone) -> f64 {
        self.0[tire.index()][zone.index()]
    }

    pub fn set(&mut self, tire: Tire, zone: Zone, temp: f64) {
        self.0[tire.index()][zone.index()] = temp;
    }

    /// The three zone temperatures of one tire.
    pub fn tire(&self, tire: Tire) -> [f64; 3] {
        self.0[tire.index()]
    }

    /// Mean across the tread of one tire.
    pub fn tire_average(&self, tire: Tire) -> f64 {
        self.0[tire.index()].iter().sum::<f64>() / 3.0
    }

    /// Hottest minus coldest zone of one tire.
    pub fn spread(&self, tire: Tire) -> f64 {
        let zones = self.0[tire.index()];
        let max = zones.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = zones.iter().copied().fold(f64::INFINITY, f64::min);
        max - min
    }

    /// Mean of all twelve readings.
    pub fn average(&self) -> f64 {
        self.0.iter().flatten().sum::<f64>() / 12.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tire, Zone, f64)> + '_ {
        Tire::ALL.into_iter().flat_map(move |tire| {
            Zone::ALL
                .into_iter()
                .map(move |zone| (tire, zone, self.get(tire, zone)))
        })
    }

    /// Apply `f` to every reading.
    pub fn map(&self, mut f: impl FnMut(Tire, Zone, f64) -> f64) -> Self {
        Self::from_fn(|tire, zone| f(tire, zone, self.get(tire, zone)))
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().flatten().all(|t| t.is_finite())
    }
}
