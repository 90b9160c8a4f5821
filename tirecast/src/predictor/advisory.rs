//! Driver advisories derived from a forecast.

use serde::Serialize;

use super::config::AdvisoryThresholds;
use super::trend::{TireTrend, Trend};
use crate::telemetry::{Tire, TireTemps};

/// Front or rear axle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Axle {
    Front,
    Rear,
}

impl Axle {
    fn tires(self) -> (Tire, Tire) {
        match self {
            Axle::Front => (Tire::LeftFront, Tire::RightFront),
            Axle::Rear => (Tire::LeftRear, Tire::RightRear),
        }
    }
}

impl std::fmt::Display for Axle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axle::Front => f.write_str("front"),
            Axle::Rear => f.write_str("rear"),
        }
    }
}

/// A condition worth telling the driver about.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Advisory {
    Overheating { tire: Tire, temp: f64 },
    Cold { tire: Tire, temp: f64 },
    Imbalance { axle: Axle, hotter: Tire, delta: f64 },
    TreadSpread { tire: Tire, spread: f64 },
}

impl std::fmt::Display for Advisory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Advisory::Overheating { tire, temp } => {
                write!(f, "{} overheating ({:.0}°F)", tire, temp)
            }
            Advisory::Cold { tire, temp } => write!(f, "{} cold ({:.0}°F)", tire, temp),
            Advisory::Imbalance {
                axle,
                hotter,
                delta,
            } => write!(f, "{} imbalance, {} hotter by {:.0}°F", axle, hotter, delta),
            Advisory::TreadSpread { tire, spread } => {
                write!(f, "{} tread spread {:.0}°F, check camber", tire, spread)
            }
        }
    }
}

/// Evaluate every advisory rule. Output order is stable.
pub fn evaluate(
    temps: &TireTemps,
    trends: &[TireTrend; 4],
    thresholds: &AdvisoryThresholds,
) -> Vec<Advisory> {
    let mut advisories = Vec::new();

    for tire in Tire::ALL {
        let temp = temps.tire_average(tire);
        if temp >= thresholds.critical {
            advisories.push(Advisory::Overheating { tire, temp });
        } else if temp <= thresholds.cold && trends[tire.index()].trend != Trend::Rising {
            advisories.push(Advisory::Cold { tire, temp });
        }
    }

    for axle in [Axle::Front, Axle::Rear] {
        let (left, right) = axle.tires();
        let delta = temps.tire_average(left) - temps.tire_average(right);
        if delta.abs() > thresholds.imbalance {
            let hotter = if delta > 0.0 { left } else { right };
            advisories.push(Advisory::Imbalance {
                axle,
                hotter,
                delta: delta.abs(),
            });
        }
    }

    for tire in Tire::ALL {
        let spread = temps.spread(tire);
        if spread > thresholds.tread_spread {
            advisories.push(Advisory::TreadSpread { tire, spread });
        }
    }

    advisories
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Zone;

    fn steady() -> [TireTrend; 4] {
        [TireTrend {
            trend: Trend::Steady,
            rate_per_sec: 0.0,
        }; 4]
    }

    #[test]
    fn test_nominal_temps_have_no_advisories() {
        let temps = TireTemps::uniform(190.0);
        assert!(evaluate(&temps, &steady(), &AdvisoryThresholds::default()).is_empty());
    }

    #[test]
    fn test_overheating_at_threshold() {
        let mut temps = TireTemps::uniform(190.0);
        for zone in Zone::ALL {
            temps.set(Tire::RightFront, zone, 230.0);
        }
        let advisories = evaluate(&temps, &steady(), &AdvisoryThresholds::default());
        assert!(advisories.contains(&Advisory::Overheating {
            tire: Tire::RightFront,
            temp: 230.0
        }));
    }

    #[test]
    fn test_cold_only_when_not_rising() {
        let temps = TireTemps::uniform(140.0);
        let thresholds = AdvisoryThresholds::default();
        assert_eq!(evaluate(&temps, &steady(), &thresholds).len(), 4);

        let mut trends = steady();
        trends[Tire::LeftRear.index()].trend = Trend::Rising;
        let advisories = evaluate(&temps, &trends, &thresholds);
        assert_eq!(advisories.len(), 3);
        assert!(!advisories
            .iter()
            .any(|a| matches!(a, Advisory::Cold { tire: Tire::LeftRear, .. })));
    }

    #[test]
    fn test_axle_imbalance_names_hotter_side() {
        let temps = TireTemps::from_fn(|tire, _| match tire {
            Tire::RightRear => 210.0,
            _ => 190.0,
        });
        let advisories = evaluate(&temps, &steady(), &AdvisoryThresholds::default());
        assert_eq!(
            advisories,
            vec![Advisory::Imbalance {
                axle: Axle::Rear,
                hotter: Tire::RightRear,
                delta: 20.0
            }]
        );
        assert_eq!(
            advisories[0].to_string(),
            "rear imbalance, RR hotter by 20°F"
        );
    }

    #[test]
    fn test_tread_spread() {
        let temps = TireTemps::from_fn(|tire, zone| match (tire, zone) {
            (Tire::LeftFront, Zone::Left) => 215.0,
            (Tire::LeftFront, Zone::Right) => 185.0,
            _ => 200.0,
        });
        let advisories = evaluate(&temps, &steady(), &AdvisoryThresholds::default());
        assert!(matches!(
            advisories.as_slice(),
            [Advisory::TreadSpread {
                tire: Tire::LeftFront,
                ..
            }]
        ));
    }
}
