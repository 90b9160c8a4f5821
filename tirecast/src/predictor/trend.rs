//! Per-tire temperature trends with hysteresis.
//!
//! Each tire keeps a short time window of its average temperature. The rate
//! across the window drives a small state machine:
//!
//! ```text
//!            rate > enter                 rate < -enter
//!   Steady ──────────────► Rising   Steady ──────────────► Falling
//!      ▲                     │         ▲                      │
//!      └── rate ≤ exit ──────┘         └──── rate ≥ -exit ────┘
//! ```
//!
//! Separate enter and exit rates keep the trend from flickering when the
//! rate hovers near a single threshold.

use std::collections::VecDeque;

use serde::Serialize;

use super::config::TrendConfig;

/// Direction of a tire's temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Trend {
    Rising,
    Falling,
    Steady,
    #[default]
    Unknown,
}

impl Trend {
    pub fn symbol(self) -> &'static str {
        match self {
            Trend::Rising => "↑",
            Trend::Falling => "↓",
            Trend::Steady => "→",
            Trend::Unknown => "?",
        }
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Trend of one tire.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TireTrend {
    pub trend: Trend,

    /// °F per second across the window, 0 while unknown.
    pub rate_per_sec: f64,
}

/// Sliding-window trend detector for one tire.
#[derive(Debug, Clone)]
pub struct TrendTracker {
    config: TrendConfig,
    window: VecDeque<(f64, f64)>,
    current: Trend,
}

impl TrendTracker {
    pub fn new(config: TrendConfig) -> Self {
        Self {
            config,
            window: VecDeque::new(),
            current: Trend::Unknown,
        }
    }

    pub fn current(&self) -> Trend {
        self.current
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.current = Trend::Unknown;
    }

    /// Add a tire average observed at `timestamp`.
    pub fn update(&mut self, timestamp: f64, temp: f64) -> TireTrend {
        if self.window.back().is_some_and(|&(t, _)| timestamp < t) {
            self.reset();
        }

        self.window.push_back((timestamp, temp));
        while self
            .window
            .front()
            .is_some_and(|&(t, _)| timestamp - t > self.config.window_secs)
        {
            self.window.pop_front();
        }

        let (Some(&(t0, v0)), Some(&(t1, v1))) = (self.window.front(), self.window.back()) else {
            return TireTrend::default();
        };
        let span = t1 - t0;
        if span < self.config.min_span_secs {
            return TireTrend {
                trend: self.current,
                rate_per_sec: 0.0,
            };
        }

        let rate = (v1 - v0) / span;
        self.current = self.next_state(rate);
        TireTrend {
            trend: self.current,
            rate_per_sec: rate,
        }
    }

    fn next_state(&self, rate: f64) -> Trend {
        let enter = self.config.enter_rate;
        let exit = self.config.exit_rate;

        match self.current {
            Trend::Rising if rate < -enter => Trend::Falling,
            Trend::Rising if rate > exit => Trend::Rising,
            Trend::Falling if rate > enter => Trend::Rising,
            Trend::Falling if rate < -exit => Trend::Falling,
            _ if rate > enter => Trend::Rising,
            _ if rate < -enter => Trend::Falling,
            _ => Trend::Steady,
        }
    }
}

impl Default for TrendTracker {
    fn default() -> Self {
        Self::new(TrendConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(tracker: &mut TrendTracker, start: f64, temps: &[f64]) -> TireTrend {
        let mut last = TireTrend::default();
        for (i, temp) in temps.iter().enumerate() {
            last = tracker.update(start + i as f64, *temp);
        }
        last
    }

    #[test]
    fn test_unknown_until_enough_history() {
        let mut tracker = TrendTracker::default();
        assert_eq!(tracker.update(0.0, 180.0).trend, Trend::Unknown);
        assert_eq!(tracker.update(1.0, 181.0).trend, Trend::Unknown);
        assert_eq!(tracker.update(2.0, 182.0).trend, Trend::Rising);
    }

    #[test]
    fn test_rising_and_falling() {
        let mut tracker = TrendTracker::default();
        let rising = feed(&mut tracker, 0.0, &[180.0, 181.0, 182.0, 183.0]);
        assert_eq!(rising.trend, Trend::Rising);
        assert!((rising.rate_per_sec - 1.0).abs() < 1e-9);

        let mut tracker = TrendTracker::default();
        let falling = feed(&mut tracker, 0.0, &[190.0, 189.0, 188.0, 187.0]);
        assert_eq!(falling.trend, Trend::Falling);
    }

    #[test]
    fn test_hysteresis_holds_rising_between_thresholds() {
        let mut tracker = TrendTracker::default();
        feed(&mut tracker, 0.0, &[180.0, 181.0, 182.0, 183.0, 184.0, 185.0]);
        assert_eq!(tracker.current(), Trend::Rising);

        // 0.3 °F/s sits between exit (0.2) and enter (0.5)
        let mut t = 6.0;
        let mut temp = 185.0;
        for _ in 0..8 {
            temp += 0.3;
            tracker.update(t, temp);
            t += 1.0;
        }
        assert_eq!(tracker.current(), Trend::Rising);

        // A fresh tracker at the same rate never enters
        let mut fresh = TrendTracker::default();
        let result = feed(&mut fresh, 0.0, &[180.0, 180.3, 180.6, 180.9]);
        assert_eq!(result.trend, Trend::Steady);
    }

    #[test]
    fn test_flat_temperatures_become_steady() {
        let mut tracker = TrendTracker::default();
        feed(&mut tracker, 0.0, &[180.0, 181.0, 182.0, 183.0]);
        let result = feed(&mut tracker, 4.0, &[183.0; 7]);
        assert_eq!(result.trend, Trend::Steady);
    }

    #[test]
    fn test_clock_reset_forgets_history() {
        let mut tracker = TrendTracker::default();
        feed(&mut tracker, 10.0, &[180.0, 181.0, 182.0, 183.0]);
        assert_eq!(tracker.update(0.0, 150.0).trend, Trend::Unknown);
    }

    #[test]
    fn test_symbols() {
        assert_eq!(Trend::Rising.to_string(), "↑");
        assert_eq!(Trend::Falling.symbol(), "↓");
        assert_eq!(Trend::Steady.symbol(), "→");
        assert_eq!(Trend::Unknown.symbol(), "?");
    }
}
