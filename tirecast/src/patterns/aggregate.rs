//! Strict-schema pattern aggregates and their merge rules.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::collector::SessionRecord;
use crate::telemetry::{GroundTruthSample, TelemetrySample, Tire, TireTemps, Zone};

/// Width of one stint-progression bin.
pub const STINT_BIN_SECS: f64 = 60.0;

/// Number of lap-distance bins (2 % of a lap each).
pub const LAP_BINS: u32 = 50;

/// Lateral acceleration above which a sample counts as cornering.
pub const CORNER_THRESHOLD_G: f64 = 1.0;

/// Samples a lap bin needs before it is reported as a corner.
pub const MIN_CORNER_SAMPLES: u64 = 3;

const SCALE: f64 = 1000.0;

fn to_fixed(value: f64) -> i64 {
    (value * SCALE).round() as i64
}

fn from_fixed(sum: i64, count: u64) -> f64 {
    sum as f64 / SCALE / count as f64
}

/// Confidence earned from `sessions` independent sessions.
///
/// Rises monotonically and saturates at 0.85, never reaching certainty.
pub fn confidence_for(sessions: usize) -> f64 {
    0.85 * (1.0 - (-(sessions as f64) / 4.0).exp())
}

// =============================================================================
// Stint curve
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StintBin {
    count: u64,
    sums: [[i64; 3]; 4],
}

impl StintBin {
    fn add(&mut self, temps: &TireTemps) {
        self.count += 1;
        for (tire, zone, temp) in temps.iter() {
            self.sums[tire.index()][zone.index()] += to_fixed(temp);
        }
    }

    fn merge(&mut self, other: &StintBin) {
        self.count += other.count;
        for t in 0..4 {
            for z in 0..3 {
                self.sums[t][z] += other.sums[t][z];
            }
        }
    }

    fn mean(&self) -> Option<TireTemps> {
        if self.count == 0 {
            return None;
        }
        Some(TireTemps::from_fn(|tire, zone| {
            from_fixed(self.sums[tire.index()][zone.index()], self.count)
        }))
    }
}

/// Distinct sessions counted into an aggregate.
///
/// Ids are kept only while a session's raw data can still be folded. Once
/// the raw data is deleted the session is retired to a plain count, so the
/// tally stays bounded by what is on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTally {
    live: BTreeSet<String>,
    retired: usize,
}

impl SessionTally {
    pub fn insert(&mut self, session_id: &str) {
        if !self.live.contains(session_id) {
            self.live.insert(session_id.to_string());
        }
    }

    pub fn merge(&mut self, other: &SessionTally) {
        self.live.extend(other.live.iter().cloned());
        self.retired += other.retired;
    }

    /// Whether a session still on disk is counted here.
    pub fn contains(&self, session_id: &str) -> bool {
        self.live.contains(session_id)
    }

    /// Forget a session's id but keep it in the count.
    pub fn retire(&mut self, session_id: &str) -> bool {
        if self.live.remove(session_id) {
            self.retired += 1;
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.live.len() + self.retired
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn retired(&self) -> usize {
        self.retired
    }
}

/// Mean measured temperatures by stint time, in fixed-width bins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StintCurve {
    bins: BTreeMap<u32, StintBin>,

    /// Sessions that contributed ground truth.
    sessions: SessionTally,
}

impl StintCurve {
    fn bin_index(stint_time: f64) -> u32 {
        (stint_time.max(0.0) / STINT_BIN_SECS).floor() as u32
    }

    fn bin_center(index: u32) -> f64 {
        (index as f64 + 0.5) * STINT_BIN_SECS
    }

    pub fn add(&mut self, gt: &GroundTruthSample) {
        self.bins
            .entry(Self::bin_index(gt.stint_time))
            .or_default()
            .add(&gt.temps);
        self.sessions.insert(&gt.session_id);
    }

    pub fn merge(&mut self, other: &StintCurve) {
        for (index, bin) in &other.bins {
            self.bins.entry(*index).or_default().merge(bin);
        }
        self.sessions.merge(&other.sessions);
    }

    pub fn retire(&mut self, session_id: &str) {
        self.sessions.retire(session_id);
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn sample_count(&self) -> u64 {
        self.bins.values().map(|b| b.count).sum()
    }

    /// Expected temperatures at `stint_time`.
    ///
    /// Uses the bin's own mean when populated, otherwise interpolates
    /// between the nearest populated bins, clamped to the curve ends.
    pub fn estimate(&self, stint_time: f64) -> Option<TireTemps> {
        let index = Self::bin_index(stint_time);
        if let Some(mean) = self.bins.get(&index).and_then(StintBin::mean) {
            return Some(mean);
        }

        let below = self
            .bins
            .range(..index)
            .next_back()
            .and_then(|(i, b)| b.mean().map(|m| (Self::bin_center(*i), m)));
        let above = self
            .bins
            .range(index..)
            .next()
            .and_then(|(i, b)| b.mean().map(|m| (Self::bin_center(*i), m)));

        match (below, above) {
            (Some((x0, lo)), Some((x1, hi))) => {
                let t = ((stint_time - x0) / (x1 - x0)).clamp(0.0, 1.0);
                Some(lo.map(|tire, zone, a| a + (hi.get(tire, zone) - a) * t))
            }
            (Some((_, only)), None) | (None, Some((_, only))) => Some(only),
            (None, None) => None,
        }
    }
}

// =============================================================================
// Corner profile
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct CornerBin {
    count: u64,
    abs_lateral: i64,
    signed_lateral: i64,
    speed: i64,
}

impl CornerBin {
    fn merge(&mut self, other: &CornerBin) {
        self.count += other.count;
        self.abs_lateral += other.abs_lateral;
        self.signed_lateral += other.signed_lateral;
        self.speed += other.speed;
    }
}

/// Average cornering at one point of the lap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CornerHeating {
    /// Mean lateral g with sign (positive loads the right-hand tires).
    pub mean_lateral_g: f64,
    pub mean_abs_lateral_g: f64,
    pub mean_speed_kph: f64,
    pub samples: u64,
}

/// Where on the lap a track makes the car corner hard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CornerProfile {
    bins: BTreeMap<u32, CornerBin>,
}

impl CornerProfile {
    fn bin_index(lap_pct: f64) -> u32 {
        ((lap_pct.clamp(0.0, 1.0) * LAP_BINS as f64).floor() as u32).min(LAP_BINS - 1)
    }

    /// Count the sample if it is cornering hard enough.
    pub fn add_sample(&mut self, sample: &TelemetrySample) {
        if sample.lateral_g.abs() <= CORNER_THRESHOLD_G {
            return;
        }
        let bin = self.bins.entry(Self::bin_index(sample.lap_pct)).or_default();
        bin.count += 1;
        bin.abs_lateral += to_fixed(sample.lateral_g.abs());
        bin.signed_lateral += to_fixed(sample.lateral_g);
        bin.speed += to_fixed(sample.speed_kph);
    }

    pub fn merge(&mut self, other: &CornerProfile) {
        for (index, bin) in &other.bins {
            self.bins.entry(*index).or_default().merge(bin);
        }
    }

    /// Cornering statistics at `lap_pct`, if that part of the lap is a corner.
    pub fn heating_at(&self, lap_pct: f64) -> Option<CornerHeating> {
        let bin = self.bins.get(&Self::bin_index(lap_pct))?;
        if bin.count < MIN_CORNER_SAMPLES {
            return None;
        }
        Some(CornerHeating {
            mean_lateral_g: from_fixed(bin.signed_lateral, bin.count),
            mean_abs_lateral_g: from_fixed(bin.abs_lateral, bin.count),
            mean_speed_kph: from_fixed(bin.speed, bin.count),
            samples: bin.count,
        })
    }

    /// Number of lap bins that qualify as corners.
    pub fn corner_count(&self) -> usize {
        self.bins
            .values()
            .filter(|b| b.count >= MIN_CORNER_SAMPLES)
            .count()
    }
}

// =============================================================================
// Patterns
// =============================================================================

/// Stint behaviour of one car class across all tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarClassPattern {
    pub car_class: String,
    pub stint: StintCurve,

    /// Every session folded in, with or without ground truth.
    pub sessions: SessionTally,
}

impl CarClassPattern {
    pub fn new(car_class: impl Into<String>) -> Self {
        Self {
            car_class: car_class.into(),
            stint: StintCurve::default(),
            sessions: SessionTally::default(),
        }
    }

    pub fn fold(&mut self, record: &SessionRecord) {
        for gt in &record.ground_truth {
            self.stint.add(gt);
        }
        self.sessions.insert(&record.info.session_id);
    }

    pub fn merge(&mut self, other: &CarClassPattern) {
        self.stint.merge(&other.stint);
        self.sessions.merge(&other.sessions);
    }

    /// Returns `false` if the session was not live here.
    pub fn retire(&mut self, session_id: &str) -> bool {
        self.stint.retire(session_id);
        self.sessions.retire(session_id)
    }

    pub fn confidence(&self) -> f64 {
        confidence_for(self.stint.session_count())
    }
}

/// Stint behaviour and corner map of one track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackPattern {
    pub track_id: String,
    pub stint: StintCurve,
    pub corners: CornerProfile,
    pub sessions: SessionTally,
}

impl TrackPattern {
    pub fn new(track_id: impl Into<String>) -> Self {
        Self {
            track_id: track_id.into(),
            stint: StintCurve::default(),
            corners: CornerProfile::default(),
            sessions: SessionTally::default(),
        }
    }

    pub fn fold(&mut self, record: &SessionRecord) {
        for gt in &record.ground_truth {
            self.stint.add(gt);
        }
        for sample in &record.samples {
            self.corners.add_sample(sample);
        }
        self.sessions.insert(&record.info.session_id);
    }

    pub fn merge(&mut self, other: &TrackPattern) {
        self.stint.merge(&other.stint);
        self.corners.merge(&other.corners);
        self.sessions.merge(&other.sessions);
    }

    pub fn retire(&mut self, session_id: &str) -> bool {
        self.stint.retire(session_id);
        self.sessions.retire(session_id)
    }

    pub fn confidence(&self) -> f64 {
        confidence_for(self.stint.session_count())
    }
}

/// Temperature bump at a corner for the loaded tires.
pub(crate) fn apply_corner(temps: &TireTemps, corner: &CornerHeating, heat_per_g: f64) -> TireTemps {
    let delta = corner.mean_abs_lateral_g * heat_per_g;
    let right_loaded = corner.mean_lateral_g > 0.0;
    temps.map(|tire: Tire, zone: Zone, temp| {
        if tire.is_left() == right_loaded {
            return temp;
        }
        if zone == tire.outer_zone() {
            temp + delta
        } else if zone == Zone::Center {
            temp + delta / 2.0
        } else {
            temp
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::SessionInfo;

    fn gt(session: &str, stint_time: f64, temp: f64) -> GroundTruthSample {
        GroundTruthSample {
            car_id: "car".to_string(),
            session_id: session.to_string(),
            timestamp: stint_time,
            stint_time,
            lap: 1,
            temps: TireTemps::uniform(temp),
        }
    }

    #[test]
    fn test_confidence_is_monotonic_and_saturates() {
        assert_eq!(confidence_for(0), 0.0);
        let mut last = 0.0;
        for n in 1..100 {
            let c = confidence_for(n);
            assert!(c > last);
            assert!(c < 0.85);
            last = c;
        }
    }

    #[test]
    fn test_stint_curve_bin_mean() {
        let mut curve = StintCurve::default();
        curve.add(&gt("a", 70.0, 180.0));
        curve.add(&gt("b", 100.0, 190.0));

        let temps = curve.estimate(90.0).unwrap();
        assert!((temps.get(Tire::LeftFront, Zone::Center) - 185.0).abs() < 1e-9);
        assert_eq!(curve.session_count(), 2);
        assert_eq!(curve.sample_count(), 2);
    }

    #[test]
    fn test_stint_curve_interpolates_and_clamps() {
        let mut curve = StintCurve::default();
        curve.add(&gt("a", 30.0, 150.0)); // bin 0, centre 30
        curve.add(&gt("a", 270.0, 210.0)); // bin 4, centre 270

        let mid = curve.estimate(150.0).unwrap();
        assert!((mid.average() - 180.0).abs() < 1e-9);

        assert!((curve.estimate(10_000.0).unwrap().average() - 210.0).abs() < 1e-9);
        assert!(StintCurve::default().estimate(60.0).is_none());
    }

    #[test]
    fn test_corner_profile_needs_hard_cornering() {
        let mut profile = CornerProfile::default();
        for _ in 0..5 {
            profile.add_sample(&TelemetrySample::new("s", 0.0).with_lap(1, 0.31).with_g(1.6, 0.0));
            profile.add_sample(&TelemetrySample::new("s", 0.0).with_lap(1, 0.70).with_g(0.4, 0.0));
        }

        let corner = profile.heating_at(0.305).unwrap();
        assert!((corner.mean_abs_lateral_g - 1.6).abs() < 1e-9);
        assert_eq!(corner.samples, 5);
        assert!(profile.heating_at(0.70).is_none());
        assert_eq!(profile.corner_count(), 1);
    }

    #[test]
    fn test_apply_corner_heats_loaded_outer_edges() {
        let corner = CornerHeating {
            mean_lateral_g: -1.5,
            mean_abs_lateral_g: 1.5,
            mean_speed_kph: 120.0,
            samples: 10,
        };
        let temps = apply_corner(&TireTemps::uniform(180.0), &corner, 2.0);

        assert_eq!(temps.get(Tire::LeftFront, Zone::Left), 183.0);
        assert_eq!(temps.get(Tire::LeftRear, Zone::Center), 181.5);
        assert_eq!(temps.get(Tire::LeftRear, Zone::Right), 180.0);
        assert_eq!(temps.get(Tire::RightFront, Zone::Right), 180.0);
    }

    #[test]
    fn test_track_pattern_merge_matches_sequential_fold() {
        let info = SessionInfo::new("s1", "car", "gt3", "spa");
        let mut a = SessionRecord::new(info.clone(), 0);
        a.ground_truth.push(gt("s1", 120.0, 185.0));
        let mut b = SessionRecord::new(info, 1);
        b.samples.push(TelemetrySample::new("s1", 1.0).with_g(1.4, 0.0));

        let mut sequential = TrackPattern::new("spa");
        sequential.fold(&a);
        sequential.fold(&b);

        let mut left = TrackPattern::new("spa");
        left.fold(&a);
        let mut right = TrackPattern::new("spa");
        right.fold(&b);
        right.merge(&left);

        assert_eq!(sequential, right);
    }

    #[test]
    fn test_retired_sessions_keep_their_weight() {
        let mut pattern = CarClassPattern::new("gt3");
        for id in ["s1", "s2", "s3"] {
            let info = SessionInfo::new(id, "car", "gt3", "spa");
            let mut record = SessionRecord::new(info, 0);
            record.ground_truth.push(gt(id, 300.0, 180.0));
            pattern.fold(&record);
        }
        let confidence = pattern.confidence();

        assert!(pattern.retire("s1"));
        assert!(!pattern.sessions.retire("s1"));
        pattern.retire("s2");

        assert!(!pattern.sessions.contains("s1"));
        assert!(pattern.sessions.contains("s3"));
        assert_eq!(pattern.sessions.len(), 3);
        assert_eq!(pattern.sessions.retired(), 2);
        assert_eq!(pattern.stint.session_count(), 3);
        assert_eq!(pattern.confidence(), confidence);
    }
}
