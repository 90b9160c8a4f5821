//! Immutable pattern snapshot and lookup.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::aggregate::{apply_corner, CarClassPattern, CornerHeating, TrackPattern};
use crate::collector::{RecordId, SessionRecord};
use crate::telemetry::TireTemps;

/// °F added to a loaded tire's outer edge per g of mean cornering load.
pub const CORNER_HEAT_PER_G: f64 = 2.0;

/// What to look up. `None` disables that pattern kind.
#[derive(Debug, Clone, Copy)]
pub struct PatternQuery<'a> {
    pub car_class: Option<&'a str>,
    pub track_id: Option<&'a str>,
    pub stint_time: f64,
    pub lap_pct: f64,
}

/// A pattern-based temperature estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternEstimate {
    pub temps: TireTemps,

    /// Confidence of the strongest contributing pattern.
    pub confidence: f64,

    pub car_class_confidence: Option<f64>,
    pub track_confidence: Option<f64>,

    /// Corner adjustment applied, if any.
    pub corner: Option<CornerHeating>,
}

/// Summary of one aggregate for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternSummary {
    pub key: String,
    pub sessions: usize,
    pub ground_truth_sessions: usize,
    pub ground_truth_samples: u64,
    pub confidence: f64,
    pub corners: usize,
}

/// Summary of a whole snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatternStats {
    pub car_classes: Vec<PatternSummary>,
    pub tracks: Vec<PatternSummary>,

    /// Segments folded from sessions whose raw data is still tracked.
    pub folded_segments: usize,

    /// Sessions whose segment bookkeeping is still kept.
    pub tracked_sessions: usize,
}

/// Segment numbers folded from one session.
///
/// Segments are written in order, so the set is normally the range
/// `0..contiguous` and costs two integers however long the session ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct FoldedSegments {
    contiguous: u32,
    sparse: BTreeSet<u32>,
}

impl FoldedSegments {
    fn contains(&self, segment: u32) -> bool {
        segment < self.contiguous || self.sparse.contains(&segment)
    }

    fn insert(&mut self, segment: u32) -> bool {
        if self.contains(segment) {
            return false;
        }
        self.sparse.insert(segment);
        while self.sparse.remove(&self.contiguous) {
            self.contiguous += 1;
        }
        true
    }

    fn merge(&mut self, other: &FoldedSegments) {
        for segment in 0..other.contiguous {
            self.insert(segment);
        }
        for &segment in &other.sparse {
            self.insert(segment);
        }
    }

    fn len(&self) -> usize {
        self.contiguous as usize + self.sparse.len()
    }
}

/// Every learned aggregate at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSnapshot {
    car_classes: BTreeMap<String, CarClassPattern>,
    tracks: BTreeMap<String, TrackPattern>,

    /// Segments already folded in, by session; folding one again is a no-op.
    folded: BTreeMap<String, FoldedSegments>,
}

impl PatternSnapshot {
    /// Aggregate of a single record.
    pub fn from_record(record: &SessionRecord) -> Self {
        let info = &record.info;

        let mut car_class = CarClassPattern::new(&info.car_class);
        car_class.fold(record);
        let mut track = TrackPattern::new(&info.track_id);
        track.fold(record);

        let mut snapshot = Self::default();
        snapshot.car_classes.insert(info.car_class.clone(), car_class);
        snapshot.tracks.insert(info.track_id.clone(), track);
        snapshot.mark_folded(&record.id());
        snapshot
    }

    fn mark_folded(&mut self, id: &RecordId) -> bool {
        self.folded
            .entry(id.session_id.clone())
            .or_default()
            .insert(id.segment)
    }

    /// Merge another snapshot into this one.
    ///
    /// Both sides must have been built from disjoint records; use
    /// [`fold`](Self::fold) to add records safely.
    pub fn merge(&mut self, other: &PatternSnapshot) {
        for (key, pattern) in &other.car_classes {
            self.car_classes
                .entry(key.clone())
                .or_insert_with(|| CarClassPattern::new(key))
                .merge(pattern);
        }
        for (key, pattern) in &other.tracks {
            self.tracks
                .entry(key.clone())
                .or_insert_with(|| TrackPattern::new(key))
                .merge(pattern);
        }
        for (session_id, segments) in &other.folded {
            self.folded
                .entry(session_id.clone())
                .or_default()
                .merge(segments);
        }
    }

    /// Fold one record in. Returns `false` if it was already folded.
    pub fn fold(&mut self, record: &SessionRecord) -> bool {
        if self.is_folded(&record.id()) {
            return false;
        }
        self.merge(&Self::from_record(record));
        true
    }

    pub fn is_folded(&self, id: &RecordId) -> bool {
        self.folded
            .get(&id.session_id)
            .is_some_and(|segments| segments.contains(id.segment))
    }

    /// Drop the bookkeeping for a session whose raw data is gone.
    ///
    /// Its contribution to every aggregate stays; only the session id and
    /// folded segment numbers are forgotten. Returns `false` if nothing
    /// was tracked for the session.
    pub fn retire(&mut self, session_id: &str) -> bool {
        let mut retired = self.folded.remove(session_id).is_some();
        for pattern in self.car_classes.values_mut() {
            retired |= pattern.retire(session_id);
        }
        for pattern in self.tracks.values_mut() {
            retired |= pattern.retire(session_id);
        }
        retired
    }

    pub fn car_class(&self, car_class: &str) -> Option<&CarClassPattern> {
        self.car_classes.get(car_class)
    }

    pub fn track(&self, track_id: &str) -> Option<&TrackPattern> {
        self.tracks.get(track_id)
    }

    /// Whether any aggregate includes data from this session.
    pub fn contains_session(&self, session_id: &str) -> bool {
        self.car_classes
            .values()
            .any(|p| p.sessions.contains(session_id))
            || self.tracks.values().any(|p| p.sessions.contains(session_id))
    }

    /// Expected temperatures for the query, blended across pattern kinds.
    pub fn lookup(&self, query: &PatternQuery<'_>) -> Option<PatternEstimate> {
        let car_class = query
            .car_class
            .and_then(|key| self.car_classes.get(key))
            .and_then(|p| p.stint.estimate(query.stint_time).map(|t| (t, p.confidence())));
        let track_pattern = query.track_id.and_then(|key| self.tracks.get(key));
        let track = track_pattern
            .and_then(|p| p.stint.estimate(query.stint_time).map(|t| (t, p.confidence())));

        let (temps, confidence) = match (car_class, track) {
            (Some((a, ca)), Some((b, cb))) => {
                let total = ca + cb;
                let blended = if total > 0.0 {
                    a.map(|tire, zone, x| (x * ca + b.get(tire, zone) * cb) / total)
                } else {
                    a
                };
                (blended, ca.max(cb))
            }
            (Some((a, ca)), None) => (a, ca),
            (None, Some((b, cb))) => (b, cb),
            (None, None) => return None,
        };

        let corner = track_pattern.and_then(|p| p.corners.heating_at(query.lap_pct));
        let temps = match &corner {
            Some(c) => apply_corner(&temps, c, CORNER_HEAT_PER_G),
            None => temps,
        };

        Some(PatternEstimate {
            temps,
            confidence,
            car_class_confidence: car_class.map(|(_, c)| c),
            track_confidence: track.map(|(_, c)| c),
            corner,
        })
    }

    pub fn stats(&self) -> PatternStats {
        PatternStats {
            car_classes: self
                .car_classes
                .values()
                .map(|p| PatternSummary {
                    key: p.car_class.clone(),
                    sessions: p.sessions.len(),
                    ground_truth_sessions: p.stint.session_count(),
                    ground_truth_samples: p.stint.sample_count(),
                    confidence: p.confidence(),
                    corners: 0,
                })
                .collect(),
            tracks: self
                .tracks
                .values()
                .map(|p| PatternSummary {
                    key: p.track_id.clone(),
                    sessions: p.sessions.len(),
                    ground_truth_sessions: p.stint.session_count(),
                    ground_truth_samples: p.stint.sample_count(),
                    confidence: p.confidence(),
                    corners: p.corners.corner_count(),
                })
                .collect(),
            folded_segments: self.folded.values().map(FoldedSegments::len).sum(),
            tracked_sessions: self.folded.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{GroundTruthSample, SessionInfo, TelemetrySample, Tire, Zone};

    fn record(session: &str, class: &str, track: &str, segment: u32, temp: f64) -> SessionRecord {
        let info = SessionInfo::new(session, "car", class, track);
        let mut record = SessionRecord::new(info, segment);
        record.ground_truth.push(GroundTruthSample {
            car_id: "car".to_string(),
            session_id: session.to_string(),
            timestamp: 600.0,
            stint_time: 600.0,
            lap: 5,
            temps: TireTemps::uniform(temp),
        });
        for i in 0..5 {
            record.samples.push(
                TelemetrySample::new(session, i as f64)
                    .with_lap(5, 0.5)
                    .with_g(1.5, 0.0),
            );
        }
        record
    }

    fn query<'a>(class: Option<&'a str>, track: Option<&'a str>) -> PatternQuery<'a> {
        PatternQuery {
            car_class: class,
            track_id: track,
            stint_time: 600.0,
            lap_pct: 0.1,
        }
    }

    #[test]
    fn test_fold_is_idempotent_per_segment() {
        let mut snapshot = PatternSnapshot::default();
        let r = record("s1", "gt3", "spa", 0, 180.0);

        assert!(snapshot.fold(&r));
        assert!(!snapshot.fold(&r));
        assert_eq!(snapshot.car_class("gt3").unwrap().stint.sample_count(), 1);

        // Another segment of the same session counts, but as the same session
        assert!(snapshot.fold(&record("s1", "gt3", "spa", 1, 190.0)));
        let pattern = snapshot.car_class("gt3").unwrap();
        assert_eq!(pattern.stint.sample_count(), 2);
        assert_eq!(pattern.stint.session_count(), 1);
    }

    #[test]
    fn test_lookup_empty_is_none() {
        let snapshot = PatternSnapshot::default();
        assert!(snapshot.lookup(&query(Some("gt3"), Some("spa"))).is_none());
    }

    #[test]
    fn test_lookup_blends_by_confidence() {
        let mut snapshot = PatternSnapshot::default();
        snapshot.fold(&record("s1", "gt3", "spa", 0, 180.0));
        snapshot.fold(&record("s2", "gt3", "monza", 0, 200.0));

        // Class curve: mean 190 from 2 sessions; spa curve: 180 from 1
        let estimate = snapshot.lookup(&query(Some("gt3"), Some("spa"))).unwrap();
        let t = estimate.temps.get(Tire::LeftFront, Zone::Center);
        assert!(t > 180.0 && t < 190.0, "blended {}", t);
        assert_eq!(estimate.confidence, estimate.car_class_confidence.unwrap());
        assert!(estimate.car_class_confidence > estimate.track_confidence);
    }

    #[test]
    fn test_disabled_kinds_are_skipped() {
        let mut snapshot = PatternSnapshot::default();
        snapshot.fold(&record("s1", "gt3", "spa", 0, 180.0));

        let estimate = snapshot.lookup(&query(None, Some("spa"))).unwrap();
        assert!(estimate.car_class_confidence.is_none());
        assert!(snapshot.lookup(&query(None, None)).is_none());
    }

    #[test]
    fn test_corner_adjustment_at_lap_position() {
        let mut snapshot = PatternSnapshot::default();
        snapshot.fold(&record("s1", "gt3", "spa", 0, 180.0));

        let mut at_corner = query(None, Some("spa"));
        at_corner.lap_pct = 0.5;
        let estimate = snapshot.lookup(&at_corner).unwrap();

        assert!(estimate.corner.is_some());
        assert_eq!(estimate.temps.get(Tire::RightFront, Zone::Right), 183.0);
        assert_eq!(estimate.temps.get(Tire::LeftFront, Zone::Left), 180.0);
    }

    #[test]
    fn test_contains_session_and_stats() {
        let mut snapshot = PatternSnapshot::default();
        snapshot.fold(&record("s1", "gt3", "spa", 0, 180.0));

        assert!(snapshot.contains_session("s1"));
        assert!(!snapshot.contains_session("s2"));

        let stats = snapshot.stats();
        assert_eq!(stats.car_classes.len(), 1);
        assert_eq!(stats.tracks[0].corners, 1);
        assert_eq!(stats.folded_segments, 1);
    }

    #[test]
    fn test_folded_segments_compact_to_a_range() {
        let mut snapshot = PatternSnapshot::default();
        for segment in [0, 2, 1, 3] {
            assert!(snapshot.fold(&record("s1", "gt3", "spa", segment, 180.0)));
        }
        assert!(!snapshot.fold(&record("s1", "gt3", "spa", 2, 180.0)));

        let tracked = &snapshot.folded["s1"];
        assert_eq!(tracked.contiguous, 4);
        assert!(tracked.sparse.is_empty());
        assert_eq!(snapshot.stats().folded_segments, 4);
    }

    #[test]
    fn test_retire_forgets_ids_but_keeps_counts() {
        let mut snapshot = PatternSnapshot::default();
        snapshot.fold(&record("s1", "gt3", "spa", 0, 180.0));
        snapshot.fold(&record("s1", "gt3", "spa", 1, 184.0));
        snapshot.fold(&record("s2", "gt3", "spa", 0, 190.0));
        let before = snapshot.lookup(&query(Some("gt3"), Some("spa"))).unwrap();

        assert!(snapshot.retire("s1"));
        assert!(!snapshot.retire("s1"));

        assert!(!snapshot.contains_session("s1"));
        assert!(snapshot.contains_session("s2"));
        let stats = snapshot.stats();
        assert_eq!(stats.tracked_sessions, 1);
        assert_eq!(stats.folded_segments, 1);
        assert_eq!(stats.car_classes[0].sessions, 2);
        assert_eq!(stats.car_classes[0].ground_truth_sessions, 2);
        assert_eq!(snapshot.lookup(&query(Some("gt3"), Some("spa"))).unwrap(), before);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_fold_order_independent(
                temps in prop::collection::vec(100.0..260.0_f64, 1..8),
                seed in any::<u64>(),
            ) {
                let classes = ["gt3", "lmp2"];
                let tracks = ["spa", "monza", "suzuka"];
                let records: Vec<SessionRecord> = temps
                    .iter()
                    .enumerate()
                    .map(|(i, t)| record(
                        &format!("s{}", i),
                        classes[i % classes.len()],
                        tracks[i % tracks.len()],
                        0,
                        *t,
                    ))
                    .collect();

                let mut forward = PatternSnapshot::default();
                for r in &records {
                    forward.fold(r);
                }

                // Deterministic shuffle driven by the seed
                let mut order: Vec<usize> = (0..records.len()).collect();
                let mut state = seed | 1;
                for i in (1..order.len()).rev() {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    order.swap(i, (state % (i as u64 + 1)) as usize);
                }
                let mut shuffled = PatternSnapshot::default();
                for i in order {
                    shuffled.fold(&records[i]);
                }

                prop_assert_eq!(forward, shuffled);
            }
        }
    }
}
