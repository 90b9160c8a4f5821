//! Session records as persisted by the collector.

use serde::{Deserialize, Serialize};

use crate::telemetry::{GroundTruthSample, SessionInfo, TelemetrySample};

/// Identity of one persisted segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId {
    pub session_id: String,
    pub segment: u32,
}

/// A slice of one session: telemetry plus any ground truth captured in it.
///
/// Long sessions are written as several numbered segments. A merged record
/// (see [`SessionRecord::merge_segments`]) covers the whole session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub info: SessionInfo,
    pub segment: u32,
    pub samples: Vec<TelemetrySample>,
    pub ground_truth: Vec<GroundTruthSample>,
}

impl SessionRecord {
    pub fn new(info: SessionInfo, segment: u32) -> Self {
        Self {
            info,
            segment,
            samples: Vec::new(),
            ground_truth: Vec::new(),
        }
    }

    pub fn id(&self) -> RecordId {
        RecordId {
            session_id: self.info.session_id.clone(),
            segment: self.segment,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.ground_truth.is_empty()
    }

    /// Concatenate segments of one session in segment order.
    ///
    /// The merged record keeps the lowest segment number. Returns `None`
    /// for an empty input.
    pub fn merge_segments(mut segments: Vec<SessionRecord>) -> Option<SessionRecord> {
        segments.sort_by_key(|s| s.segment);
        let mut iter = segments.into_iter();
        let mut merged = iter.next()?;
        for segment in iter {
            merged.samples.extend(segment.samples);
            merged.ground_truth.extend(segment.ground_truth);
        }
        Some(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(n: u32, samples: usize) -> SessionRecord {
        let info = SessionInfo::new("race-1", "car", "gt3", "spa");
        let mut record = SessionRecord::new(info, n);
        for i in 0..samples {
            record
                .samples
                .push(TelemetrySample::new("race-1", (n as usize * 100 + i) as f64));
        }
        record
    }

    #[test]
    fn test_merge_orders_by_segment() {
        let merged = SessionRecord::merge_segments(vec![segment(1, 2), segment(0, 3)]).unwrap();
        assert_eq!(merged.segment, 0);
        assert_eq!(merged.samples.len(), 5);
        assert_eq!(merged.samples[0].timestamp, 0.0);
        assert_eq!(merged.samples[4].timestamp, 101.0);
    }

    #[test]
    fn test_merge_empty() {
        assert!(SessionRecord::merge_segments(Vec::new()).is_none());
    }
}
