//! Representative training rows kept after raw sessions are deleted.
//!
//! Before the storage pass deletes a session, a few labelled feature rows
//! per pit stop are kept so the car can still train on that stop later:
//!
//! ```text
//!   pit stop ──► label window ──► first, middle, last row ──► SyntheticSet (car@track)
//!                                                              at most MAX_SYNTHETIC_SAMPLES,
//!                                                              spread evenly over stint time
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::features::FEATURE_COUNT;
use crate::artifact::{read_artifact, write_artifact, ArtifactError, ArtifactKind};
use crate::telemetry::TireTemps;

/// Most samples kept per car and track.
pub const MAX_SYNTHETIC_SAMPLES: usize = 100;

/// One labelled feature row from a deleted session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticSample {
    pub session_id: String,

    /// Session time of the pit stop whose measurement labels this row.
    pub captured_at: f64,

    pub stint_time: f64,
    pub features: [f64; FEATURE_COUNT],
    pub temps: TireTemps,
}

impl SyntheticSample {
    /// Identifies the pit stop this row came from.
    pub fn stop_key(&self) -> (&str, u64) {
        (&self.session_id, self.captured_at.to_bits())
    }
}

/// Keep `max` samples spread evenly over stint time.
pub fn select_representative(mut samples: Vec<SyntheticSample>, max: usize) -> Vec<SyntheticSample> {
    if samples.len() <= max {
        return samples;
    }
    samples.sort_by(|a, b| a.stint_time.total_cmp(&b.stint_time));

    let step = samples.len() as f64 / max as f64;
    let keep: BTreeSet<usize> = (0..max).map(|i| (i as f64 * step) as usize).collect();
    samples
        .into_iter()
        .enumerate()
        .filter(|(i, _)| keep.contains(i))
        .map(|(_, sample)| sample)
        .collect()
}

/// Synthesized samples for one car at one track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyntheticSet {
    pub car_id: String,
    pub track_id: String,

    /// Deleted sessions that contributed samples.
    pub source_sessions: usize,

    pub samples: Vec<SyntheticSample>,
}

impl SyntheticSet {
    fn key(car_id: &str, track_id: &str) -> String {
        format!("{}@{}", car_id, track_id)
    }

    /// Add one session's samples. Returns `false` if the session is
    /// already represented.
    fn absorb(&mut self, samples: Vec<SyntheticSample>) -> bool {
        let Some(first) = samples.first() else {
            return false;
        };
        if self.samples.iter().any(|s| s.session_id == first.session_id) {
            return false;
        }

        self.samples.extend(samples);
        self.source_sessions += 1;
        if self.samples.len() > MAX_SYNTHETIC_SAMPLES {
            let all = std::mem::take(&mut self.samples);
            self.samples = select_representative(all, MAX_SYNTHETIC_SAMPLES);
        }
        true
    }

    /// Distinct pit stops still represented.
    pub fn stop_count(&self) -> usize {
        self.samples
            .iter()
            .map(SyntheticSample::stop_key)
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// Synthesized samples for every car and track, persisted as one artifact.
#[derive(Debug)]
pub struct SyntheticStore {
    sets: RwLock<BTreeMap<String, SyntheticSet>>,
    path: Option<PathBuf>,
}

impl SyntheticStore {
    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            sets: RwLock::new(BTreeMap::new()),
            path: None,
        }
    }

    /// Load the store at `path`, starting empty if it is missing or corrupt.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let sets = match read_artifact::<BTreeMap<String, SyntheticSet>>(
            &path,
            ArtifactKind::SyntheticSamples,
        ) {
            Ok(sets) => {
                info!(
                    path = %path.display(),
                    sets = sets.len(),
                    "Loaded synthesized training samples"
                );
                sets
            }
            Err(ArtifactError::Io { ref source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                debug!(path = %path.display(), "No synthesized training samples yet");
                BTreeMap::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable synthesized samples");
                BTreeMap::new()
            }
        };
        Self {
            sets: RwLock::new(sets),
            path: Some(path),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Add one deleted session's samples to its car@track set.
    pub fn absorb(&self, car_id: &str, track_id: &str, samples: Vec<SyntheticSample>) -> bool {
        let mut sets = self.sets.write();
        let set = sets
            .entry(SyntheticSet::key(car_id, track_id))
            .or_insert_with(|| SyntheticSet {
                car_id: car_id.to_string(),
                track_id: track_id.to_string(),
                ..SyntheticSet::default()
            });
        let added = set.absorb(samples);
        if added {
            debug!(
                car = %car_id,
                track = %track_id,
                samples = set.samples.len(),
                sources = set.source_sessions,
                "Absorbed synthesized samples"
            );
        }
        added
    }

    /// Write every set to disk. A store without a path persists nothing.
    pub fn persist(&self) -> Result<u64, ArtifactError> {
        let Some(path) = &self.path else {
            return Ok(0);
        };
        let sets = self.sets.read();
        write_artifact(path, ArtifactKind::SyntheticSamples, &*sets)
    }

    /// Samples for a car across all tracks.
    pub fn samples_for_car(&self, car_id: &str) -> Vec<SyntheticSample> {
        self.sets
            .read()
            .values()
            .filter(|set| set.car_id == car_id)
            .flat_map(|set| set.samples.iter().cloned())
            .collect()
    }

    pub fn sets(&self) -> Vec<SyntheticSet> {
        self.sets.read().values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.read().is_empty()
    }
}

impl Default for SyntheticStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(session: &str, stop: usize, stint_time: f64) -> SyntheticSample {
        let mut features = [0.0; FEATURE_COUNT];
        features[0] = 150.0 + stint_time;
        SyntheticSample {
            session_id: session.to_string(),
            captured_at: 1000.0 * stop as f64,
            stint_time,
            features,
            temps: TireTemps::uniform(170.0 + stint_time / 60.0),
        }
    }

    fn session(session: &str, stops: usize) -> Vec<SyntheticSample> {
        (0..stops)
            .flat_map(|stop| {
                [60.0, 300.0, 600.0]
                    .into_iter()
                    .map(move |t| sample(session, stop, t + stop as f64))
            })
            .collect()
    }

    #[test]
    fn test_select_representative_spreads_over_stint_time() {
        let samples: Vec<_> = (0..10).map(|i| sample("s1", i, 60.0 * i as f64)).collect();
        let kept = select_representative(samples.clone(), 5);

        let times: Vec<f64> = kept.iter().map(|s| s.stint_time).collect();
        assert_eq!(times, vec![0.0, 120.0, 240.0, 360.0, 480.0]);
        assert_eq!(select_representative(samples, 20).len(), 10);
    }

    #[test]
    fn test_sets_are_capped() {
        let store = SyntheticStore::in_memory();
        for i in 0..12 {
            assert!(store.absorb("bmw_m4_gt3", "monza", session(&format!("s{}", i), 4)));
        }

        let sets = store.sets();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].source_sessions, 12);
        assert_eq!(sets[0].samples.len(), MAX_SYNTHETIC_SAMPLES);
    }

    #[test]
    fn test_same_session_is_absorbed_once() {
        let store = SyntheticStore::in_memory();
        assert!(store.absorb("car", "spa", session("s1", 2)));
        assert!(!store.absorb("car", "spa", session("s1", 2)));
        assert!(!store.absorb("car", "spa", Vec::new()));

        let sets = store.sets();
        assert_eq!(sets[0].source_sessions, 1);
        assert_eq!(sets[0].stop_count(), 2);
    }

    #[test]
    fn test_samples_for_car_spans_tracks() {
        let store = SyntheticStore::in_memory();
        store.absorb("car", "spa", session("s1", 1));
        store.absorb("car", "monza", session("s2", 1));
        store.absorb("other", "spa", session("s3", 1));

        let samples = store.samples_for_car("car");
        assert_eq!(samples.len(), 6);
        assert!(samples.iter().all(|s| s.session_id != "s3"));
    }

    #[test]
    fn test_persist_and_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("patterns").join("synthesized.tsy");

        let store = SyntheticStore::open(&path);
        assert!(store.is_empty());
        store.absorb("car", "spa", session("s1", 2));
        assert!(store.persist().unwrap() > 0);

        let reopened = SyntheticStore::open(&path);
        assert_eq!(reopened.sets(), store.sets());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("synthesized.tsy");
        std::fs::write(&path, b"junk").unwrap();

        assert!(SyntheticStore::open(&path).is_empty());
        assert_eq!(SyntheticStore::in_memory().persist().unwrap(), 0);
    }
}
