//! Shared pattern learner with snapshot-and-swap updates.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::snapshot::{PatternEstimate, PatternQuery, PatternSnapshot, PatternStats};
use crate::artifact::{read_artifact, write_artifact, ArtifactError, ArtifactKind};
use crate::collector::SessionRecord;

/// Owns the current [`PatternSnapshot`] and its on-disk copy.
///
/// # Thread Safety
///
/// Readers take a cheap `Arc` clone of the current snapshot. Writers are
/// serialized by an internal mutex and publish a complete new snapshot with
/// a single pointer swap.
#[derive(Debug)]
pub struct PatternLearner {
    current: RwLock<Arc<PatternSnapshot>>,
    writer: Mutex<()>,
    path: Option<PathBuf>,
}

impl PatternLearner {
    /// A learner that never touches disk.
    pub fn in_memory() -> Self {
        Self::with_snapshot(PatternSnapshot::default(), None)
    }

    /// Load the snapshot at `path`, starting empty if it is missing or corrupt.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let snapshot = match read_artifact::<PatternSnapshot>(&path, ArtifactKind::Patterns) {
            Ok(snapshot) => {
                let stats = snapshot.stats();
                info!(
                    path = %path.display(),
                    car_classes = stats.car_classes.len(),
                    tracks = stats.tracks.len(),
                    "Loaded pattern snapshot"
                );
                snapshot
            }
            Err(ArtifactError::Io { ref source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                debug!(path = %path.display(), "No pattern snapshot yet");
                PatternSnapshot::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable pattern snapshot");
                PatternSnapshot::default()
            }
        };
        Self::with_snapshot(snapshot, Some(path))
    }

    fn with_snapshot(snapshot: PatternSnapshot, path: Option<PathBuf>) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
            path,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<PatternSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Fold one record segment. Returns `false` if it was already folded.
    pub fn fold(&self, record: &SessionRecord) -> bool {
        self.fold_all(std::iter::once(record)) == 1
    }

    /// Fold several records and publish once. Returns how many were new.
    pub fn fold_all<'a>(&self, records: impl IntoIterator<Item = &'a SessionRecord>) -> usize {
        let _guard = self.writer.lock();

        let mut next = (*self.snapshot()).clone();
        let folded = records.into_iter().filter(|r| next.fold(r)).count();

        if folded > 0 {
            *self.current.write() = Arc::new(next);
            debug!(records = folded, "Published pattern snapshot");
        }
        folded
    }

    /// Retire sessions whose raw data has been deleted. Returns how many
    /// were tracked.
    pub fn retire<'a>(&self, session_ids: impl IntoIterator<Item = &'a str>) -> usize {
        let _guard = self.writer.lock();

        let mut next = (*self.snapshot()).clone();
        let retired = session_ids.into_iter().filter(|id| next.retire(id)).count();

        if retired > 0 {
            *self.current.write() = Arc::new(next);
            debug!(sessions = retired, "Retired sessions from pattern snapshot");
        }
        retired
    }

    /// Write the current snapshot to disk. Returns bytes written.
    ///
    /// A learner without a path persists nothing.
    pub fn persist(&self) -> Result<u64, ArtifactError> {
        let Some(path) = &self.path else {
            return Ok(0);
        };
        let _guard = self.writer.lock();
        let snapshot = self.snapshot();
        write_artifact(path, ArtifactKind::Patterns, snapshot.as_ref())
    }

    pub fn lookup(&self, query: &PatternQuery<'_>) -> Option<PatternEstimate> {
        self.snapshot().lookup(query)
    }

    pub fn contains_session(&self, session_id: &str) -> bool {
        self.snapshot().contains_session(session_id)
    }

    pub fn stats(&self) -> PatternStats {
        self.snapshot().stats()
    }
}

impl Default for PatternLearner {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{GroundTruthSample, SessionInfo, TireTemps};
    use tempfile::TempDir;

    fn record(session: &str) -> SessionRecord {
        let info = SessionInfo::new(session, "car", "gt3", "spa");
        let mut record = SessionRecord::new(info, 0);
        record.ground_truth.push(GroundTruthSample {
            car_id: "car".to_string(),
            session_id: session.to_string(),
            timestamp: 300.0,
            stint_time: 300.0,
            lap: 3,
            temps: TireTemps::uniform(185.0),
        });
        record
    }

    #[test]
    fn test_readers_keep_their_snapshot() {
        let learner = PatternLearner::in_memory();
        let before = learner.snapshot();

        assert!(learner.fold(&record("s1")));
        assert!(!before.contains_session("s1"));
        assert!(learner.contains_session("s1"));
    }

    #[test]
    fn test_fold_all_counts_new_records() {
        let learner = PatternLearner::in_memory();
        let records = vec![record("s1"), record("s2"), record("s1")];
        assert_eq!(learner.fold_all(&records), 2);
        assert_eq!(learner.fold_all(&records), 0);
    }

    #[test]
    fn test_persist_and_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("patterns").join("patterns.tpa");

        let learner = PatternLearner::open(&path);
        learner.fold(&record("s1"));
        assert!(learner.persist().unwrap() > 0);

        let reopened = PatternLearner::open(&path);
        assert_eq!(*reopened.snapshot(), *learner.snapshot());
    }

    #[test]
    fn test_retire_publishes_compacted_snapshot() {
        let learner = PatternLearner::in_memory();
        learner.fold_all(&[record("s1"), record("s2")]);
        let before = learner.snapshot();

        assert_eq!(learner.retire(["s1", "missing"]), 1);
        assert_eq!(learner.retire(["s1"]), 0);

        assert!(before.contains_session("s1"));
        assert!(!learner.contains_session("s1"));
        let stats = learner.stats();
        assert_eq!(stats.tracked_sessions, 1);
        assert_eq!(stats.car_classes[0].sessions, 2);
    }

    #[test]
    fn test_corrupt_snapshot_starts_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("patterns.tpa");
        std::fs::write(&path, b"not an artifact").unwrap();

        let learner = PatternLearner::open(&path);
        assert_eq!(learner.stats().folded_segments, 0);
    }

    #[test]
    fn test_in_memory_persist_is_noop() {
        assert_eq!(PatternLearner::in_memory().persist().unwrap(), 0);
    }
}
