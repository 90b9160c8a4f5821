//! Budget enforcement with synthesis before deletion.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::budget::{StorageBudget, StorageUsage};
use crate::artifact::{ArtifactError, ArtifactKind};
use crate::collector::{SessionRecord, SessionStore, StoredSession};
use crate::patterns::PatternLearner;
use crate::trainer::{ModelTrainer, SyntheticStore};

/// Errors from a storage pass or from one session within it.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("could not persist synthesized data for session {session}, keeping it: {source}")]
    Synthesis {
        session: String,
        #[source]
        source: ArtifactError,
    },

    #[error("failed to delete {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// The session this error kept on disk, if known.
    pub fn session(&self) -> Option<&str> {
        match self {
            StorageError::Synthesis { session, .. } => Some(session),
            _ => None,
        }
    }
}

/// What one storage pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoragePassReport {
    pub before: StorageUsage,
    pub after: StorageUsage,
    pub ceiling_bytes: u64,

    /// Sessions folded into patterns and then deleted, oldest first.
    pub synthesized: Vec<String>,

    /// Sessions left on disk because a step failed, by session id where
    /// known and by file key otherwise.
    pub skipped: Vec<String>,

    pub segments_deleted: usize,

    /// Segments deleted without folding because they could not be read.
    pub corrupt_segments: usize,

    /// Training samples kept from the synthesized sessions.
    pub synthetic_samples: usize,

    pub models_deleted: Vec<PathBuf>,

    pub within_budget: bool,
}

impl StoragePassReport {
    pub fn freed_bytes(&self) -> u64 {
        self.before.total().saturating_sub(self.after.total())
    }
}

#[derive(Debug)]
struct ModelFile {
    path: PathBuf,
    bytes: u64,
    modified: SystemTime,
}

/// Keeps stored sessions and models under a byte budget.
///
/// Raw sessions are only deleted after their content has been folded into
/// the pattern aggregates, representative training samples have been kept,
/// and both are safely on disk. A session that fails any step stays on disk
/// and the pass moves on to the next one.
#[derive(Debug, Clone)]
pub struct StorageManager {
    budget: StorageBudget,
    store: SessionStore,
    models_dir: PathBuf,
    trainer: ModelTrainer,
}

impl StorageManager {
    pub fn new(budget: StorageBudget, store: SessionStore, models_dir: impl Into<PathBuf>) -> Self {
        Self {
            budget,
            store,
            models_dir: models_dir.into(),
            trainer: ModelTrainer::default(),
        }
    }

    /// Trainer whose label windows shape the synthesized samples.
    pub fn with_trainer(mut self, trainer: ModelTrainer) -> Self {
        self.trainer = trainer;
        self
    }

    pub fn budget(&self) -> &StorageBudget {
        &self.budget
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn usage(&self) -> Result<StorageUsage, StorageError> {
        let sessions = self.store.list()?;
        let models = self.model_files()?;
        Ok(StorageUsage {
            session_bytes: sessions.iter().map(|s| s.bytes).sum(),
            sessions: sessions.len(),
            model_bytes: models.iter().map(|m| m.bytes).sum(),
            models: models.len(),
        })
    }

    /// Bring usage under the ceiling.
    ///
    /// Order: sessions beyond the retention count (oldest first), then the
    /// retained sessions (oldest first), then models (oldest first).
    pub fn run_pass(
        &self,
        learner: &PatternLearner,
        synthetic: &SyntheticStore,
    ) -> Result<StoragePassReport, StorageError> {
        let before = self.usage()?;
        let ceiling = self.budget.ceiling_bytes;
        let mut report = StoragePassReport {
            before,
            ceiling_bytes: ceiling,
            ..StoragePassReport::default()
        };

        let mut usage = before.total();
        if usage > ceiling {
            info!(
                usage = usage,
                ceiling = ceiling,
                "Storage over budget, synthesizing old sessions"
            );

            let sessions = self.store.list()?;
            let split = sessions.len().saturating_sub(self.budget.retention_count);
            let (expired, retained) = sessions.split_at(split);

            for stored in expired.iter().chain(retained) {
                if usage <= ceiling {
                    break;
                }
                match self.synthesize_and_delete(stored, learner, synthetic, &mut report) {
                    Ok(freed) => usage = usage.saturating_sub(freed),
                    Err(e) => {
                        let session = e.session().unwrap_or(&stored.key.session).to_string();
                        warn!(session = %session, error = %e, "Keeping session, moving on");
                        report.skipped.push(session);
                    }
                }
            }

            if usage > ceiling {
                for model in self.model_files()? {
                    if usage <= ceiling {
                        break;
                    }
                    if let Err(e) = remove(&model.path) {
                        warn!(error = %e, "Could not delete car model");
                        continue;
                    }
                    warn!(path = %model.path.display(), "Deleted car model to meet storage budget");
                    usage = usage.saturating_sub(model.bytes);
                    report.models_deleted.push(model.path);
                }
            }
        }

        // Retired session ids only shrink the snapshot, so this is best effort
        if !report.synthesized.is_empty() {
            if let Err(e) = learner.persist() {
                warn!(error = %e, "Could not persist compacted patterns");
            }
        }

        report.after = self.usage()?;
        report.within_budget = self.budget.allows(&report.after);
        if !report.within_budget {
            warn!(
                usage = report.after.total(),
                ceiling = ceiling,
                skipped = report.skipped.len(),
                "Storage still over budget after pass"
            );
        }
        debug!(
            freed = report.freed_bytes(),
            sessions = report.synthesized.len(),
            models = report.models_deleted.len(),
            "Storage pass complete"
        );
        Ok(report)
    }

    fn synthesize_and_delete(
        &self,
        stored: &StoredSession,
        learner: &PatternLearner,
        synthetic: &SyntheticStore,
        report: &mut StoragePassReport,
    ) -> Result<u64, StorageError> {
        let mut segments = Vec::new();
        let mut corrupt = 0;
        for path in &stored.segments {
            match self.store.load_segment(path) {
                Ok(record) => segments.push(record),
                Err(e) if e.is_corrupt() => {
                    warn!(path = %path.display(), error = %e, "Deleting unreadable segment");
                    corrupt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let session_id = segments
            .first()
            .map(|r| r.info.session_id.clone())
            .unwrap_or_else(|| stored.key.session.clone());
        let synthesis_failed = |source| StorageError::Synthesis {
            session: session_id.clone(),
            source,
        };

        learner.fold_all(&segments);
        let mut samples = 0;
        if let Some(record) = SessionRecord::merge_segments(segments) {
            let kept = self.trainer.synthesize(&record);
            samples = kept.len();
            if synthetic.absorb(&record.info.car_id, &record.info.track_id, kept) {
                synthetic.persist().map_err(synthesis_failed)?;
            }
        }
        learner.persist().map_err(synthesis_failed)?;

        let freed = self.store.delete(stored)?;
        learner.retire([session_id.as_str()]);
        info!(
            session = %session_id,
            segments = stored.segments.len(),
            bytes = freed,
            synthetic_samples = samples,
            "Synthesized and deleted session"
        );

        report.segments_deleted += stored.segments.len();
        report.corrupt_segments += corrupt;
        report.synthetic_samples += samples;
        if corrupt < stored.segments.len() {
            report.synthesized.push(session_id);
        }
        Ok(freed)
    }

    /// Model artifacts, least recently written first.
    fn model_files(&self) -> Result<Vec<ModelFile>, StorageError> {
        if !self.models_dir.exists() {
            return Ok(Vec::new());
        }

        let pattern = format!(
            "{}/*.{}",
            glob::Pattern::escape(&self.models_dir.to_string_lossy()),
            ArtifactKind::CarModel.extension()
        );
        let paths = glob::glob(&pattern).map_err(|e| ArtifactError::Corrupt {
            path: self.models_dir.clone(),
            reason: e.to_string(),
        })?;

        let mut files = Vec::new();
        for path in paths.filter_map(Result::ok) {
            let metadata = match fs::metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable model file");
                    continue;
                }
            };
            files.push(ModelFile {
                bytes: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                path,
            });
        }
        files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
        Ok(files)
    }
}

fn remove(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::Delete {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
