//! Learning daemon: training and storage passes after each session.
//!
//! ```text
//!   collector worker ──LearningJob──► LearningDaemon ──spawn_blocking──► run_passes
//!                                          │                              │
//!                                          │  one job at a time           ├─ persist patterns
//!                                          │                              ├─ train car model
//!                                          │                              │  (sessions + synthesized)
//!                                          ◄──────── PassesReport ────────┴─ storage pass
//! ```
//!
//! Jobs run strictly one after another, which makes the daemon the single
//! writer for models and pattern files.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collector::SessionStore;
use crate::patterns::PatternLearner;
use crate::storage::{StorageError, StorageManager, StoragePassReport};
use crate::telemetry::SessionInfo;
use crate::trainer::{
    ModelRegistry, ModelTrainer, SyntheticStore, TrainingError, TrainingOutcome,
};

/// A finished session awaiting its passes.
#[derive(Debug, Clone)]
pub struct LearningJob {
    pub info: SessionInfo,
}

/// Outcome of the passes run for one session.
#[derive(Debug)]
pub struct PassesReport {
    pub info: SessionInfo,
    pub training: TrainingOutcome,
    pub storage: Result<StoragePassReport, StorageError>,
}

/// Everything a pass touches.
#[derive(Debug)]
pub struct LearningContext {
    pub store: SessionStore,
    pub learner: Arc<PatternLearner>,
    pub registry: Arc<ModelRegistry>,
    pub synthetic: Arc<SyntheticStore>,
    pub trainer: ModelTrainer,
    pub storage: StorageManager,
}

impl LearningContext {
    /// Persist patterns, train the session's car, then enforce the budget.
    ///
    /// Blocking. Failures are logged and reported, never raised.
    pub fn run_passes(&self, info: &SessionInfo) -> PassesReport {
        if let Err(e) = self.learner.persist() {
            warn!(error = %e, "Failed to persist pattern snapshot");
        }

        let training = match self.store.load_car(&info.car_id) {
            Ok(records) => self.trainer.train_car(
                &info.car_id,
                &records,
                &self.synthetic.samples_for_car(&info.car_id),
                &self.registry,
            ),
            Err(e) => {
                warn!(car = %info.car_id, error = %e, "Cannot load sessions for training");
                TrainingOutcome::Failed(TrainingError::Records(e))
            }
        };

        let storage = self.storage.run_pass(&self.learner, &self.synthetic);
        if let Err(e) = &storage {
            warn!(error = %e, "Storage pass failed, will retry next session");
        }

        PassesReport {
            info: info.clone(),
            training,
            storage,
        }
    }
}

/// Receives [`LearningJob`]s and runs their passes on the blocking pool.
pub struct LearningDaemon {
    context: Arc<LearningContext>,
    jobs: mpsc::UnboundedReceiver<LearningJob>,
    reports: mpsc::UnboundedSender<PassesReport>,
}

impl LearningDaemon {
    pub fn new(
        context: Arc<LearningContext>,
        jobs: mpsc::UnboundedReceiver<LearningJob>,
        reports: mpsc::UnboundedSender<PassesReport>,
    ) -> Self {
        Self {
            context,
            jobs,
            reports,
        }
    }

    /// Run until shutdown is signalled or every job sender is dropped.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Learning daemon starting");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Learning daemon shutting down");
                    break;
                }

                job = self.jobs.recv() => {
                    let Some(job) = job else {
                        debug!("Job channel closed");
                        break;
                    };
                    self.handle_job(job).await;
                }
            }
        }

        info!("Learning daemon stopped");
    }

    async fn handle_job(&self, job: LearningJob) {
        let session = job.info.session_id.clone();
        debug!(session = %session, car = %job.info.car_id, "Running session passes");

        let context = Arc::clone(&self.context);
        let report =
            match tokio::task::spawn_blocking(move || context.run_passes(&job.info)).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(session = %session, error = %e, "Session passes panicked");
                    return;
                }
            };

        if self.reports.send(report).is_err() {
            debug!(session = %session, "Engine dropped, discarding passes report");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{CollectorConfig, DataCollector};
    use crate::storage::StorageBudget;
    use crate::telemetry::{TelemetrySample, TireTemps};
    use crate::trainer::{SkipReason, TrainerConfig};
    use tempfile::TempDir;

    fn context(temp: &TempDir, budget: StorageBudget) -> LearningContext {
        let store = SessionStore::new(temp.path().join("sessions"));
        let trainer = ModelTrainer::new(TrainerConfig::default());
        LearningContext {
            storage: StorageManager::new(budget, store.clone(), temp.path().join("models"))
                .with_trainer(trainer.clone()),
            store,
            learner: Arc::new(PatternLearner::open(temp.path().join("patterns.tpa"))),
            registry: Arc::new(ModelRegistry::open(temp.path().join("models"))),
            synthetic: Arc::new(SyntheticStore::open(temp.path().join("synthesized.tsy"))),
            trainer,
        }
    }

    fn record_session(context: &LearningContext, info: &SessionInfo) {
        let mut collector = DataCollector::new(CollectorConfig::default(), context.store.clone());
        collector.start_session(info.clone()).unwrap();
        for i in 0..30 {
            let sample = TelemetrySample::new(info.session_id.clone(), i as f64).with_speed(120.0);
            collector.record(&sample, None).unwrap();
        }
        let pit = TelemetrySample::new(info.session_id.clone(), 31.0).with_pit(true);
        collector
            .record(&pit, Some(&TireTemps::uniform(185.0)))
            .unwrap();
        let finished = collector.end_session().unwrap().unwrap();
        context.learner.fold(finished.final_segment.as_ref().unwrap());
    }

    #[test]
    fn test_passes_skip_training_with_little_data() {
        let temp = TempDir::new().unwrap();
        let context = context(&temp, StorageBudget::default());
        let info = SessionInfo::new("s1", "audi_r8", "gt3", "zandvoort");
        record_session(&context, &info);

        let report = context.run_passes(&info);
        assert!(matches!(
            report.training,
            TrainingOutcome::Skipped(SkipReason::InsufficientGroundTruth { have: 1, .. })
        ));
        assert!(report.storage.unwrap().within_budget);
        assert!(temp.path().join("patterns.tpa").exists());
    }

    #[test]
    fn test_deleted_sessions_still_count_as_ground_truth() {
        let temp = TempDir::new().unwrap();
        let context = context(&temp, StorageBudget::new(0, 0));

        let first = SessionInfo::new("s1", "audi_r8", "gt3", "zandvoort");
        record_session(&context, &first);
        let report = context.run_passes(&first);
        assert_eq!(report.storage.unwrap().synthesized, vec!["s1"]);
        assert!(context.store.load_car("audi_r8").unwrap().is_empty());
        assert!(!context.synthetic.samples_for_car("audi_r8").is_empty());

        // The deleted stop is counted alongside the new one
        let second = SessionInfo::new("s2", "audi_r8", "gt3", "zandvoort");
        record_session(&context, &second);
        let report = context.run_passes(&second);
        assert!(matches!(
            report.training,
            TrainingOutcome::Skipped(SkipReason::InsufficientGroundTruth { have: 2, .. })
        ));
        assert!(temp.path().join("synthesized.tsy").exists());
    }

    #[tokio::test]
    async fn test_daemon_reports_and_stops() {
        let temp = TempDir::new().unwrap();
        let context = Arc::new(context(&temp, StorageBudget::default()));
        let info = SessionInfo::new("s1", "audi_r8", "gt3", "zandvoort");
        record_session(&context, &info);

        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let daemon = LearningDaemon::new(context, job_rx, report_tx);
        let handle = tokio::spawn(daemon.run(shutdown.clone()));

        job_tx.send(LearningJob { info: info.clone() }).unwrap();
        let report = tokio::time::timeout(std::time::Duration::from_secs(10), report_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.info, info);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
