//! The engine facade wiring the live path to the background workers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              TireEngine                              │
//! │                                                                      │
//! │  on_tick ──► PredictionCoordinator ──► PredictionResult (sync)       │
//! │     │              ▲          ▲                                      │
//! │     │ try_send     │ snapshot │ Arc<PerCarModel>                     │
//! │     ▼              │          │                                      │
//! │  CollectorWorker ──┴─ fold ─► PatternLearner     ModelRegistry       │
//! │  (blocking pool)                   ▲                  ▲              │
//! │     │ LearningJob                  │ persist          │ install      │
//! │     ▼                              │                  │              │
//! │  LearningDaemon ──► run_passes ────┴── train ─────────┘              │
//! │  (tokio task)          └── storage pass ──► SyntheticStore           │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `on_tick` never awaits and never touches disk. A full sample channel
//! drops the sample for collection only; the forecast is unaffected.
//!
//! # Example
//!
//! ```ignore
//! use tirecast::engine::{EngineConfig, TireEngine};
//!
//! let mut engine = TireEngine::start(EngineConfig::new(data_dir)).await?;
//! engine.on_session_change(info).await?;
//! for (sample, measured) in feed {
//!     let result = engine.on_tick(sample, measured);
//!     overlay.show(&result);
//! }
//! engine.on_session_end().await?;
//! engine.shutdown().await;
//! ```

mod config;
mod learning;
mod worker;

pub use config::{
    EngineConfig, DEFAULT_SAMPLE_CHANNEL_CAPACITY, LOGS_DIR, MODELS_DIR, PATTERNS_DIR,
    PATTERNS_FILE, SESSIONS_DIR, SYNTHETIC_FILE,
};
pub use learning::{LearningContext, LearningDaemon, LearningJob, PassesReport};

use std::collections::VecDeque;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::artifact::ArtifactError;
use crate::collector::{CollectorError, DataCollector, FinishedSession, SessionStore};
use crate::patterns::PatternLearner;
use crate::physics::PhysicsModel;
use crate::predictor::{CoordinatorMetrics, PredictionCoordinator, PredictionResult};
use crate::session::{LifecycleAction, SessionEvent, SessionLifecycle, SessionPhase};
use crate::storage::StorageManager;
use crate::telemetry::{SessionInfo, TelemetrySample, TireTemps};
use crate::trainer::{ModelRegistry, ModelTrainer, SyntheticStore};
use worker::{CollectorCommand, CollectorWorker};

/// Errors surfaced by the engine's session operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to open data directory: {0}")]
    Storage(#[from] ArtifactError),

    #[error(transparent)]
    Collector(#[from] CollectorError),

    #[error("collector worker has stopped")]
    WorkerStopped,

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

struct Loaded {
    store: SessionStore,
    learner: Arc<PatternLearner>,
    registry: Arc<ModelRegistry>,
    synthetic: Arc<SyntheticStore>,
}

/// Live tire temperature forecasting with background learning.
pub struct TireEngine {
    config: EngineConfig,
    coordinator: PredictionCoordinator,
    lifecycle: SessionLifecycle,
    learner: Arc<PatternLearner>,
    registry: Arc<ModelRegistry>,
    synthetic: Arc<SyntheticStore>,

    commands: Option<mpsc::Sender<CollectorCommand>>,
    reports: mpsc::UnboundedReceiver<PassesReport>,
    completed: VecDeque<PassesReport>,
    collector_handle: Option<JoinHandle<()>>,
    learning_handle: Option<JoinHandle<()>>,
    shutdown: CancellationToken,

    dropped_samples: u64,
}

impl TireEngine {
    /// Load persisted state and start the background workers.
    pub async fn start(config: EngineConfig) -> Result<Self, EngineError> {
        let sessions_dir = config.sessions_dir();
        let models_dir = config.models_dir();
        let patterns_path = config.patterns_path();
        let synthetic_path = config.synthetic_path();

        let loaded = tokio::task::spawn_blocking(move || -> Result<Loaded, ArtifactError> {
            let store = SessionStore::new(sessions_dir);
            store.recover_orphans()?;
            Ok(Loaded {
                store,
                learner: Arc::new(PatternLearner::open(patterns_path)),
                registry: Arc::new(ModelRegistry::open(models_dir)),
                synthetic: Arc::new(SyntheticStore::open(synthetic_path)),
            })
        })
        .await??;

        let shutdown = CancellationToken::new();
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel(config.sample_channel_capacity);

        let trainer = ModelTrainer::new(config.trainer.clone());
        let context = Arc::new(LearningContext {
            store: loaded.store.clone(),
            learner: Arc::clone(&loaded.learner),
            registry: Arc::clone(&loaded.registry),
            synthetic: Arc::clone(&loaded.synthetic),
            storage: StorageManager::new(config.budget, loaded.store.clone(), config.models_dir())
                .with_trainer(trainer.clone()),
            trainer,
        });
        let daemon = LearningDaemon::new(context, job_rx, report_tx);
        let learning_handle = tokio::spawn(daemon.run(shutdown.clone()));

        let collector = DataCollector::new(config.collector.clone(), loaded.store);
        let worker = CollectorWorker::new(collector, Arc::clone(&loaded.learner), job_tx);
        let collector_handle = tokio::task::spawn_blocking(move || worker.run(command_rx));

        let coordinator = PredictionCoordinator::new(
            config.coordinator.clone(),
            PhysicsModel::new(config.physics.clone()),
            Arc::clone(&loaded.learner),
            Arc::clone(&loaded.registry),
        );

        info!(
            data_dir = %config.data_dir.display(),
            models = loaded.registry.len(),
            "Tire engine started"
        );

        Ok(Self {
            config,
            coordinator,
            lifecycle: SessionLifecycle::new(),
            learner: loaded.learner,
            registry: loaded.registry,
            synthetic: loaded.synthetic,
            commands: Some(command_tx),
            reports: report_rx,
            completed: VecDeque::new(),
            collector_handle: Some(collector_handle),
            learning_handle: Some(learning_handle),
            shutdown,
            dropped_samples: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        self.lifecycle.phase()
    }

    pub fn current_session(&self) -> Option<&SessionInfo> {
        self.lifecycle.current()
    }

    pub fn learner(&self) -> &Arc<PatternLearner> {
        &self.learner
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Training samples kept from sessions the storage pass deleted.
    pub fn synthetic(&self) -> &Arc<SyntheticStore> {
        &self.synthetic
    }

    pub fn metrics(&self) -> Arc<CoordinatorMetrics> {
        self.coordinator.metrics()
    }

    /// Samples dropped for collection because the worker fell behind.
    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }

    /// Announce the session the following samples belong to.
    ///
    /// A different session still running is ended first and its passes are
    /// queued.
    pub async fn on_session_change(&mut self, info: SessionInfo) -> Result<(), EngineError> {
        self.drain_reports();

        let transition = self.lifecycle.handle(SessionEvent::SessionChanged(info));
        let next = match transition.action {
            LifecycleAction::Begin(next) => next,
            LifecycleAction::EndThenBegin { ending, next } => {
                debug!(
                    ending = %ending.session_id,
                    next = %next.session_id,
                    "Session changed mid-session"
                );
                next
            }
            LifecycleAction::None | LifecycleAction::End(_) => return Ok(()),
        };

        self.coordinator.set_session(Some(next.clone()));
        let (reply, response) = oneshot::channel();
        self.send(CollectorCommand::Start { info: next, reply })
            .await?;
        response.await.map_err(|_| EngineError::WorkerStopped)??;
        Ok(())
    }

    /// Forecast one tick and forward the sample for collection.
    ///
    /// Always returns a usable result: a rejected sample yields the previous
    /// forecast.
    pub fn on_tick(
        &mut self,
        sample: TelemetrySample,
        measured: Option<TireTemps>,
    ) -> PredictionResult {
        self.drain_reports();

        let result = match self.coordinator.predict(&sample, measured.as_ref()) {
            Ok(result) => result,
            Err(e) => {
                debug!(error = %e, timestamp = sample.timestamp, "Rejected sample");
                return self
                    .coordinator
                    .last_result()
                    .cloned()
                    .unwrap_or_else(|| PredictionResult::empty(sample.timestamp));
            }
        };

        if self.lifecycle.current().is_some() {
            self.lifecycle.handle(SessionEvent::SampleObserved);
            if let Some(commands) = &self.commands {
                match commands.try_send(CollectorCommand::Sample { sample, measured }) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        self.dropped_samples += 1;
                        debug!(
                            dropped = self.dropped_samples,
                            "Collector behind, sample not recorded"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        warn!("Collector worker stopped, sample not recorded");
                    }
                }
            }
        }

        result
    }

    /// End the current session. Duplicate calls return `None`.
    ///
    /// The session's data is on disk when this returns; training and storage
    /// passes run in the background.
    pub async fn on_session_end(&mut self) -> Result<Option<FinishedSession>, EngineError> {
        self.drain_reports();

        let transition = self.lifecycle.handle(SessionEvent::SessionEnded);
        let LifecycleAction::End(info) = transition.action else {
            debug!(phase = %transition.to, "Ignoring session end");
            return Ok(None);
        };

        self.coordinator.set_session(None);
        let (reply, response) = oneshot::channel();
        self.send(CollectorCommand::End { reply }).await?;
        let finished = response.await.map_err(|_| EngineError::WorkerStopped)??;

        info!(session = %info.session_id, "Session ended, passes queued");
        Ok(finished)
    }

    /// Wait for the next session's passes to complete.
    pub async fn next_report(&mut self) -> Option<PassesReport> {
        if let Some(report) = self.completed.pop_front() {
            return Some(report);
        }
        let report = self.reports.recv().await?;
        self.lifecycle.handle(SessionEvent::PassesCompleted);
        Some(report)
    }

    /// Close the current session and stop the workers.
    ///
    /// Passes not yet run are skipped; they run at the next session boundary.
    pub async fn shutdown(mut self) {
        info!("Tire engine shutting down");

        if let Some(commands) = self.commands.take() {
            if self.lifecycle.current().is_some() {
                let (reply, response) = oneshot::channel();
                if commands.send(CollectorCommand::End { reply }).await.is_ok() {
                    if let Ok(Err(e)) = response.await {
                        warn!(error = %e, "Failed to close session");
                    }
                }
            }
        }
        if let Some(handle) = self.collector_handle.take() {
            let _ = handle.await;
        }

        self.shutdown.cancel();
        if let Some(handle) = self.learning_handle.take() {
            let _ = handle.await;
        }
        info!("Tire engine stopped");
    }

    async fn send(&self, command: CollectorCommand) -> Result<(), EngineError> {
        let commands = self.commands.as_ref().ok_or(EngineError::WorkerStopped)?;
        commands
            .send(command)
            .await
            .map_err(|_| EngineError::WorkerStopped)
    }

    fn drain_reports(&mut self) {
        while let Ok(report) = self.reports.try_recv() {
            debug!(session = %report.info.session_id, "Session passes completed");
            self.lifecycle.handle(SessionEvent::PassesCompleted);
            self.completed.push_back(report);
        }
    }
}

impl Drop for TireEngine {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for TireEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TireEngine")
            .field("data_dir", &self.config.data_dir)
            .field("phase", &self.lifecycle.phase())
            .field("models", &self.registry.len())
            .field("dropped_samples", &self.dropped_samples)
            .finish()
    }
}
