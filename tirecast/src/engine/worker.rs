//! Collector worker: owns the [`DataCollector`] off the live path.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::learning::LearningJob;
use crate::collector::{CollectorError, DataCollector, FinishedSession};
use crate::patterns::PatternLearner;
use crate::telemetry::{SessionInfo, TelemetrySample, TireTemps};

pub(crate) type SessionReply = oneshot::Sender<Result<Option<FinishedSession>, CollectorError>>;

/// Messages from the engine to the collector worker.
#[derive(Debug)]
pub(crate) enum CollectorCommand {
    Start {
        info: SessionInfo,
        reply: SessionReply,
    },
    Sample {
        sample: TelemetrySample,
        measured: Option<TireTemps>,
    },
    End {
        reply: SessionReply,
    },
}

/// Runs on the blocking pool; segment writes happen inline.
pub(crate) struct CollectorWorker {
    collector: DataCollector,
    learner: Arc<PatternLearner>,
    jobs: mpsc::UnboundedSender<LearningJob>,
}

impl CollectorWorker {
    pub(crate) fn new(
        collector: DataCollector,
        learner: Arc<PatternLearner>,
        jobs: mpsc::UnboundedSender<LearningJob>,
    ) -> Self {
        Self {
            collector,
            learner,
            jobs,
        }
    }

    /// Process commands until every sender is dropped.
    pub(crate) fn run(mut self, mut commands: mpsc::Receiver<CollectorCommand>) {
        debug!("Collector worker starting");

        while let Some(command) = commands.blocking_recv() {
            match command {
                CollectorCommand::Start { info, reply } => {
                    let result = self.collector.start_session(info);
                    let _ = reply.send(self.finish(result));
                }
                CollectorCommand::Sample { sample, measured } => {
                    match self.collector.record(&sample, measured.as_ref()) {
                        Ok(outcome) => {
                            if let Some(segment) = outcome.flushed {
                                self.learner.fold(&segment);
                            }
                        }
                        Err(e) => warn!(error = %e, "Failed to record sample"),
                    }
                }
                CollectorCommand::End { reply } => {
                    let result = self.collector.end_session();
                    let _ = reply.send(self.finish(result));
                }
            }
        }

        // Engine dropped without ending the session: keep what was recorded
        if let Err(e) = self.collector.end_session() {
            warn!(error = %e, "Failed to close session on shutdown");
        }
        debug!("Collector worker stopped");
    }

    /// Feed the final segment to the learner and queue the session's passes.
    fn finish(
        &self,
        result: Result<Option<FinishedSession>, CollectorError>,
    ) -> Result<Option<FinishedSession>, CollectorError> {
        if let Ok(Some(finished)) = &result {
            if let Some(segment) = &finished.final_segment {
                self.learner.fold(segment);
            }
            let job = LearningJob {
                info: finished.info.clone(),
            };
            if self.jobs.send(job).is_err() {
                info!(
                    session = %finished.info.session_id,
                    "Learning daemon stopped, passes deferred to next session"
                );
            }
        }
        result
    }
}
