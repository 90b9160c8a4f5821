//! The data collector: sampling, buffering and ground truth capture.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

use super::pit::{PitDetector, PitState, DEFAULT_STATIONARY_SPEED_KPH};
use super::record::SessionRecord;
use super::store::SessionStore;
use crate::artifact::ArtifactError;
use crate::telemetry::{GroundTruthSample, SessionInfo, TelemetrySample, TireTemps};

/// Default seconds between kept samples.
pub const DEFAULT_SAMPLE_INTERVAL_SECS: f64 = 1.0;

/// Default number of buffered samples that triggers a segment write.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 600;

/// Errors from the collector.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("failed to persist session data: {0}")]
    Persist(#[from] ArtifactError),
}

/// Collector configuration.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Seconds between kept samples.
    pub sample_interval_secs: f64,

    /// Buffered samples that trigger a segment write.
    pub flush_threshold: usize,

    /// Speed at or below which a car in the pit lane is stationary.
    pub stationary_speed_kph: f64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: DEFAULT_SAMPLE_INTERVAL_SECS,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            stationary_speed_kph: DEFAULT_STATIONARY_SPEED_KPH,
        }
    }
}

impl CollectorConfig {
    pub fn with_sample_interval(mut self, secs: f64) -> Self {
        self.sample_interval_secs = secs;
        self
    }

    pub fn with_flush_threshold(mut self, samples: usize) -> Self {
        self.flush_threshold = samples.max(1);
        self
    }
}

/// What happened on one tick.
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// The sample was kept by the rate limiter.
    pub sampled: bool,

    /// Ground truth captured on this tick.
    pub ground_truth: Option<GroundTruthSample>,

    /// A segment written on this tick.
    pub flushed: Option<SessionRecord>,
}

/// Summary of a session handed over to storage.
#[derive(Debug)]
pub struct FinishedSession {
    pub info: SessionInfo,

    /// Segment files now owned by storage.
    pub segments: Vec<PathBuf>,

    pub sample_count: usize,
    pub ground_truth_count: usize,

    /// The last segment, written at session end.
    pub final_segment: Option<SessionRecord>,
}

#[derive(Debug)]
struct ActiveSession {
    info: SessionInfo,
    samples: Vec<TelemetrySample>,
    ground_truth: Vec<GroundTruthSample>,
    last_sampled_at: Option<f64>,
    next_segment: u32,
    sample_count: usize,
    ground_truth_count: usize,
}

impl ActiveSession {
    fn new(info: SessionInfo, next_segment: u32) -> Self {
        Self {
            info,
            samples: Vec::new(),
            ground_truth: Vec::new(),
            last_sampled_at: None,
            next_segment,
            sample_count: 0,
            ground_truth_count: 0,
        }
    }

    fn is_due(&self, timestamp: f64, interval: f64) -> bool {
        match self.last_sampled_at {
            // A clock that runs backwards restarts the rate limiter
            Some(last) => timestamp < last || timestamp - last >= interval - 1e-6,
            None => true,
        }
    }

    fn has_buffered(&self) -> bool {
        !self.samples.is_empty() || !self.ground_truth.is_empty()
    }
}

/// Records the active session and captures pit-stop ground truth.
///
/// Owned by a single worker; nothing here is shared.
#[derive(Debug)]
pub struct DataCollector {
    config: CollectorConfig,
    store: SessionStore,
    pit: PitDetector,
    active: Option<ActiveSession>,
}

impl DataCollector {
    pub fn new(config: CollectorConfig, store: SessionStore) -> Self {
        let pit = PitDetector::new(config.stationary_speed_kph);
        Self {
            config,
            store,
            pit,
            active: None,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn pit_state(&self) -> PitState {
        self.pit.state()
    }

    /// The session currently being recorded.
    pub fn active_session(&self) -> Option<&SessionInfo> {
        self.active.as_ref().map(|a| &a.info)
    }

    /// Begin recording a new session.
    ///
    /// A session still open is ended first and returned.
    pub fn start_session(
        &mut self,
        info: SessionInfo,
    ) -> Result<Option<FinishedSession>, CollectorError> {
        let previous = self.end_session()?;

        let next_segment = self.store.next_segment_index(&info)?;
        info!(
            session = %info.session_id,
            car = %info.car_id,
            track = %info.track_id,
            "Recording session"
        );
        self.active = Some(ActiveSession::new(info, next_segment));
        self.pit.reset();

        Ok(previous)
    }

    /// Process one telemetry tick.
    ///
    /// `measured` carries tire temperatures when the simulator exposes them
    /// (only meaningful while stopped in the pits).
    pub fn record(
        &mut self,
        sample: &TelemetrySample,
        measured: Option<&TireTemps>,
    ) -> Result<TickOutcome, CollectorError> {
        let mut outcome = TickOutcome::default();

        let Some(active) = self.active.as_mut() else {
            return Ok(outcome);
        };
        if sample.session_id != active.info.session_id {
            debug!(
                expected = %active.info.session_id,
                got = %sample.session_id,
                "Ignoring sample from another session"
            );
            return Ok(outcome);
        }

        self.pit.update(sample.in_pit, sample.speed_kph);
        if self.pit.should_capture() {
            if let Some(temps) = measured {
                let gt = GroundTruthSample::from_sample(&active.info.car_id, sample, *temps);
                info!(
                    session = %active.info.session_id,
                    lap = gt.lap,
                    stint_time = gt.stint_time,
                    "Captured pit ground truth"
                );
                active.ground_truth.push(gt.clone());
                active.ground_truth_count += 1;
                self.pit.mark_captured();
                outcome.ground_truth = Some(gt);
            }
        }

        if active.is_due(sample.timestamp, self.config.sample_interval_secs) {
            active.samples.push(sample.clone());
            active.last_sampled_at = Some(sample.timestamp);
            active.sample_count += 1;
            outcome.sampled = true;
        }

        if active.samples.len() >= self.config.flush_threshold {
            outcome.flushed = Some(Self::flush(&self.store, active)?);
        }

        Ok(outcome)
    }

    /// Finish the active session and hand its segments to storage.
    ///
    /// Returns `None` when no session is open, so duplicate end signals are
    /// harmless.
    pub fn end_session(&mut self) -> Result<Option<FinishedSession>, CollectorError> {
        let Some(active) = self.active.as_mut() else {
            return Ok(None);
        };

        let final_segment = if active.has_buffered() {
            Some(Self::flush(&self.store, active)?)
        } else {
            None
        };
        let segments = self.store.finalize(&active.info)?;

        let Some(active) = self.active.take() else {
            return Ok(None);
        };
        self.pit.reset();

        info!(
            session = %active.info.session_id,
            samples = active.sample_count,
            ground_truth = active.ground_truth_count,
            segments = segments.len(),
            "Session recording finished"
        );

        Ok(Some(FinishedSession {
            info: active.info,
            segments,
            sample_count: active.sample_count,
            ground_truth_count: active.ground_truth_count,
            final_segment,
        }))
    }

    fn flush(
        store: &SessionStore,
        active: &mut ActiveSession,
    ) -> Result<SessionRecord, CollectorError> {
        let mut record = SessionRecord::new(active.info.clone(), active.next_segment);
        record.samples = std::mem::take(&mut active.samples);
        record.ground_truth = std::mem::take(&mut active.ground_truth);

        if let Err(e) = store.write_segment(&record) {
            // Keep the data buffered so the next flush can retry
            active.samples = std::mem::take(&mut record.samples);
            active.ground_truth = std::mem::take(&mut record.ground_truth);
            return Err(e.into());
        }

        active.next_segment += 1;
        Ok(record)
    }
}
