//! Lock-free coordinator counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use super::result::{Layer, PredictionResult};

/// Counters updated on every prediction.
///
/// Shared by reference between the live path and whoever reports on it.
#[derive(Debug, Default)]
pub struct CoordinatorMetrics {
    predictions: AtomicU64,
    rejected: AtomicU64,
    measured: AtomicU64,
    model_used: AtomicU64,
    pattern_used: AtomicU64,
    total_latency_us: AtomicU64,
    max_latency_us: AtomicU64,
}

/// Point-in-time copy of [`CoordinatorMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoordinatorSnapshot {
    pub predictions: u64,
    pub rejected: u64,
    pub measured: u64,
    pub model_used: u64,
    pub pattern_used: u64,
    pub mean_latency_us: f64,
    pub max_latency_us: u64,
}

impl CoordinatorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, result: &PredictionResult, latency: Duration) {
        let us = latency.as_micros().min(u64::MAX as u128) as u64;
        self.predictions.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us.fetch_add(us, Ordering::Relaxed);
        self.max_latency_us.fetch_max(us, Ordering::Relaxed);

        if result.measured {
            self.measured.fetch_add(1, Ordering::Relaxed);
        }
        if result.layer(Layer::Model).is_some() {
            self.model_used.fetch_add(1, Ordering::Relaxed);
        }
        if result.layer(Layer::CarClassPattern).is_some()
            || result.layer(Layer::TrackPattern).is_some()
        {
            self.pattern_used.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CoordinatorSnapshot {
        let predictions = self.predictions.load(Ordering::Relaxed);
        let total = self.total_latency_us.load(Ordering::Relaxed);
        CoordinatorSnapshot {
            predictions,
            rejected: self.rejected.load(Ordering::Relaxed),
            measured: self.measured.load(Ordering::Relaxed),
            model_used: self.model_used.load(Ordering::Relaxed),
            pattern_used: self.pattern_used.load(Ordering::Relaxed),
            mean_latency_us: if predictions > 0 {
                total as f64 / predictions as f64
            } else {
                0.0
            },
            max_latency_us: self.max_latency_us.load(Ordering::Relaxed),
        }
    }
}
