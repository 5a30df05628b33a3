//! Statistics tracking for purge dispatch

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const MAX_LATENCY_SAMPLES: usize = 1000;

/// Snapshot of dispatch statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurgeStats {
    pub requests_sent: u64,
    pub requests_failed: u64,
    pub invalidations_succeeded: u64,
    pub invalidations_failed: u64,
    pub latency_p50_ms: f64,
    pub latency_p99_ms: f64,
}

/// Thread-safe statistics collector
#[derive(Debug, Clone)]
pub struct StatsCollector {
    requests_sent: Arc<AtomicU64>,
    requests_failed: Arc<AtomicU64>,
    invalidations_succeeded: Arc<AtomicU64>,
    invalidations_failed: Arc<AtomicU64>,
    latencies: Arc<std::sync::Mutex<Vec<f64>>>,
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            requests_sent: Arc::new(AtomicU64::new(0)),
            requests_failed: Arc::new(AtomicU64::new(0)),
            invalidations_succeeded: Arc::new(AtomicU64::new(0)),
            invalidations_failed: Arc::new(AtomicU64::new(0)),
            latencies: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// Record one completed outbound request
    pub fn record_request(&self, success: bool, latency_ms: f64) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.record_latency(latency_ms);
    }

    /// Record the final outcome of `count` invalidations
    pub fn record_outcome(&self, success: bool, count: usize) {
        let counter = if success {
            &self.invalidations_succeeded
        } else {
            &self.invalidations_failed
        };
        counter.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn record_latency(&self, latency_ms: f64) {
        if let Ok(mut latencies) = self.latencies.lock() {
            latencies.push(latency_ms);
            // Keep only the most recent samples
            if latencies.len() > MAX_LATENCY_SAMPLES {
                latencies.drain(0..MAX_LATENCY_SAMPLES / 2);
            }
        }
    }

    pub fn snapshot(&self) -> PurgeStats {
        let (p50, p99) = if let Ok(latencies) = self.latencies.lock() {
            if latencies.is_empty() {
                (0.0, 0.0)
            } else {
                let mut sorted = latencies.clone();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let p50_idx = (sorted.len() as f64 * 0.50) as usize;
                let p99_idx = (sorted.len() as f64 * 0.99) as usize;
                (
                    sorted[p50_idx.min(sorted.len() - 1)],
                    sorted[p99_idx.min(sorted.len() - 1)],
                )
            }
        } else {
            (0.0, 0.0)
        };

        PurgeStats {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            invalidations_succeeded: self.invalidations_succeeded.load(Ordering::Relaxed),
            invalidations_failed: self.invalidations_failed.load(Ordering::Relaxed),
            latency_p50_ms: p50,
            latency_p99_ms: p99,
        }
    }

}
