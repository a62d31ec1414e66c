//! Service metrics tracking.
//!
//! This module provides metrics tracking for the inference service.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Tracks invocation counts and outcomes.
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    /// Total number of invocations received
    total_invocations: Arc<AtomicU64>,

    /// Number of invocations currently in flight
    active_invocations: Arc<AtomicU32>,

    /// Maximum number of concurrent invocations observed
    max_concurrent_invocations: Arc<AtomicU32>,

    /// Invocations answered with a transcript
    succeeded: Arc<AtomicU64>,

    /// Invocations rejected for bad input (4xx)
    client_errors: Arc<AtomicU64>,

    /// Invocations that failed server side (5xx)
    server_errors: Arc<AtomicU64>,

    /// Invocations turned away while the model was not ready
    not_ready: Arc<AtomicU64>,

    /// Sum of reported processing times in milliseconds
    processing_ms_total: Arc<AtomicU64>,

    /// Server start time
    start_time: Instant,
}

/// Outcome classes recorded by [`ServiceMetrics::finish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    ClientError,
    ServerError,
    NotReady,
}

/// Decrements the in-flight gauge when dropped.
pub struct InFlight<'a> {
    metrics: &'a ServiceMetrics,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.metrics.active_invocations.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ServiceMetrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            total_invocations: Arc::new(AtomicU64::new(0)),
            active_invocations: Arc::new(AtomicU32::new(0)),
            max_concurrent_invocations: Arc::new(AtomicU32::new(0)),
            succeeded: Arc::new(AtomicU64::new(0)),
            client_errors: Arc::new(AtomicU64::new(0)),
            server_errors: Arc::new(AtomicU64::new(0)),
            not_ready: Arc::new(AtomicU64::new(0)),
            processing_ms_total: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    /// Count a new invocation. The returned guard keeps it in the in-flight gauge.
    pub fn begin(&self) -> InFlight<'_> {
        let active = self.active_invocations.fetch_add(1, Ordering::SeqCst) + 1;
        self.total_invocations.fetch_add(1, Ordering::SeqCst);
        self.max_concurrent_invocations
            .fetch_max(active, Ordering::SeqCst);
        InFlight { metrics: self }
    }

    /// Record how an invocation ended.
    pub fn finish(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Success => &self.succeeded,
            Outcome::ClientError => &self.client_errors,
            Outcome::ServerError => &self.server_errors,
            Outcome::NotReady => &self.not_ready,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Add a successful invocation's processing time.
    pub fn record_processing_time(&self, secs: f64) {
        self.processing_ms_total
            .fetch_add((secs * 1000.0).round() as u64, Ordering::SeqCst);
    }

    /// Get all metrics as a serde_json::Value.
    pub fn to_json(&self) -> serde_json::Value {
        let succeeded = self.succeeded.load(Ordering::SeqCst);
        let processing_ms = self.processing_ms_total.load(Ordering::SeqCst);
        let mean_processing_ms = if succeeded == 0 {
            0.0
        } else {
            processing_ms as f64 / succeeded as f64
        };

        serde_json::json!({
            "uptime_seconds": self.start_time.elapsed().as_secs(),
            "total_invocations": self.total_invocations.load(Ordering::SeqCst),
            "active_invocations": self.active_invocations.load(Ordering::SeqCst),
            "max_concurrent_invocations": self.max_concurrent_invocations.load(Ordering::SeqCst),
            "succeeded": succeeded,
            "client_errors": self.client_errors.load(Ordering::SeqCst),
            "server_errors": self.server_errors.load(Ordering::SeqCst),
            "not_ready": self.not_ready.load(Ordering::SeqCst),
            "mean_processing_ms": mean_processing_ms,
        })
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}
