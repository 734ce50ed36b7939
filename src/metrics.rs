// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for log-relay.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host process is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `log_relay_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `path`: resilient, direct, sweep, bulk
//! - `status`: success, failure, rejected

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record the final outcome of a write on a given path
pub fn record_write(path: &str, status: &str) {
    counter!(
        "log_relay_writes_total",
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record write latency
pub fn record_latency(path: &str, operation: &str, duration: Duration) {
    histogram!(
        "log_relay_operation_seconds",
        "path" => path.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a retry attempt (not counting the first try)
pub fn record_retry(operation: &str) {
    counter!(
        "log_relay_retries_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record circuit breaker call
pub fn record_circuit_call(circuit: &str, outcome: &str) {
    counter!(
        "log_relay_circuit_breaker_calls_total",
        "circuit" => circuit.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Set circuit breaker state (0 = closed, 1 = half-open, 2 = open)
pub fn set_circuit_state(circuit: &str, state: u8) {
    gauge!(
        "log_relay_circuit_breaker_state",
        "circuit" => circuit.to_string()
    )
    .set(state as f64);
}

/// Record a fallback file write attempt
pub fn record_fallback_written(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("log_relay_fallback_writes_total", "status" => status).increment(1);
}

/// Record a fallback file removed after delivery
pub fn record_fallback_deleted() {
    counter!("log_relay_fallback_deleted_total").increment(1);
}

/// Record a corrupt fallback file discarded
pub fn record_fallback_discarded() {
    counter!("log_relay_fallback_discarded_total").increment(1);
}

/// Set the number of fallback files waiting on disk
pub fn set_fallback_pending(count: usize) {
    gauge!("log_relay_fallback_pending").set(count as f64);
}

/// Record one reprocessing tick by result (skipped, processed, panicked)
pub fn record_reprocessing_tick(result: &str) {
    counter!(
        "log_relay_reprocessing_ticks_total",
        "result" => result.to_string()
    )
    .increment(1);
}

/// Record one bulk call
pub fn record_bulk_batch(size: usize, duration: Duration) {
    histogram!("log_relay_bulk_batch_size").record(size as f64);
    histogram!("log_relay_bulk_flush_seconds").record(duration.as_secs_f64());
}

/// Record items the backend rejected inside a bulk response
pub fn record_bulk_item_failures(count: usize) {
    counter!("log_relay_bulk_item_failures_total").increment(count as u64);
}

/// Record a submission refused at admission (full, closed)
pub fn record_bulk_rejected(reason: &str) {
    counter!(
        "log_relay_bulk_rejected_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Set the number of entries queued for bulk write
pub fn set_bulk_queue_depth(count: usize) {
    gauge!("log_relay_bulk_queue_depth").set(count as f64);
}

/// Record an ingested queue message by disposition
pub fn record_ingest(disposition: &str) {
    counter!(
        "log_relay_ingest_messages_total",
        "disposition" => disposition.to_string()
    )
    .increment(1);
}

/// Set service lifecycle state (for dashboards)
pub fn set_service_state(state: &str) {
    for s in ["Created", "Starting", "Running", "ShuttingDown", "Stopped"] {
        gauge!("log_relay_service_state", "state" => s).set(if s == state { 1.0 } else { 0.0 });
    }
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    path: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(path: &'static str, operation: &'static str) -> Self {
        Self {
            path,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.path, self.operation, self.start.elapsed());
    }
}
