//! Metrics collection for batch execution
//!
//! Provides Prometheus-compatible metrics for rounds, attempts and abandoned
//! work. Everything registers into the default registry.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};
use std::time::Duration;

use crate::batch::ExecutionResult;

lazy_static! {
    /// Counter for rounds run
    static ref ROUNDS: IntCounter = register_int_counter!(
        "dirbatch_rounds_total",
        "Total number of rounds run"
    ).unwrap();

    /// Counter for attempts by status
    static ref ATTEMPTS: IntCounterVec = register_int_counter_vec!(
        "dirbatch_attempts_total",
        "Total number of unit attempts",
        &["status"]
    ).unwrap();

    static ref ABANDONED: IntCounter = register_int_counter!(
        "dirbatch_abandoned_attempts_total",
        "Attempts aborted at a round boundary"
    ).unwrap();

    /// Histogram for round duration
    static ref ROUND_DURATION: Histogram = register_histogram!(
        "dirbatch_round_duration_seconds",
        "Round duration in seconds",
        vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0]
    ).unwrap();
}

/// Record a finished round
pub fn record_round(duration: Duration, abandoned: usize) {
    ROUNDS.inc();
    ROUND_DURATION.observe(duration.as_secs_f64());
    ABANDONED.inc_by(abandoned as u64);
}

/// Record one attempt's status
pub fn record_attempt(result: &ExecutionResult) {
    let status = match &result.error {
        None => "succeeded",
        Some(err) if err.is_timeout() => "timed_out",
        Some(_) => "failed",
    };
    ATTEMPTS.with_label_values(&[status]).inc();
}

/// Export all metrics in Prometheus text format
pub fn export_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::WorkUnit;

    #[test]
    fn test_recorded_metrics_are_exported() {
        record_round(Duration::from_millis(20), 1);
        record_attempt(&ExecutionResult::timed_out(WorkUnit::from("a"), 1));

        let text = export_metrics();
        assert!(text.contains("dirbatch_rounds_total"));
        assert!(text.contains("dirbatch_attempts_total"));
        assert!(text.contains("timed_out"));
    }
}
