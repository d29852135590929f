//! Metric recording helpers for workflow operations.
//!
//! `MetricsCollector` wraps the raw Prometheus metrics with methods named
//! after what the workflow does. Every method is a no-op until
//! `init_metrics()` has run, so library users who never export metrics pay
//! nothing but a `OnceLock` read.

use super::prometheus::{
    BATCHES_PER_RUN, CALCULATIONS_IN_FLIGHT, CALCULATIONS_TOTAL, LINEAGE_EVENTS_TOTAL,
    LINEAGE_RETRIES_TOTAL, QUALITY_CHECKS_TOTAL, RUNS_TOTAL, RUN_DURATION,
};

/// Metrics collector for recording workflow operational metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    /// Create a new MetricsCollector instance.
    pub fn new() -> Self {
        Self
    }

    /// Record a terminal workflow run.
    ///
    /// # Arguments
    ///
    /// * `outcome` - "success" or "failure"
    /// * `reason` - failure kind, or "none" for successful runs
    /// * `duration_secs` - run duration in seconds
    pub fn record_run(&self, outcome: &str, reason: &str, duration_secs: f64) {
        if let Some(runs) = RUNS_TOTAL.get() {
            runs.with_label_values(&[outcome, reason]).inc();
        }

        if let Some(duration) = RUN_DURATION.get() {
            duration.with_label_values(&[outcome]).observe(duration_secs);
        }

        tracing::trace!(
            outcome = outcome,
            reason = reason,
            duration_secs = duration_secs,
            "Recorded run metric"
        );
    }

    /// Record a quality gate evaluation ("passed" or "failed").
    pub fn record_quality_check(&self, result: &str) {
        if let Some(checks) = QUALITY_CHECKS_TOTAL.get() {
            checks.with_label_values(&[result]).inc();
        }
    }

    /// Record the final status of a lineage recording for `action`.
    pub fn record_lineage(&self, action: &str, success: bool) {
        let status = if success { "success" } else { "failure" };
        if let Some(events) = LINEAGE_EVENTS_TOTAL.get() {
            events.with_label_values(&[action, status]).inc();
        }
    }

    /// Record one lineage retry.
    pub fn record_lineage_retry(&self) {
        if let Some(retries) = LINEAGE_RETRIES_TOTAL.get() {
            retries.inc();
        }
    }

    /// Record how many batches a run fanned out over.
    pub fn record_batches(&self, count: usize) {
        if let Some(batches) = BATCHES_PER_RUN.get() {
            batches.observe(count as f64);
        }
    }

    /// Record a batch calculation outcome ("success", "failure", "cancelled").
    pub fn record_calculation(&self, status: &str) {
        if let Some(calculations) = CALCULATIONS_TOTAL.get() {
            calculations.with_label_values(&[status]).inc();
        }
    }

    /// Mark a calculation task as started.
    pub fn calculation_started(&self) {
        if let Some(gauge) = CALCULATIONS_IN_FLIGHT.get() {
            gauge.inc();
        }
    }

    /// Mark a calculation task as finished.
    pub fn calculation_finished(&self) {
        if let Some(gauge) = CALCULATIONS_IN_FLIGHT.get() {
            gauge.dec();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{export_metrics, init_metrics};

    #[test]
    fn test_collector_records_without_panicking() {
        let _ = init_metrics();
        let collector = MetricsCollector::new();

        collector.record_run("failure", "timeout", 900.0);
        collector.record_quality_check("passed");
        collector.record_lineage("RAW_DATA_INPUT", true);
        collector.record_lineage_retry();
        collector.record_batches(5);
        collector.record_calculation("success");
        collector.calculation_started();
        collector.calculation_finished();

        let text = export_metrics();
        assert!(text.contains("ghg_pipeline_lineage_events_total"));
        assert!(text.contains("ghg_pipeline_batches_per_run"));
    }
}
