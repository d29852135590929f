//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by ghg-pipeline and
//! provides functions for initializing, registering, and exporting them.

use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, IntCounter, Opts,
    Registry, TextEncoder,
};
use std::sync::{Mutex, OnceLock};

/// Serializes initialization so all metrics land in the same registry.
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Global Prometheus registry for all ghg-pipeline metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total workflow runs, labeled by outcome and failure reason.
pub static RUNS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Workflow run duration in seconds, labeled by outcome.
pub static RUN_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Quality gate evaluations, labeled by result.
pub static QUALITY_CHECKS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Lineage recording calls, labeled by action and status.
pub static LINEAGE_EVENTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Lineage recording retries.
pub static LINEAGE_RETRIES_TOTAL: OnceLock<IntCounter> = OnceLock::new();

/// Batch calculations, labeled by status.
pub static CALCULATIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Calculation tasks currently holding a concurrency slot.
pub static CALCULATIONS_IN_FLIGHT: OnceLock<Gauge> = OnceLock::new();

/// Number of batches produced per run.
pub static BATCHES_PER_RUN: OnceLock<Histogram> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// This function should be called once at application startup. Calling it
/// again is harmless: the first registration wins.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due to
/// duplicate metric names or invalid metric configurations.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    // Run metrics
    let runs_total = CounterVec::new(
        Opts::new("ghg_pipeline_runs_total", "Total number of workflow runs"),
        &["outcome", "reason"],
    )?;

    let run_duration = HistogramVec::new(
        HistogramOpts::new(
            "ghg_pipeline_run_duration_seconds",
            "Workflow run duration in seconds",
        )
        .buckets(vec![1.0, 5.0, 15.0, 60.0, 180.0, 450.0, 900.0]),
        &["outcome"],
    )?;

    let quality_checks_total = CounterVec::new(
        Opts::new(
            "ghg_pipeline_quality_checks_total",
            "Data quality gate evaluations",
        ),
        &["result"],
    )?;

    // Lineage metrics
    let lineage_events_total = CounterVec::new(
        Opts::new(
            "ghg_pipeline_lineage_events_total",
            "Lineage recording calls by action and status",
        ),
        &["action", "status"],
    )?;

    let lineage_retries_total = IntCounter::new(
        "ghg_pipeline_lineage_retries_total",
        "Lineage recording retries",
    )?;

    // Calculation metrics
    let calculations_total = CounterVec::new(
        Opts::new(
            "ghg_pipeline_calculations_total",
            "Batch emissions calculations by status",
        ),
        &["status"],
    )?;

    let calculations_in_flight = Gauge::new(
        "ghg_pipeline_calculations_in_flight",
        "Calculation tasks currently running",
    )?;

    let batches_per_run = Histogram::with_opts(
        HistogramOpts::new("ghg_pipeline_batches_per_run", "Batches produced per run")
            .buckets(vec![0.0, 1.0, 5.0, 10.0, 40.0, 100.0, 500.0]),
    )?;

    registry.register(Box::new(runs_total.clone()))?;
    registry.register(Box::new(run_duration.clone()))?;
    registry.register(Box::new(quality_checks_total.clone()))?;
    registry.register(Box::new(lineage_events_total.clone()))?;
    registry.register(Box::new(lineage_retries_total.clone()))?;
    registry.register(Box::new(calculations_total.clone()))?;
    registry.register(Box::new(calculations_in_flight.clone()))?;
    registry.register(Box::new(batches_per_run.clone()))?;

    let _ = REGISTRY.set(registry);
    let _ = RUNS_TOTAL.set(runs_total);
    let _ = RUN_DURATION.set(run_duration);
    let _ = QUALITY_CHECKS_TOTAL.set(quality_checks_total);
    let _ = LINEAGE_EVENTS_TOTAL.set(lineage_events_total);
    let _ = LINEAGE_RETRIES_TOTAL.set(lineage_retries_total);
    let _ = CALCULATIONS_TOTAL.set(calculations_total);
    let _ = CALCULATIONS_IN_FLIGHT.set(calculations_in_flight);
    let _ = BATCHES_PER_RUN.set(batches_per_run);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns a comment line instead of metrics when the registry has not been
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics() {
        let result = init_metrics();
        assert!(result.is_ok() || REGISTRY.get().is_some());
    }

    #[test]
    fn test_metrics_after_init() {
        let _ = init_metrics();

        if let Some(runs) = RUNS_TOTAL.get() {
            runs.with_label_values(&["success", "none"]).inc();
        }

        let metrics = export_metrics();
        assert!(!metrics.starts_with("# Error"));
        assert!(metrics.contains("ghg_pipeline_runs_total"));
    }
}
