//! Metrics module for Prometheus-based monitoring.
//!
//! Tracks workflow runs, quality checks, lineage recording, and the batch
//! fan-out.
//!
//! # Example
//!
//! ```ignore
//! use ghg_pipeline::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics().expect("Failed to initialize metrics");
//!
//! let collector = MetricsCollector::new();
//! collector.record_run("success", "none", 42.0);
//!
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    BATCHES_PER_RUN, CALCULATIONS_IN_FLIGHT, CALCULATIONS_TOTAL, LINEAGE_EVENTS_TOTAL,
    LINEAGE_RETRIES_TOTAL, QUALITY_CHECKS_TOTAL, REGISTRY, RUNS_TOTAL, RUN_DURATION,
};
