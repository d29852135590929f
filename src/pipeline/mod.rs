//! GHG pipeline workflow orchestration.
//!
//! This module sequences one raw activity file through quality gating,
//! bulk transformation, and a bounded parallel emissions calculation,
//! recording lineage around every transition.
//!
//! # Architecture
//!
//! - **Engine**: the state machine that owns the run deadline and resolves
//!   every run to `Success` or `Failure`
//! - **Gates**: the quality gate (the only branch point) and the approval
//!   escalation taken when it fails
//! - **Transform**: the external bulk transform and its batch manifest
//! - **Calculator**: the all-or-nothing fan-out over batches
//! - **Config**: deadline, concurrency ceiling, and retry budgets
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ghg_pipeline::lineage::InMemoryLineageLedger;
//! use ghg_pipeline::pipeline::{
//!     ExecutionContext, StaticBulkTransform, StaticCalculationBackend, WorkflowConfig,
//!     WorkflowEngine,
//! };
//!
//! let engine = WorkflowEngine::new(
//!     WorkflowConfig::from_env()?,
//!     Arc::new(InMemoryLineageLedger::new()),
//!     Arc::new(StaticBulkTransform::new("s3", "transformed", 5)),
//!     Arc::new(StaticCalculationBackend::new("enriched")),
//! )?;
//!
//! let context = ExecutionContext::new("s3", "s3://raw/activity.csv")
//!     .with_validation_result("PASSED");
//!
//! let terminal = engine.execute(context).await;
//! println!("success: {}", terminal.is_success());
//! ```

pub mod calculator;
pub mod config;
pub mod context;
pub mod engine;
pub mod gates;
pub mod retry;
pub mod transform;

pub use calculator::{CalculationBackend, ParallelCalculator, StaticCalculationBackend};
pub use config::{ConfigError, RetryPolicy, WorkflowConfig};
pub use context::{
    BatchDescriptor, CalculationResult, ExecutionContext, PendingManifest, QualityResult,
    QUALITY_PASS_MARKER,
};
pub use engine::{TerminalState, WorkflowEngine, WorkflowState, WorkflowStats};
pub use gates::{ApprovalGate, EscalationNotifier, QualityGate, TracingNotifier};
pub use retry::{with_backoff, Exhausted};
pub use transform::{
    BatchEnumerator, BulkTransform, BulkTransformInvoker, StaticBulkTransform, TransformOutput,
};
