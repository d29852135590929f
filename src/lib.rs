//! ghg-pipeline: Greenhouse-gas activity data pipeline orchestrator.
//!
//! This library sequences raw activity files through quality gating, bulk
//! transformation, and a bounded parallel emissions calculation, recording
//! an auditable lineage trail around every step.

// Core modules
pub mod cli;
pub mod error;
pub mod lineage;
pub mod metrics;
pub mod pipeline;

// Re-export commonly used types
pub use error::{CalculationError, EscalationError, LineageError, TransformError, WorkflowError};
pub use pipeline::{ExecutionContext, TerminalState, WorkflowConfig, WorkflowEngine};
