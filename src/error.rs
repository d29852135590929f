//! Error types for ghg-pipeline operations.
//!
//! Defines the error types for every external collaborator the workflow
//! talks to, plus the run-level `WorkflowError` that a failed run carries:
//! - Lineage service calls
//! - Bulk transform jobs and their batch manifests
//! - Per-batch emissions calculations
//! - Human-approval escalation notices
//! - Workflow termination reasons

use std::time::Duration;

use thiserror::Error;

use crate::lineage::LineageAction;

/// Errors returned by a lineage service call.
#[derive(Debug, Error)]
pub enum LineageError {
    #[error("Lineage request failed: {0}")]
    Request(String),

    #[error("Lineage service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid lineage service response: {0}")]
    InvalidResponse(String),
}

/// Errors returned by the bulk transform job or while reading its manifest.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Transform job failed: {0}")]
    JobFailed(String),

    #[error("Invalid batch manifest: {0}")]
    InvalidManifest(String),

    #[error("Transform declared {declared} batches but manifest lists {actual}")]
    BatchCountMismatch { declared: usize, actual: usize },
}

/// Errors returned by a single emissions calculation task.
#[derive(Debug, Error)]
pub enum CalculationError {
    #[error("Calculation failed for '{location}': {message}")]
    TaskFailed { location: String, message: String },

    #[error("Calculation task was cancelled")]
    Cancelled,
}

/// Errors returned while notifying approvers of an escalation.
#[derive(Debug, Error)]
pub enum EscalationError {
    #[error("Escalation notification failed: {0}")]
    Delivery(String),
}

/// Reason a workflow run terminated in `Failure`.
///
/// Every variant is unrecoverable at the run level; local retries have
/// already been spent by the time one of these is produced.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Transform failed: {0}")]
    TransformFailed(#[source] TransformError),

    #[error("Calculation failed for batch {batch_index} ('{location}') after {attempts} attempt(s): {source}")]
    CalculationFailed {
        batch_index: usize,
        location: String,
        attempts: u32,
        #[source]
        source: CalculationError,
    },

    #[error("Lineage recording failed for {action} after {attempts} attempt(s): {source}")]
    LineageRecordingFailed {
        action: LineageAction,
        attempts: u32,
        #[source]
        source: LineageError,
    },

    #[error("Workflow deadline of {deadline:?} exceeded")]
    Timeout { deadline: Duration },

    #[error("Data quality check failed; escalated for human approval")]
    ApprovalEscalation,
}

impl WorkflowError {
    /// Stable label for this failure kind, used in metrics and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::TransformFailed(_) => "transform_failed",
            WorkflowError::CalculationFailed { .. } => "calculation_failed",
            WorkflowError::LineageRecordingFailed { .. } => "lineage_recording_failed",
            WorkflowError::Timeout { .. } => "timeout",
            WorkflowError::ApprovalEscalation => "approval_escalation",
        }
    }
}

impl From<TransformError> for WorkflowError {
    fn from(err: TransformError) -> Self {
        WorkflowError::TransformFailed(err)
    }
}
