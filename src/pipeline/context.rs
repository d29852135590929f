//! Execution context threaded through a workflow run.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lineage::LineageScope;

/// Marker the external validation step writes for a clean file.
pub const QUALITY_PASS_MARKER: &str = "PASSED";

/// Outcome of the data quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityResult {
    Passed,
    Failed,
}

impl std::fmt::Display for QualityResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityResult::Passed => write!(f, "passed"),
            QualityResult::Failed => write!(f, "failed"),
        }
    }
}

/// One independently processable partition of the transformed dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDescriptor {
    pub location: String,
}

impl BatchDescriptor {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }
}

/// Output of one batch calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationResult {
    /// Where the emissions-equivalent output was written.
    pub location: String,
    /// Lineage node of this batch's `CALCULATION_COMPLETE` event.
    pub lineage_id: String,
}

/// Raw batch manifest captured from the transform job, awaiting enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingManifest {
    /// Batch count the transform job declared, if it reported one.
    pub declared_batches: Option<usize>,
    /// The manifest exactly as the job returned it.
    pub manifest: serde_json::Value,
}

/// The record a workflow run accumulates as it moves through its steps.
///
/// Exclusively owned by one run. `quality_result`, `batches`, and
/// `batch_results` are each written once; when both sequences are populated
/// they have equal length and `batch_results[i]` belongs to `batches[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Stable lineage identifier for the whole run.
    pub root_id: String,
    /// Lineage node of the most recently recorded event.
    pub parent_id: String,
    /// Storage backend of the current artifact.
    pub storage_type: String,
    /// Location of the current artifact.
    pub storage_location: String,
    /// Result field written by the external validation step.
    #[serde(default)]
    pub validation_result: Option<String>,
    /// Set once by the quality gate.
    #[serde(default)]
    pub quality_result: Option<QualityResult>,
    /// Set by the transform step, consumed by batch enumeration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_manifest: Option<PendingManifest>,
    /// Set once by batch enumeration.
    #[serde(default)]
    pub batches: Vec<BatchDescriptor>,
    /// Set once by the parallel calculation, index-aligned with `batches`.
    #[serde(default)]
    pub batch_results: Vec<CalculationResult>,
}

impl ExecutionContext {
    /// Creates the context for a newly arrived raw file.
    ///
    /// The run gets a fresh root id, and the lineage chain starts at it.
    pub fn new(storage_type: impl Into<String>, storage_location: impl Into<String>) -> Self {
        let root_id = Uuid::new_v4().to_string();
        Self::with_root(root_id, storage_type, storage_location)
    }

    /// Creates a context with a caller-chosen root id.
    pub fn with_root(
        root_id: impl Into<String>,
        storage_type: impl Into<String>,
        storage_location: impl Into<String>,
    ) -> Self {
        let root_id = root_id.into();
        Self {
            parent_id: root_id.clone(),
            root_id,
            storage_type: storage_type.into(),
            storage_location: storage_location.into(),
            validation_result: None,
            quality_result: None,
            pending_manifest: None,
            batches: Vec::new(),
            batch_results: Vec::new(),
        }
    }

    /// Builder method to set the validation result field.
    pub fn with_validation_result(mut self, result: impl Into<String>) -> Self {
        self.validation_result = Some(result.into());
        self
    }

    /// The lineage position of this context.
    pub fn lineage_scope(&self) -> LineageScope {
        LineageScope::new(&self.root_id, &self.parent_id, &self.storage_type)
    }

    /// Advances the lineage chain to `node_id`.
    pub fn advance_lineage(&mut self, node_id: impl Into<String>) {
        self.parent_id = node_id.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_starts_chain_at_root() {
        let ctx = ExecutionContext::new("s3", "s3://raw/input.csv");
        assert!(!ctx.root_id.is_empty());
        assert_eq!(ctx.parent_id, ctx.root_id);
        assert!(ctx.quality_result.is_none());
        assert!(ctx.batches.is_empty());
        assert!(ctx.batch_results.is_empty());
    }

    #[test]
    fn test_new_contexts_get_distinct_roots() {
        let a = ExecutionContext::new("s3", "s3://raw/a.csv");
        let b = ExecutionContext::new("s3", "s3://raw/a.csv");
        assert_ne!(a.root_id, b.root_id);
    }

    #[test]
    fn test_advance_lineage_keeps_root() {
        let mut ctx = ExecutionContext::with_root("root-1", "s3", "s3://raw/input.csv");
        ctx.advance_lineage("node-9");

        let scope = ctx.lineage_scope();
        assert_eq!(scope.root_id, "root-1");
        assert_eq!(scope.parent_id, "node-9");
        assert_eq!(scope.storage_type, "s3");
    }

    #[test]
    fn test_context_deserializes_with_defaults() {
        let ctx: ExecutionContext = serde_json::from_str(
            r#"{
                "root_id": "r",
                "parent_id": "r",
                "storage_type": "s3",
                "storage_location": "s3://raw/input.csv",
                "validation_result": "PASSED"
            }"#,
        )
        .unwrap();

        assert_eq!(ctx.validation_result.as_deref(), Some(QUALITY_PASS_MARKER));
        assert!(ctx.batches.is_empty());
        assert!(ctx.pending_manifest.is_none());
    }

    #[test]
    fn test_quality_result_display() {
        assert_eq!(QualityResult::Passed.to_string(), "passed");
        assert_eq!(QualityResult::Failed.to_string(), "failed");
    }
}
