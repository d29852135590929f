//! Bulk transform invocation and batch enumeration.
//!
//! The transform job splits a validated raw file into batches with a known
//! schema and reports where it wrote them. The invoker captures that report
//! on the context; the enumerator then turns the job's manifest into the
//! ordered batch list the calculator fans out over.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::context::{BatchDescriptor, ExecutionContext, PendingManifest};
use crate::error::TransformError;

/// What a bulk transform job reports when it completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformOutput {
    /// Location of the transformed dataset.
    pub output_location: String,
    /// Number of batches the job says it produced, if it reports one.
    #[serde(default)]
    pub declared_batch_count: Option<usize>,
    /// The job's batch manifest, unparsed.
    #[serde(default)]
    pub batch_manifest: Value,
}

/// An external bulk transform job.
///
/// Implementations run the job to completion. Failures are reported as-is;
/// retrying belongs to whatever runs the job.
#[async_trait]
pub trait BulkTransform: Send + Sync {
    async fn run(
        &self,
        root_id: &str,
        input_location: &str,
    ) -> Result<TransformOutput, TransformError>;
}

/// Triggers the bulk transform for a run and records its output.
#[derive(Clone)]
pub struct BulkTransformInvoker {
    transform: Arc<dyn BulkTransform>,
}

impl BulkTransformInvoker {
    pub fn new(transform: Arc<dyn BulkTransform>) -> Self {
        Self { transform }
    }

    /// Runs the transform on `context.storage_location`.
    ///
    /// On success the returned context points at the transformed dataset and
    /// holds the job's manifest for enumeration. No retry is attempted.
    pub async fn transform(
        &self,
        mut context: ExecutionContext,
    ) -> Result<ExecutionContext, TransformError> {
        debug!(
            root_id = %context.root_id,
            input = %context.storage_location,
            "Starting bulk transform"
        );

        let output = self
            .transform
            .run(&context.root_id, &context.storage_location)
            .await?;

        info!(
            root_id = %context.root_id,
            output = %output.output_location,
            declared_batches = ?output.declared_batch_count,
            "Bulk transform completed"
        );

        context.storage_location = output.output_location;
        context.pending_manifest = Some(PendingManifest {
            declared_batches: output.declared_batch_count,
            manifest: output.batch_manifest,
        });
        Ok(context)
    }
}

impl std::fmt::Debug for BulkTransformInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkTransformInvoker").finish_non_exhaustive()
    }
}

/// Turns a transform manifest into an ordered batch list.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchEnumerator;

impl BatchEnumerator {
    pub fn new() -> Self {
        Self
    }

    /// Parses `manifest` into batch descriptors.
    ///
    /// Accepts a JSON array whose entries are either `{"location": "..."}`
    /// objects or bare location strings; `null` is treated as an empty
    /// manifest. Order and duplicates are kept as listed.
    ///
    /// # Errors
    ///
    /// - `TransformError::InvalidManifest` for any other shape
    /// - `TransformError::BatchCountMismatch` if `declared` disagrees with
    ///   the number of entries
    pub fn enumerate(
        &self,
        manifest: &Value,
        declared: Option<usize>,
    ) -> Result<Vec<BatchDescriptor>, TransformError> {
        let entries: &[Value] = match manifest {
            Value::Null => &[],
            Value::Array(entries) => entries,
            other => {
                return Err(TransformError::InvalidManifest(format!(
                    "expected an array of batches, got {}",
                    json_kind(other)
                )))
            }
        };

        let batches = entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| parse_entry(idx, entry))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(declared) = declared {
            if declared != batches.len() {
                return Err(TransformError::BatchCountMismatch {
                    declared,
                    actual: batches.len(),
                });
            }
        }

        Ok(batches)
    }
}

fn parse_entry(idx: usize, entry: &Value) -> Result<BatchDescriptor, TransformError> {
    let location = match entry {
        Value::String(location) => location.as_str(),
        Value::Object(fields) => match fields.get("location") {
            Some(Value::String(location)) => location.as_str(),
            _ => {
                return Err(TransformError::InvalidManifest(format!(
                    "batch {} has no string 'location' field",
                    idx
                )))
            }
        },
        other => {
            return Err(TransformError::InvalidManifest(format!(
                "batch {} is {}, expected an object or string",
                idx,
                json_kind(other)
            )))
        }
    };

    if location.is_empty() {
        return Err(TransformError::InvalidManifest(format!(
            "batch {} has an empty location",
            idx
        )));
    }

    Ok(BatchDescriptor::new(location))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Placeholder transform that reports a fixed number of batches without
/// touching storage.
///
/// Batches are named `<scheme>://<container>/<root_id>/batch<k>.json` with
/// `k` starting at 1.
#[derive(Debug, Clone)]
pub struct StaticBulkTransform {
    scheme: String,
    container: String,
    batch_count: usize,
}

impl StaticBulkTransform {
    pub fn new(
        scheme: impl Into<String>,
        container: impl Into<String>,
        batch_count: usize,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            container: container.into(),
            batch_count,
        }
    }
}

#[async_trait]
impl BulkTransform for StaticBulkTransform {
    async fn run(
        &self,
        root_id: &str,
        _input_location: &str,
    ) -> Result<TransformOutput, TransformError> {
        let output_location = format!("{}://{}/{}", self.scheme, self.container, root_id);
        let manifest = (1..=self.batch_count)
            .map(|k| serde_json::json!({ "location": format!("{}/batch{}.json", output_location, k) }))
            .collect();

        Ok(TransformOutput {
            output_location,
            declared_batch_count: Some(self.batch_count),
            batch_manifest: Value::Array(manifest),
        })
    }
}
