//! Lineage recording.
//!
//! `LineageRecorder` is the effect interface to the external lineage
//! service. The workflow never talks to a recorder directly; it goes through
//! `LineageClient`, which shapes and timestamps events and applies the
//! bounded retry policy.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use super::event::{LineageAck, LineageAction, LineageEvent, LineageScope};
use crate::error::{LineageError, WorkflowError};
use crate::metrics::MetricsCollector;
use crate::pipeline::config::RetryPolicy;
use crate::pipeline::retry::with_backoff;

/// A lineage service that accepts events.
///
/// Implementations must be safe for concurrent use; fan-out branches record
/// through the same recorder at the same time. Duplicate events caused by
/// retries are acceptable.
#[async_trait]
pub trait LineageRecorder: Send + Sync {
    /// Records one event and returns the id of the lineage node created.
    async fn record(&self, event: &LineageEvent) -> Result<LineageAck, LineageError>;
}

/// Recorder that only logs events.
///
/// Useful when no lineage service is deployed; every event gets a fresh
/// node id.
#[derive(Debug, Clone, Default)]
pub struct TracingLineageRecorder;

impl TracingLineageRecorder {
    /// Creates a new tracing recorder.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LineageRecorder for TracingLineageRecorder {
    async fn record(&self, event: &LineageEvent) -> Result<LineageAck, LineageError> {
        let node_id = Uuid::new_v4().to_string();
        info!(
            root_id = %event.root_id,
            parent_id = %event.parent_id,
            node_id = %node_id,
            action = %event.action,
            storage_location = %event.storage_location,
            "Lineage event"
        );
        Ok(LineageAck::new(node_id))
    }
}

/// Client the workflow uses to record lineage.
///
/// Cheap to clone; clones share the underlying recorder.
#[derive(Clone)]
pub struct LineageClient {
    recorder: Arc<dyn LineageRecorder>,
    retry: RetryPolicy,
    metrics: MetricsCollector,
}

impl LineageClient {
    /// Creates a client over `recorder` with the given retry policy.
    pub fn new(recorder: Arc<dyn LineageRecorder>, retry: RetryPolicy) -> Self {
        Self {
            recorder,
            retry,
            metrics: MetricsCollector::new(),
        }
    }

    /// Records `action` for the artifact at `storage_location` within `scope`.
    ///
    /// The event is built once, so every retry sends the same timestamp.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::LineageRecordingFailed` once the retry budget
    /// is spent.
    pub async fn record(
        &self,
        scope: &LineageScope,
        action: LineageAction,
        storage_location: &str,
    ) -> Result<LineageAck, WorkflowError> {
        let event = scope.event(action, storage_location);
        let operation = format!("lineage:{}", action);

        let event_ref = &event;
        let result = with_backoff(&self.retry, &operation, move |attempt| {
            if attempt > 1 {
                self.metrics.record_lineage_retry();
            }
            let recorder = Arc::clone(&self.recorder);
            async move { recorder.record(event_ref).await }
        })
        .await;

        match result {
            Ok(ack) => {
                self.metrics.record_lineage(action.as_str(), true);
                debug!(
                    root_id = %event.root_id,
                    parent_id = %event.parent_id,
                    node_id = %ack.node_id,
                    action = %action,
                    "Recorded lineage event"
                );
                Ok(ack)
            }
            Err(exhausted) => {
                self.metrics.record_lineage(action.as_str(), false);
                Err(WorkflowError::LineageRecordingFailed {
                    action,
                    attempts: exhausted.attempts,
                    source: exhausted.last_error,
                })
            }
        }
    }
}

impl std::fmt::Debug for LineageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineageClient")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
