//! Bounded-concurrency batch calculation.
//!
//! `ParallelCalculator` fans out one task per batch, never running more
//! than the concurrency limit at once. Each task calls the calculation
//! backend with its own retry budget and then records a
//! `CALCULATION_COMPLETE` lineage event branching off the batch-split node.
//!
//! The fan-out is all-or-nothing. The first task to fail for good cancels
//! its siblings and the whole call fails. Results come back in batch order,
//! whatever order the tasks finished in.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::config::RetryPolicy;
use super::context::{BatchDescriptor, CalculationResult};
use super::retry::with_backoff;
use crate::error::{CalculationError, WorkflowError};
use crate::lineage::{LineageAction, LineageClient, LineageScope};
use crate::metrics::MetricsCollector;

/// An external emissions calculation service.
///
/// Called concurrently from many tasks; implementations must be safe for
/// concurrent use.
#[async_trait]
pub trait CalculationBackend: Send + Sync {
    /// Calculates emissions for the batch at `batch_location` and returns
    /// where the result was written.
    async fn calculate(&self, batch_location: &str) -> Result<String, CalculationError>;
}

/// Runs batch calculations with a concurrency ceiling.
#[derive(Clone)]
pub struct ParallelCalculator {
    backend: Arc<dyn CalculationBackend>,
    lineage: LineageClient,
    retry: RetryPolicy,
    metrics: MetricsCollector,
}

impl ParallelCalculator {
    /// Creates a calculator over `backend`, recording lineage through
    /// `lineage` and retrying each batch according to `retry`.
    pub fn new(
        backend: Arc<dyn CalculationBackend>,
        lineage: LineageClient,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            lineage,
            retry,
            metrics: MetricsCollector::new(),
        }
    }

    /// Calculates every batch, at most `concurrency_limit` at a time.
    ///
    /// `split_scope` is the lineage position of the batch-split event; every
    /// batch's `CALCULATION_COMPLETE` event uses it as parent. The returned
    /// vector is index-aligned with `batches`. An empty input returns
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns the first unrecoverable batch error, either
    /// `WorkflowError::CalculationFailed` or
    /// `WorkflowError::LineageRecordingFailed`. Remaining tasks are aborted
    /// and no partial results are returned.
    pub async fn calculate_all(
        &self,
        batches: &[BatchDescriptor],
        split_scope: &LineageScope,
        concurrency_limit: usize,
    ) -> Result<Vec<CalculationResult>, WorkflowError> {
        if batches.is_empty() {
            debug!(root_id = %split_scope.root_id, "No batches to calculate");
            return Ok(Vec::new());
        }

        let limit = concurrency_limit.max(1);
        let semaphore = Arc::new(Semaphore::new(limit));
        let mut tasks = JoinSet::new();
        let mut task_batches = HashMap::with_capacity(batches.len());

        info!(
            root_id = %split_scope.root_id,
            batches = batches.len(),
            concurrency_limit = limit,
            "Starting parallel calculation"
        );

        for (batch_index, batch) in batches.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let calculator = self.clone();
            let scope = split_scope.clone();

            let handle = tasks.spawn(async move {
                let location = batch.location.clone();
                let Ok(_permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    return Err(cancelled(batch_index, location));
                };
                let result = calculator
                    .run_batch(batch_index, batch, scope, &semaphore)
                    .await;
                // Closing before the permit drops keeps queued siblings from starting.
                if result.is_err() {
                    semaphore.close();
                }
                result
            });
            task_batches.insert(handle.id(), batch_index);
        }

        let mut slots: Vec<Option<CalculationResult>> = vec![None; batches.len()];

        while let Some(joined) = tasks.join_next_with_id().await {
            let failure = match joined {
                Ok((id, Ok(result))) => {
                    if let Some(&batch_index) = task_batches.get(&id) {
                        slots[batch_index] = Some(result);
                    }
                    continue;
                }
                // The failure that closed the semaphore is still to be joined.
                Ok((_, Err(err))) if is_cancellation(&err) => continue,
                Ok((_, Err(err))) => err,
                Err(join_err) => {
                    let batch_index = task_batches.get(&join_err.id()).copied();
                    if batch_index.is_none() {
                        warn!(
                            task_id = %join_err.id(),
                            error = %join_err,
                            "Calculation task failed with an unknown task id"
                        );
                    }
                    task_failure(batches, batch_index, join_err.to_string())
                }
            };

            let remaining = tasks.len();
            tasks.abort_all();
            for _ in 0..remaining {
                self.metrics.record_calculation("cancelled");
            }
            error!(
                root_id = %split_scope.root_id,
                cancelled = remaining,
                error = %failure,
                "Parallel calculation failed, cancelling remaining batches"
            );
            return Err(failure);
        }

        let results: Vec<CalculationResult> = slots.into_iter().flatten().collect();
        debug_assert_eq!(results.len(), batches.len());

        info!(
            root_id = %split_scope.root_id,
            batches = results.len(),
            "Parallel calculation completed"
        );
        Ok(results)
    }

    /// `fan_out` is closed once any sibling has failed for good.
    async fn run_batch(
        &self,
        batch_index: usize,
        batch: BatchDescriptor,
        split_scope: LineageScope,
        fan_out: &Semaphore,
    ) -> Result<CalculationResult, WorkflowError> {
        let _in_flight = InFlight::start(self.metrics);
        let operation = format!("calculation:batch{}", batch_index);
        let backend = &self.backend;
        let location = batch.location.as_str();

        debug!(batch_index = batch_index, location = %location, "Calculating batch");

        let result_location = match with_backoff(&self.retry, &operation, move |_| {
            backend.calculate(location)
        })
        .await
        {
            Ok(result_location) => result_location,
            Err(exhausted) => {
                self.metrics.record_calculation("failure");
                return Err(WorkflowError::CalculationFailed {
                    batch_index,
                    location: batch.location,
                    attempts: exhausted.attempts,
                    source: exhausted.last_error,
                });
            }
        };
        self.metrics.record_calculation("success");

        if fan_out.is_closed() {
            debug!(batch_index = batch_index, "Fan-out already failed, skipping lineage");
            return Err(cancelled(batch_index, batch.location));
        }

        let ack = self
            .lineage
            .record(
                &split_scope,
                LineageAction::CalculationComplete,
                &result_location,
            )
            .await?;

        debug!(
            batch_index = batch_index,
            result = %result_location,
            node_id = %ack.node_id,
            "Batch calculated"
        );

        Ok(CalculationResult {
            location: result_location,
            lineage_id: ack.node_id,
        })
    }
}

fn cancelled(batch_index: usize, location: String) -> WorkflowError {
    WorkflowError::CalculationFailed {
        batch_index,
        location,
        attempts: 0,
        source: CalculationError::Cancelled,
    }
}

/// Failure for a task that panicked or was aborted. An unknown task is
/// reported with `batch_index == batches.len()` and an empty location.
fn task_failure(
    batches: &[BatchDescriptor],
    batch_index: Option<usize>,
    message: String,
) -> WorkflowError {
    let (batch_index, location) = match batch_index.and_then(|i| batches.get(i).map(|b| (i, b))) {
        Some((i, batch)) => (i, batch.location.clone()),
        None => (batches.len(), String::new()),
    };
    WorkflowError::CalculationFailed {
        batch_index,
        location: location.clone(),
        attempts: 0,
        source: CalculationError::TaskFailed { location, message },
    }
}

fn is_cancellation(err: &WorkflowError) -> bool {
    matches!(
        err,
        WorkflowError::CalculationFailed {
            source: CalculationError::Cancelled,
            ..
        }
    )
}

impl std::fmt::Debug for ParallelCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelCalculator")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Keeps the in-flight gauge balanced, including for aborted tasks.
struct InFlight(MetricsCollector);

impl InFlight {
    fn start(metrics: MetricsCollector) -> Self {
        metrics.calculation_started();
        Self(metrics)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.calculation_finished();
    }
}

/// Placeholder backend that maps each batch onto a result location without
/// calculating anything.
///
/// `<scheme>://<any container>/<path>` becomes
/// `<scheme>://<enriched container>/<path>`.
#[derive(Debug, Clone)]
pub struct StaticCalculationBackend {
    container: String,
}

impl StaticCalculationBackend {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
        }
    }
}

#[async_trait]
impl CalculationBackend for StaticCalculationBackend {
    async fn calculate(&self, batch_location: &str) -> Result<String, CalculationError> {
        let (scheme, rest) =
            batch_location
                .split_once("://")
                .ok_or_else(|| CalculationError::TaskFailed {
                    location: batch_location.to_string(),
                    message: "location has no scheme".to_string(),
                })?;

        let path = rest
            .split_once('/')
            .map(|(_, path)| path)
            .filter(|path| !path.is_empty())
            .ok_or_else(|| CalculationError::TaskFailed {
                location: batch_location.to_string(),
                message: "location has no object path".to_string(),
            })?;

        Ok(format!("{}://{}/{}", scheme, self.container, path))
    }
}
