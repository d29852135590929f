//! Workflow state machine.
//!
//! `WorkflowEngine::execute` drives one run from `RecordRawInput` to a
//! terminal state:
//!
//! ```text
//! RecordRawInput -> QualityCheck
//! QualityCheck --passed--> RecordQualityPass -> Transform -> EnumerateBatches
//!                          -> RecordBatchSplit -> ParallelCalculation -> Succeeded
//! QualityCheck --failed--> Approval -> RecordQualityFail -> Escalated
//! ```
//!
//! Each step works on a copy of the context. The copy is committed only when
//! the step completes, so a run that fails or times out mid-step hands back
//! the context as of its last completed step. The whole loop runs against a
//! single deadline fixed when the run starts.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::calculator::{CalculationBackend, ParallelCalculator};
use super::config::{ConfigError, WorkflowConfig};
use super::context::{ExecutionContext, QualityResult};
use super::gates::{ApprovalGate, EscalationNotifier, QualityGate};
use super::transform::{BatchEnumerator, BulkTransform, BulkTransformInvoker};
use crate::error::{TransformError, WorkflowError};
use crate::lineage::{LineageAction, LineageClient, LineageRecorder};
use crate::metrics::MetricsCollector;

/// A step of the workflow state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    RecordRawInput,
    QualityCheck,
    RecordQualityPass,
    Transform,
    EnumerateBatches,
    RecordBatchSplit,
    ParallelCalculation,
    Approval,
    RecordQualityFail,
    /// Terminal: all batches calculated.
    Succeeded,
    /// Terminal: quality check failed and the file was escalated.
    Escalated,
}

impl WorkflowState {
    /// Returns true for states no transition leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Succeeded | WorkflowState::Escalated)
    }

    /// The state that follows a completed step.
    ///
    /// `quality` is only consulted when leaving `QualityCheck`; a missing
    /// result takes the failure branch. Terminal states map to themselves.
    pub fn next(self, quality: Option<QualityResult>) -> WorkflowState {
        match self {
            WorkflowState::RecordRawInput => WorkflowState::QualityCheck,
            WorkflowState::QualityCheck => match quality {
                Some(QualityResult::Passed) => WorkflowState::RecordQualityPass,
                _ => WorkflowState::Approval,
            },
            WorkflowState::RecordQualityPass => WorkflowState::Transform,
            WorkflowState::Transform => WorkflowState::EnumerateBatches,
            WorkflowState::EnumerateBatches => WorkflowState::RecordBatchSplit,
            WorkflowState::RecordBatchSplit => WorkflowState::ParallelCalculation,
            WorkflowState::ParallelCalculation => WorkflowState::Succeeded,
            WorkflowState::Approval => WorkflowState::RecordQualityFail,
            WorkflowState::RecordQualityFail => WorkflowState::Escalated,
            WorkflowState::Succeeded => WorkflowState::Succeeded,
            WorkflowState::Escalated => WorkflowState::Escalated,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::RecordRawInput => "record_raw_input",
            WorkflowState::QualityCheck => "quality_check",
            WorkflowState::RecordQualityPass => "record_quality_pass",
            WorkflowState::Transform => "transform",
            WorkflowState::EnumerateBatches => "enumerate_batches",
            WorkflowState::RecordBatchSplit => "record_batch_split",
            WorkflowState::ParallelCalculation => "parallel_calculation",
            WorkflowState::Approval => "approval",
            WorkflowState::RecordQualityFail => "record_quality_fail",
            WorkflowState::Succeeded => "succeeded",
            WorkflowState::Escalated => "escalated",
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum TerminalState {
    /// Every step completed.
    Success(ExecutionContext),
    /// The run stopped early. `context` is the last committed context and
    /// never carries partial batch results.
    Failure {
        context: ExecutionContext,
        reason: WorkflowError,
    },
}

impl TerminalState {
    pub fn is_success(&self) -> bool {
        matches!(self, TerminalState::Success(_))
    }

    /// The final context of the run.
    pub fn context(&self) -> &ExecutionContext {
        match self {
            TerminalState::Success(context) => context,
            TerminalState::Failure { context, .. } => context,
        }
    }

    /// The failure reason, if the run failed.
    pub fn reason(&self) -> Option<&WorkflowError> {
        match self {
            TerminalState::Success(_) => None,
            TerminalState::Failure { reason, .. } => Some(reason),
        }
    }

    pub fn into_context(self) -> ExecutionContext {
        match self {
            TerminalState::Success(context) => context,
            TerminalState::Failure { context, .. } => context,
        }
    }
}

/// Statistics over all runs an engine has executed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowStats {
    /// Total number of runs that reached a terminal state.
    pub total_runs: u64,
    /// Runs that ended in `Success`.
    pub succeeded: u64,
    /// Runs that ended in `Failure`, timeouts included.
    pub failed: u64,
    /// Failed runs whose reason was `Timeout`.
    pub timed_out: u64,
    /// Average run duration.
    pub average_duration: Duration,
}

impl WorkflowStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, terminal: &TerminalState, duration: Duration) {
        self.total_runs += 1;
        match terminal.reason() {
            None => self.succeeded += 1,
            Some(reason) => {
                self.failed += 1;
                if matches!(reason, WorkflowError::Timeout { .. }) {
                    self.timed_out += 1;
                }
            }
        }

        if self.total_runs == 1 {
            self.average_duration = duration;
        } else {
            // Incremental average: avg = avg + (new - avg) / n
            let n = self.total_runs as f64;
            let old_avg = self.average_duration.as_secs_f64();
            let new_avg = old_avg + (duration.as_secs_f64() - old_avg) / n;
            self.average_duration = Duration::from_secs_f64(new_avg.max(0.0));
        }
    }
}

/// Runs the GHG pipeline workflow.
///
/// One engine can execute any number of runs, sequentially or at once. Runs
/// share the engine's collaborators but never a context.
pub struct WorkflowEngine {
    config: WorkflowConfig,
    lineage: LineageClient,
    quality_gate: QualityGate,
    approval_gate: ApprovalGate,
    invoker: BulkTransformInvoker,
    enumerator: BatchEnumerator,
    calculator: ParallelCalculator,
    stats: Arc<tokio::sync::RwLock<WorkflowStats>>,
    metrics: MetricsCollector,
}

impl WorkflowEngine {
    /// Creates an engine from its configuration and external collaborators.
    ///
    /// Escalations go to the log until a notifier is set with
    /// [`WorkflowEngine::with_notifier`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `config` fails validation.
    pub fn new(
        config: WorkflowConfig,
        recorder: Arc<dyn LineageRecorder>,
        transform: Arc<dyn BulkTransform>,
        backend: Arc<dyn CalculationBackend>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let lineage = LineageClient::new(recorder, config.lineage_retry.clone());
        let calculator =
            ParallelCalculator::new(backend, lineage.clone(), config.calculation_retry.clone());

        Ok(Self {
            lineage,
            quality_gate: QualityGate::new(),
            approval_gate: ApprovalGate::default(),
            invoker: BulkTransformInvoker::new(transform),
            enumerator: BatchEnumerator::new(),
            calculator,
            stats: Arc::new(tokio::sync::RwLock::new(WorkflowStats::new())),
            metrics: MetricsCollector::new(),
            config,
        })
    }

    /// Builder method to set where approval escalations are sent.
    pub fn with_notifier(mut self, notifier: Arc<dyn EscalationNotifier>) -> Self {
        self.approval_gate = ApprovalGate::new(notifier);
        self
    }

    /// Gets the engine configuration.
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Starts a new run context for the raw file at `storage_location`,
    /// using the configured storage type.
    pub fn context_for(&self, storage_location: impl Into<String>) -> ExecutionContext {
        ExecutionContext::new(self.config.storage_type.clone(), storage_location)
    }

    /// Executes one run to a terminal state.
    pub async fn execute(&self, context: ExecutionContext) -> TerminalState {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let deadline = started + self.config.deadline;

        info!(
            run_id = %run_id,
            root_id = %context.root_id,
            input = %context.storage_location,
            deadline_secs = self.config.deadline.as_secs(),
            "Workflow run started"
        );

        let mut state = WorkflowState::RecordRawInput;
        let mut committed = context;

        let terminal = loop {
            if state.is_terminal() {
                break match state {
                    WorkflowState::Succeeded => TerminalState::Success(committed),
                    _ => TerminalState::Failure {
                        context: committed,
                        reason: WorkflowError::ApprovalEscalation,
                    },
                };
            }

            if Instant::now() >= deadline {
                break self.timed_out(committed);
            }

            let step = self.run_step(state, committed.clone());
            match tokio::time::timeout_at(deadline, step).await {
                Ok(Ok(context)) => {
                    let next = state.next(context.quality_result);
                    debug!(
                        run_id = %run_id,
                        root_id = %context.root_id,
                        from = %state,
                        to = %next,
                        "Workflow transition"
                    );
                    committed = context;
                    state = next;
                }
                Ok(Err(reason)) => {
                    break TerminalState::Failure {
                        context: committed,
                        reason,
                    }
                }
                Err(_) => break self.timed_out(committed),
            }
        };

        let duration = started.elapsed();
        self.finish(run_id, state, &terminal, duration).await;
        terminal
    }

    /// Executes independent runs concurrently.
    ///
    /// Terminal states are returned in the order of `contexts`.
    pub async fn run_batch(&self, contexts: Vec<ExecutionContext>) -> Vec<TerminalState> {
        if contexts.is_empty() {
            return Vec::new();
        }

        let runs: Vec<_> = contexts
            .into_iter()
            .map(|context| self.execute(context))
            .collect();

        futures::future::join_all(runs).await
    }

    /// Gets the current run statistics.
    pub async fn stats(&self) -> WorkflowStats {
        self.stats.read().await.clone()
    }

    /// Performs the work of `state` on `context`.
    async fn run_step(
        &self,
        state: WorkflowState,
        mut context: ExecutionContext,
    ) -> Result<ExecutionContext, WorkflowError> {
        match state {
            WorkflowState::RecordRawInput => {
                self.record(&mut context, LineageAction::RawDataInput).await?;
            }
            WorkflowState::QualityCheck => {
                let result = self.quality_gate.evaluate(&context);
                info!(root_id = %context.root_id, result = %result, "Quality check evaluated");
                context.quality_result = Some(result);
            }
            WorkflowState::RecordQualityPass => {
                self.record(&mut context, LineageAction::DqCheckPass).await?;
            }
            WorkflowState::Transform => {
                context = self.invoker.transform(context).await?;
            }
            WorkflowState::EnumerateBatches => {
                let pending = context.pending_manifest.take().ok_or_else(|| {
                    TransformError::InvalidManifest("transform reported no manifest".to_string())
                })?;
                context.batches = self
                    .enumerator
                    .enumerate(&pending.manifest, pending.declared_batches)?;
                self.metrics.record_batches(context.batches.len());
                info!(
                    root_id = %context.root_id,
                    batches = context.batches.len(),
                    "Batches enumerated"
                );
            }
            WorkflowState::RecordBatchSplit => {
                self.record(&mut context, LineageAction::GlueBatchSplit).await?;
            }
            WorkflowState::ParallelCalculation => {
                let scope = context.lineage_scope();
                context.batch_results = self
                    .calculator
                    .calculate_all(
                        &context.batches,
                        &scope,
                        self.config.max_concurrent_calculations,
                    )
                    .await?;
            }
            WorkflowState::Approval => {
                context = self.approval_gate.escalate(context).await;
            }
            WorkflowState::RecordQualityFail => {
                self.record(&mut context, LineageAction::DqCheckFail).await?;
            }
            WorkflowState::Succeeded | WorkflowState::Escalated => {}
        }

        Ok(context)
    }

    /// Records `action` for the current artifact and advances the chain.
    async fn record(
        &self,
        context: &mut ExecutionContext,
        action: LineageAction,
    ) -> Result<(), WorkflowError> {
        let ack = self
            .lineage
            .record(&context.lineage_scope(), action, &context.storage_location)
            .await?;
        context.advance_lineage(ack.node_id);
        Ok(())
    }

    fn timed_out(&self, context: ExecutionContext) -> TerminalState {
        TerminalState::Failure {
            context,
            reason: WorkflowError::Timeout {
                deadline: self.config.deadline,
            },
        }
    }

    async fn finish(
        &self,
        run_id: Uuid,
        last_state: WorkflowState,
        terminal: &TerminalState,
        duration: Duration,
    ) {
        let context = terminal.context();
        match terminal.reason() {
            None => {
                self.metrics
                    .record_run("success", "none", duration.as_secs_f64());
                info!(
                    run_id = %run_id,
                    root_id = %context.root_id,
                    batches = context.batch_results.len(),
                    duration_ms = duration.as_millis() as u64,
                    "Workflow run succeeded"
                );
            }
            Some(reason) => {
                self.metrics
                    .record_run("failure", reason.kind(), duration.as_secs_f64());
                error!(
                    run_id = %run_id,
                    root_id = %context.root_id,
                    state = %last_state,
                    reason = reason.kind(),
                    error = %reason,
                    duration_ms = duration.as_millis() as u64,
                    "Workflow run failed"
                );
            }
        }

        let mut stats = self.stats.write().await;
        stats.record(terminal, duration);
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lineage::InMemoryLineageLedger;
    use crate::pipeline::calculator::StaticCalculationBackend;
    use crate::pipeline::transform::StaticBulkTransform;

    #[tokio::test]
    async fn test_context_for_uses_configured_storage_type() {
        let ledger = Arc::new(InMemoryLineageLedger::new());
        let engine = WorkflowEngine::new(
            WorkflowConfig::new().with_storage_type("gcs"),
            ledger.clone(),
            Arc::new(StaticBulkTransform::new("gs", "transformed", 2)),
            Arc::new(StaticCalculationBackend::new("enriched")),
        )
        .unwrap();

        let context = engine
            .context_for("gs://raw/activity.csv")
            .with_validation_result("PASSED");
        assert_eq!(context.storage_type, "gcs");

        let terminal = engine.execute(context).await;
        assert!(terminal.is_success());
        assert_eq!(ledger.len(), 5);
        assert!(ledger.events().iter().all(|e| e.storage_type == "gcs"));
    }

    #[test]
    fn test_pass_branch_transitions() {
        let mut state = WorkflowState::RecordRawInput;
        let mut seen = vec![state];
        while !state.is_terminal() {
            state = state.next(Some(QualityResult::Passed));
            seen.push(state);
        }

        assert_eq!(
            seen,
            vec![
                WorkflowState::RecordRawInput,
                WorkflowState::QualityCheck,
                WorkflowState::RecordQualityPass,
                WorkflowState::Transform,
                WorkflowState::EnumerateBatches,
                WorkflowState::RecordBatchSplit,
                WorkflowState::ParallelCalculation,
                WorkflowState::Succeeded,
            ]
        );
    }

    #[test]
    fn test_fail_branch_transitions() {
        assert_eq!(
            WorkflowState::QualityCheck.next(Some(QualityResult::Failed)),
            WorkflowState::Approval
        );
        assert_eq!(WorkflowState::QualityCheck.next(None), WorkflowState::Approval);
        assert_eq!(
            WorkflowState::Approval.next(None),
            WorkflowState::RecordQualityFail
        );
        assert_eq!(
            WorkflowState::RecordQualityFail.next(None),
            WorkflowState::Escalated
        );
    }

    #[test]
    fn test_terminal_states_do_not_move() {
        for state in [WorkflowState::Succeeded, WorkflowState::Escalated] {
            assert!(state.is_terminal());
            assert_eq!(state.next(Some(QualityResult::Passed)), state);
        }
        assert!(!WorkflowState::ParallelCalculation.is_terminal());
    }

    #[test]
    fn test_stats_average() {
        let mut stats = WorkflowStats::new();
        let ctx = ExecutionContext::with_root("r", "s3", "s3://raw/a");

        stats.record(&TerminalState::Success(ctx.clone()), Duration::from_secs(60));
        stats.record(
            &TerminalState::Failure {
                context: ctx,
                reason: WorkflowError::Timeout {
                    deadline: Duration::from_secs(1),
                },
            },
            Duration::from_secs(30),
        );

        assert_eq!(stats.total_runs, 2);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.average_duration.as_secs(), 45);
    }

    #[test]
    fn test_engine_rejects_invalid_config() {
        let result = WorkflowEngine::new(
            WorkflowConfig::default().with_max_concurrent_calculations(0),
            Arc::new(InMemoryLineageLedger::new()),
            Arc::new(StaticBulkTransform::new("s3", "transformed", 1)),
            Arc::new(StaticCalculationBackend::new("enriched")),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_execute_happy_path_updates_context() {
        let ledger = Arc::new(InMemoryLineageLedger::new());
        let engine = WorkflowEngine::new(
            WorkflowConfig::default(),
            ledger.clone(),
            Arc::new(StaticBulkTransform::new("s3", "transformed", 3)),
            Arc::new(StaticCalculationBackend::new("enriched")),
        )
        .unwrap();
        let ctx = ExecutionContext::new("s3", "s3://raw/input.csv").with_validation_result("PASSED");
        let root_id = ctx.root_id.clone();

        let terminal = engine.execute(ctx).await;

        assert!(terminal.is_success());
        let ctx = terminal.into_context();
        assert_eq!(ctx.quality_result, Some(QualityResult::Passed));
        assert_eq!(ctx.storage_location, format!("s3://transformed/{}", root_id));
        assert_eq!(ctx.batches.len(), 3);
        assert_eq!(ctx.batch_results.len(), 3);
        assert!(ctx.pending_manifest.is_none());

        let split = ledger.get(&ctx.parent_id).unwrap();
        assert_eq!(split.event.action, LineageAction::GlueBatchSplit);

        let stats = engine.stats().await;
        assert_eq!(stats.total_runs, 1);
        assert_eq!(stats.succeeded, 1);
    }
}
