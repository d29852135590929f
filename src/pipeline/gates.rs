//! Quality and approval gates.
//!
//! The quality gate is the workflow's only branch point. A file that passes
//! continues into the automated path; anything else is escalated through the
//! approval gate, which always ends the run.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::context::{ExecutionContext, QualityResult, QUALITY_PASS_MARKER};
use crate::error::EscalationError;
use crate::metrics::MetricsCollector;

/// Interprets the validation result written by the external validation step.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityGate {
    metrics: MetricsCollector,
}

impl QualityGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates `context.validation_result`.
    ///
    /// Only the exact pass marker passes. A missing field, a different
    /// casing, or surrounding whitespace all evaluate to `Failed`.
    pub fn evaluate(&self, context: &ExecutionContext) -> QualityResult {
        let result = match context.validation_result.as_deref() {
            Some(QUALITY_PASS_MARKER) => QualityResult::Passed,
            _ => QualityResult::Failed,
        };
        self.metrics.record_quality_check(&result.to_string());
        result
    }
}

/// Delivers a human-approval request for a file that failed its quality check.
#[async_trait]
pub trait EscalationNotifier: Send + Sync {
    async fn notify(&self, context: &ExecutionContext) -> Result<(), EscalationError>;
}

/// Notifier that writes the escalation to the log.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl EscalationNotifier for TracingNotifier {
    async fn notify(&self, context: &ExecutionContext) -> Result<(), EscalationError> {
        warn!(
            root_id = %context.root_id,
            storage_location = %context.storage_location,
            validation_result = ?context.validation_result,
            "Data quality check failed, human approval required"
        );
        Ok(())
    }
}

/// Human-in-the-loop escalation step.
///
/// Passes the context through unchanged after notifying approvers. There is
/// no resume path: the workflow always continues to the failure branch.
#[derive(Clone)]
pub struct ApprovalGate {
    notifier: Arc<dyn EscalationNotifier>,
}

impl ApprovalGate {
    pub fn new(notifier: Arc<dyn EscalationNotifier>) -> Self {
        Self { notifier }
    }

    /// Escalates `context` and returns it for failure-path lineage.
    ///
    /// A notifier failure is logged and does not change the outcome.
    pub async fn escalate(&self, context: ExecutionContext) -> ExecutionContext {
        match self.notifier.notify(&context).await {
            Ok(()) => info!(root_id = %context.root_id, "Escalated for approval"),
            Err(e) => warn!(
                root_id = %context.root_id,
                error = %e,
                "Escalation notice could not be delivered"
            ),
        }
        context
    }
}

impl Default for ApprovalGate {
    fn default() -> Self {
        Self::new(Arc::new(TracingNotifier))
    }
}

impl std::fmt::Debug for ApprovalGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalGate").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context_with(result: Option<&str>) -> ExecutionContext {
        let ctx = ExecutionContext::with_root("root", "s3", "s3://raw/input.csv");
        match result {
            Some(r) => ctx.with_validation_result(r),
            None => ctx,
        }
    }

    #[test]
    fn test_quality_gate_passes_exact_marker() {
        let gate = QualityGate::new();
        assert_eq!(
            gate.evaluate(&context_with(Some("PASSED"))),
            QualityResult::Passed
        );
    }

    #[test]
    fn test_quality_gate_fails_closed() {
        let gate = QualityGate::new();
        for value in [None, Some("FAILED"), Some("passed"), Some(" PASSED"), Some("")] {
            assert_eq!(
                gate.evaluate(&context_with(value)),
                QualityResult::Failed,
                "value {:?} must not pass",
                value
            );
        }
    }

    struct CountingNotifier {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EscalationNotifier for CountingNotifier {
        async fn notify(&self, _context: &ExecutionContext) -> Result<(), EscalationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(EscalationError::Delivery("topic unavailable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_approval_gate_passes_context_through() {
        let notifier = Arc::new(CountingNotifier {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let gate = ApprovalGate::new(notifier.clone());
        let ctx = context_with(Some("FAILED"));

        let out = gate.escalate(ctx.clone()).await;

        assert_eq!(out, ctx);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_approval_gate_ignores_notifier_failure() {
        let notifier = Arc::new(CountingNotifier {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let gate = ApprovalGate::new(notifier.clone());
        let ctx = context_with(None);

        let out = gate.escalate(ctx.clone()).await;

        assert_eq!(out, ctx);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }
}
