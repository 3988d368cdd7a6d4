//! Outcome reporting for root operations.
//!
//! Each operation gets an `operation_request` span. When it finishes, an
//! [`OperationSummary`] of the response (failure kind, rollback result,
//! number of steps) is recorded on the span and logged.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{info, info_span, warn, Instrument};
use warden_core::Operation;

use crate::controller::{ControllerError, FailureKind, OperationResponse};

// ---------------------------------------------------------------------------
// OperationSummary
// ---------------------------------------------------------------------------

/// What gets reported about one finished root operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSummary {
    /// `success`, `failed`, `shed` or `error`.
    pub outcome: &'static str,
    pub failure_kind: Option<FailureKind>,
    /// Only set for failed operations.
    pub rolled_back: Option<bool>,
    /// Steps registered, the root included.
    pub steps: usize,
    pub rollback_failures: usize,
}

impl OperationSummary {
    #[must_use]
    pub fn of(result: &Result<OperationResponse, ControllerError>) -> Self {
        match result {
            Ok(response) => Self {
                outcome: response.outcome.as_str(),
                failure_kind: response.failure.as_ref().map(|failure| failure.kind()),
                rolled_back: (!response.is_success()).then_some(response.rolled_back),
                steps: response.audit.len(),
                rollback_failures: response.rollback_failures().count(),
            },
            Err(err) => Self {
                outcome: match err {
                    ControllerError::Overloaded { .. } => "shed",
                    ControllerError::Internal(_) => "error",
                },
                failure_kind: None,
                rolled_back: None,
                steps: 0,
                rollback_failures: 0,
            },
        }
    }

    fn is_clean(&self) -> bool {
        self.outcome == "success" || (self.rolled_back == Some(true) && self.rollback_failures == 0)
    }
}

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<Operation> for MetricsService<S>
where
    S: Service<Operation, Response = OperationResponse, Error = ControllerError> + Send,
    S::Future: Send + 'static,
{
    type Response = OperationResponse;
    type Error = ControllerError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationResponse, ControllerError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let span = info_span!(
            "operation_request",
            operation = %op.name(),
            address = %op.address(),
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
            rolled_back = tracing::field::Empty,
        );
        let fut = self.inner.call(op);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

                let summary = OperationSummary::of(&result);
                let span = tracing::Span::current();
                span.record("duration_ms", duration_ms);
                span.record("outcome", summary.outcome);
                if let Some(rolled_back) = summary.rolled_back {
                    span.record("rolled_back", rolled_back);
                }

                if summary.is_clean() {
                    info!(
                        duration_ms,
                        outcome = summary.outcome,
                        failure_kind = ?summary.failure_kind,
                        steps = summary.steps,
                        "operation complete"
                    );
                } else {
                    warn!(
                        duration_ms,
                        outcome = summary.outcome,
                        failure_kind = ?summary.failure_kind,
                        steps = summary.steps,
                        rollback_failures = summary.rollback_failures,
                        "operation did not complete cleanly"
                    );
                }
                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tower::ServiceExt;
    use warden_core::{names, ModelNode, PathAddress};

    use super::*;
    use crate::controller::{ExecutionMode, ModelController};
    use crate::handlers::standard_handlers;

    fn add_namespace(prefix: &str, uri: &str) -> Operation {
        Operation::new(names::ADD_NAMESPACE, PathAddress::root())
            .with_param(names::NAMESPACE, ModelNode::property(prefix, uri))
    }

    fn controller() -> ModelController {
        ModelController::new(
            ModelNode::from(serde_json::json!({ "namespaces": { "dup": "urn:dup" } })),
            Arc::new(standard_handlers()),
            ExecutionMode::ModelOnly,
        )
    }

    #[tokio::test]
    async fn summarizes_a_successful_operation() {
        let result = MetricsLayer
            .layer(controller())
            .oneshot(add_namespace("a", "urn:a"))
            .await;
        assert_eq!(
            OperationSummary::of(&result),
            OperationSummary {
                outcome: "success",
                failure_kind: None,
                rolled_back: None,
                steps: 1,
                rollback_failures: 0,
            }
        );
    }

    #[tokio::test]
    async fn summarizes_a_rolled_back_composite() {
        let steps = vec![
            add_namespace("a", "urn:a").to_node(),
            add_namespace("dup", "urn:other").to_node(),
        ];
        let op = Operation::new(names::COMPOSITE, PathAddress::root()).with_param(names::STEPS, steps);
        let result = MetricsLayer.layer(controller()).oneshot(op).await;

        let summary = OperationSummary::of(&result);
        assert_eq!(summary.outcome, "failed");
        assert_eq!(summary.failure_kind, Some(FailureKind::Composite));
        assert_eq!(summary.rolled_back, Some(true));
        assert_eq!(summary.steps, 3);
        assert!(summary.is_clean());
    }

    #[test]
    fn shed_operations_have_no_steps() {
        let result = Err(ControllerError::Overloaded {
            operation: names::DEPLOY.to_string(),
            admitted: 8,
        });
        let summary = OperationSummary::of(&result);
        assert_eq!(summary.outcome, "shed");
        assert_eq!(summary.steps, 0);
        assert!(!summary.is_clean());
    }
}
