//! Step frames and the callback values stored on them.
//!
//! A step is one execution frame of an operation. Everything a step needs
//! after its handler returns (the rollback callback, the compensating
//! operation, the deferred completion channel) is an explicit value owned by
//! the frame rather than a closure improvised at the call site.

use std::sync::Arc;

use tokio::sync::oneshot;
use warden_core::{ModelNode, Operation, PathAddress};

use super::context::OperationContext;
use super::failure::OperationFailure;
use super::handler::OperationStepHandler;
use crate::runtime::RuntimeServices;

/// Index of a step within its context's step arena. The root step is `0`.
pub type StepId = usize;

// ---------------------------------------------------------------------------
// RollbackHandler
// ---------------------------------------------------------------------------

/// Invoked when the root operation fails after this step completed.
///
/// Rollback handlers run in reverse completion order, so a step's children
/// roll back before the step itself. Inside the callback the context's
/// "current step" is the step that registered it.
pub trait RollbackHandler: Send + Sync {
    fn handle_rollback(&self, ctx: &mut OperationContext, operation: &Operation);
}

/// Rollback that replays a handler-supplied compensating operation.
///
/// Registered by the engine when a handler returns a compensating operation
/// without registering a rollback handler of its own.
#[derive(Debug, Clone)]
pub struct CompensatingRollback {
    compensating: Operation,
}

impl CompensatingRollback {
    #[must_use]
    pub fn new(compensating: Operation) -> Self {
        Self { compensating }
    }
}

impl RollbackHandler for CompensatingRollback {
    fn handle_rollback(&self, ctx: &mut OperationContext, _operation: &Operation) {
        ctx.execute_compensation(&self.compensating);
    }
}

// ---------------------------------------------------------------------------
// Deferred completion
// ---------------------------------------------------------------------------

/// One-shot completion signal for a step whose runtime effect finishes out of
/// band.
///
/// Consuming `self` on `complete`/`fail` makes a second signal impossible to
/// express; holders that may observe several events keep it in an `Option`
/// and `take()` it.
#[derive(Debug)]
pub struct StepCompletion {
    tx: oneshot::Sender<Result<(), OperationFailure>>,
}

/// Receiving side of a [`StepCompletion`].
pub type CompletionReceiver = oneshot::Receiver<Result<(), OperationFailure>>;

impl StepCompletion {
    /// Creates a linked completion/receiver pair.
    #[must_use]
    pub fn channel() -> (Self, CompletionReceiver) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn complete(self) {
        self.finish(Ok(()));
    }

    pub fn fail(self, failure: OperationFailure) {
        self.finish(Err(failure));
    }

    pub fn finish(self, result: Result<(), OperationFailure>) {
        if self.tx.send(result).is_err() {
            tracing::debug!("step completion signalled after the waiting step went away");
        }
    }
}

/// Work that must happen in the runtime after a step's model mutation.
///
/// `execute` runs synchronously inside the handler's step. It must arrange
/// for `completion` to be signalled exactly once, now or later from another
/// task. Returning `Err` fails the step immediately.
pub trait RuntimeEffect: Send {
    /// # Errors
    ///
    /// Returns an `OperationFailure` if the effect cannot be started at all,
    /// e.g. the target service is not installed.
    fn execute(
        self: Box<Self>,
        runtime: &RuntimeServices,
        completion: StepCompletion,
    ) -> Result<(), OperationFailure>;
}

/// A runtime effect the engine still has to wait for.
pub(crate) enum PendingEffect {
    Waiting(CompletionReceiver),
    Failed(OperationFailure),
}

// ---------------------------------------------------------------------------
// Step records
// ---------------------------------------------------------------------------

/// Execution status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StepStatus {
    /// Registered but not yet run.
    Pending,
    /// Handler returned successfully and any runtime effect completed.
    Executed,
    /// Handler or runtime effect failed.
    Failed,
    /// Never ran because an earlier step failed.
    Cancelled,
}

/// Audit entry for one step of a root operation.
#[derive(Debug, Clone)]
pub struct StepRecord {
    /// Slot name in the parent's result (`step-N`), `None` for the root.
    pub slot: Option<String>,
    pub operation: String,
    pub address: PathAddress,
    pub status: StepStatus,
    /// Whether a rollback action ran for this step.
    pub rolled_back: bool,
    /// Failure raised by the rollback action itself, if any.
    pub rollback_failure: Option<OperationFailure>,
}

/// One frame in the context's step arena.
pub(crate) struct StepFrame {
    pub(crate) operation: Operation,
    pub(crate) handler: Arc<dyn OperationStepHandler>,
    pub(crate) parent: Option<(StepId, String)>,
    pub(crate) children: Vec<StepId>,
    pub(crate) result: ModelNode,
    pub(crate) failure: Option<OperationFailure>,
    pub(crate) rollback: Option<Box<dyn RollbackHandler>>,
    pub(crate) compensating: Option<Operation>,
    pub(crate) status: StepStatus,
    pub(crate) rolled_back: bool,
    pub(crate) rollback_failure: Option<OperationFailure>,
    /// Frames created to run a compensating operation during rollback. They
    /// never appear in the response tree.
    pub(crate) transient: bool,
}

impl StepFrame {
    pub(crate) fn new(
        operation: Operation,
        handler: Arc<dyn OperationStepHandler>,
        parent: Option<(StepId, String)>,
    ) -> Self {
        Self {
            operation,
            handler,
            parent,
            children: Vec::new(),
            result: ModelNode::Undefined,
            failure: None,
            rollback: None,
            compensating: None,
            status: StepStatus::Pending,
            rolled_back: false,
            rollback_failure: None,
            transient: false,
        }
    }

    pub(crate) fn record(&self) -> StepRecord {
        StepRecord {
            slot: self.parent.as_ref().map(|(_, slot)| slot.clone()),
            operation: self.operation.name().to_string(),
            address: self.operation.address().clone(),
            status: match self.status {
                StepStatus::Pending => StepStatus::Cancelled,
                other => other,
            },
            rolled_back: self.rolled_back,
            rollback_failure: self.rollback_failure.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completion_delivers_exactly_one_result() {
        let (completion, rx) = StepCompletion::channel();
        completion.fail(OperationFailure::runtime_bridge("stop failed"));
        let result = rx.await.unwrap();
        assert_eq!(result.unwrap_err().to_string(), "stop failed");
    }

    #[tokio::test]
    async fn completion_after_receiver_dropped_is_harmless() {
        let (completion, rx) = StepCompletion::channel();
        drop(rx);
        completion.complete();
    }

    #[test]
    fn pending_frames_are_reported_as_cancelled() {
        let op = Operation::new("deploy", PathAddress::root());
        let handler: Arc<dyn OperationStepHandler> =
            Arc::new(crate::handlers::ReadResourceHandler);
        let frame = StepFrame::new(op, handler, Some((0, "step-2".to_string())));
        let record = frame.record();
        assert_eq!(record.status, StepStatus::Cancelled);
        assert_eq!(record.slot.as_deref(), Some("step-2"));
    }
}
