//! The handler trait every operation step implements.

use warden_core::Operation;

use super::context::OperationContext;
use super::failure::OperationFailure;

/// What a handler reports back on success.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerOutcome {
    /// Operation that undoes this step's model effect, if it has one.
    pub compensating_operation: Option<Operation>,
}

impl HandlerOutcome {
    /// Success with nothing to undo.
    #[must_use]
    pub fn done() -> Self {
        Self::default()
    }

    /// Success undone by `operation`.
    #[must_use]
    pub fn compensated_by(operation: Operation) -> Self {
        Self {
            compensating_operation: Some(operation),
        }
    }
}

pub type HandlerResult = Result<HandlerOutcome, OperationFailure>;

/// A stateless handler for one operation name.
///
/// Handlers live in a read-only registry and are shared across operations;
/// all per-invocation state lives in the [`OperationContext`].
pub trait OperationStepHandler: Send + Sync {
    /// Checks parameters before any model mutation.
    ///
    /// # Errors
    ///
    /// Returns a validation failure describing the offending parameter.
    fn validate(&self, _operation: &Operation) -> Result<(), OperationFailure> {
        Ok(())
    }

    /// Applies the operation to the context's model.
    ///
    /// # Errors
    ///
    /// Returns the step's failure. The context marks the step failed and
    /// starts rollback of everything already completed.
    fn execute(&self, ctx: &mut OperationContext, operation: &Operation) -> HandlerResult;
}
