use warden_core::Operation;

use crate::controller::{HandlerOutcome, HandlerResult, OperationContext, OperationStepHandler};

/// `read-resource`: copies the addressed subtree into the result.
pub struct ReadResourceHandler;

impl OperationStepHandler for ReadResourceHandler {
    fn execute(&self, ctx: &mut OperationContext, operation: &Operation) -> HandlerResult {
        let address = operation.address();
        let resource = if address.is_root() {
            ctx.model().clone()
        } else {
            ctx.resource(address)?.clone()
        };
        ctx.result_mut().set(resource);
        Ok(HandlerOutcome::done())
    }
}
