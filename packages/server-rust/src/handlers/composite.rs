//! The `composite` operation: an ordered batch of operations run as named
//! child steps of one root operation.

use std::sync::Arc;

use indexmap::IndexMap;
use warden_core::{names, ModelNode, Operation};

use crate::controller::{
    record_steps, HandlerOutcome, HandlerResult, OperationContext, OperationFailure,
    OperationStepHandler, RollbackHandler, StepResolver, EXPLAINED_FAILURE,
};

const COMPOSITE_FAILED: &str = "Composite operation failed and was rolled back.";
const COMPOSITE_ROLLED_BACK: &str = "Composite operation was rolled back";

/// Runs each entry of `steps` as child `step-1..step-N`.
///
/// Result slots are reserved in submission order before any child runs, so
/// the response keys keep that order whatever the children do.
#[derive(Default)]
pub struct CompositeOperationHandler {
    resolver: Option<Arc<dyn StepResolver>>,
}

impl CompositeOperationHandler {
    /// Resolves children through the context's resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves children through `resolver` instead of the context's.
    #[must_use]
    pub fn with_resolver(resolver: Arc<dyn StepResolver>) -> Self {
        Self {
            resolver: Some(resolver),
        }
    }
}

fn step_name(index: usize) -> String {
    format!("step-{}", index + 1)
}

fn parse_steps(operation: &Operation) -> Result<Vec<Operation>, OperationFailure> {
    let steps = operation.require(names::STEPS)?.as_list().map_err(|err| {
        OperationFailure::validation(format!("Invalid value for parameter '{}': {err}", names::STEPS))
    })?;
    if steps.is_empty() {
        return Err(OperationFailure::validation(format!(
            "Parameter '{}' must contain at least one operation",
            names::STEPS
        )));
    }
    steps
        .iter()
        .enumerate()
        .map(|(index, step)| {
            Operation::from_node(step).map_err(|err| {
                OperationFailure::validation(format!("Invalid operation in {}: {err}", step_name(index)))
            })
        })
        .collect()
}

impl OperationStepHandler for CompositeOperationHandler {
    fn validate(&self, operation: &Operation) -> Result<(), OperationFailure> {
        parse_steps(operation).map(|_| ())
    }

    fn execute(&self, ctx: &mut OperationContext, operation: &Operation) -> HandlerResult {
        let steps = parse_steps(operation)?;
        let step_names: Vec<String> = (0..steps.len()).map(step_name).collect();

        let slots = ctx.result_mut().set_empty_object();
        for name in &step_names {
            slots.get_mut(name)?;
        }

        let resolver = self.resolver.clone().unwrap_or_else(|| ctx.resolver());
        let children: IndexMap<String, Operation> = step_names.iter().cloned().zip(steps).collect();
        if let Err(failure) = record_steps(ctx, children, resolver.as_ref()) {
            ctx.result_mut().set(ModelNode::Undefined);
            return Err(failure);
        }

        ctx.complete_step(CompositeRollback::new(step_names));
        Ok(HandlerOutcome::done())
    }
}

/// Explains a composite failure by listing every child that failed.
///
/// Leaves an existing failure description (or one explained by an owning
/// execution layer) untouched.
#[derive(Debug, Clone)]
pub struct CompositeRollback {
    step_names: Vec<String>,
}

impl CompositeRollback {
    #[must_use]
    pub fn new(step_names: Vec<String>) -> Self {
        Self { step_names }
    }

    /// Aggregate description from the children's failures, in step order.
    fn aggregate(&self, ctx: &OperationContext) -> String {
        let lines: Vec<String> = self
            .step_names
            .iter()
            .filter_map(|name| {
                ctx.child_failure_description(name)
                    .map(|description| format!("{COMPOSITE_FAILED} {name}: {description}"))
            })
            .collect();
        if lines.is_empty() {
            COMPOSITE_ROLLED_BACK.to_string()
        } else {
            lines.join("\n")
        }
    }
}

impl RollbackHandler for CompositeRollback {
    fn handle_rollback(&self, ctx: &mut OperationContext, _operation: &Operation) {
        let explained = ctx.attachment(&EXPLAINED_FAILURE).is_some_and(|explained| *explained);
        if explained || ctx.has_failure_description() {
            return;
        }
        let message = self.aggregate(ctx);
        ctx.set_failure_description(OperationFailure::composite(message));
    }
}
