//! Step resolution: from an operation to the handler that runs it.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use warden_core::Operation;

use super::context::OperationContext;
use super::failure::OperationFailure;
use super::handler::OperationStepHandler;

/// Maps an operation to its handler.
pub trait StepResolver: Send + Sync {
    /// # Errors
    ///
    /// Returns a validation failure when no handler exists for the operation.
    fn resolve(&self, operation: &Operation) -> Result<Arc<dyn OperationStepHandler>, OperationFailure>;
}

/// Read-only handler catalogue keyed by operation name.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn OperationStepHandler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered operation names, sorted.
    #[must_use]
    pub fn operation_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl StepResolver for HandlerRegistry {
    fn resolve(&self, operation: &Operation) -> Result<Arc<dyn OperationStepHandler>, OperationFailure> {
        self.handlers.get(operation.name()).cloned().ok_or_else(|| {
            OperationFailure::validation(format!(
                "No operation named '{}' exists at address {}",
                operation.name(),
                operation.address()
            ))
        })
    }
}

#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<String, Arc<dyn OperationStepHandler>>,
}

impl HandlerRegistryBuilder {
    /// Registers `handler` under `name`, replacing any earlier registration.
    #[must_use]
    pub fn register(mut self, name: impl Into<String>, handler: Arc<dyn OperationStepHandler>) -> Self {
        let name = name.into();
        if self.handlers.insert(name.clone(), handler).is_some() {
            tracing::warn!(operation = %name, "handler registered twice, keeping the last one");
        }
        self
    }

    #[must_use]
    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

/// Resolves every step first, then registers them all on the current step in
/// order. Nothing is registered if any step fails to resolve.
///
/// # Errors
///
/// Returns the first resolution failure.
pub fn record_steps(
    ctx: &mut OperationContext,
    steps: IndexMap<String, Operation>,
    resolver: &dyn StepResolver,
) -> Result<(), OperationFailure> {
    let resolved = steps
        .into_iter()
        .map(|(name, op)| {
            op_handler(resolver, &op).map(|handler| (name, op, handler))
        })
        .collect::<Result<Vec<_>, _>>()?;
    for (name, op, handler) in resolved {
        ctx.add_step(name, op, handler);
    }
    Ok(())
}

fn op_handler(
    resolver: &dyn StepResolver,
    op: &Operation,
) -> Result<Arc<dyn OperationStepHandler>, OperationFailure> {
    let handler = resolver.resolve(op)?;
    handler.validate(op)?;
    Ok(handler)
}

#[cfg(test)]
mod tests {
    use warden_core::PathAddress;

    use super::*;
    use crate::controller::failure::FailureKind;
    use crate::handlers::ReadResourceHandler;

    #[test]
    fn unknown_operation_is_a_validation_failure() {
        let registry = HandlerRegistry::builder().build();
        let op = Operation::new("frobnicate", "/deployment=a.war".parse().unwrap());
        let Err(failure) = registry.resolve(&op) else {
            panic!("expected resolution to fail");
        };
        assert_eq!(failure.kind(), FailureKind::Validation);
        assert_eq!(
            failure.to_string(),
            "No operation named 'frobnicate' exists at address /deployment=a.war"
        );
    }

    #[test]
    fn registered_handlers_resolve_by_name() {
        let registry = HandlerRegistry::builder()
            .register("read-resource", Arc::new(ReadResourceHandler))
            .build();
        assert!(registry.contains("read-resource"));
        assert_eq!(registry.operation_names(), vec!["read-resource"]);
        let op = Operation::new("read-resource", PathAddress::root());
        assert!(registry.resolve(&op).is_ok());
    }
}
