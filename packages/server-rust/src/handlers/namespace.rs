//! `add-namespace` / `remove-namespace`: XML namespace prefixes registered on
//! the root resource under `namespaces` (`prefix -> schema URI`).

use warden_core::{names, ModelNode, Operation};

use crate::controller::{
    HandlerOutcome, HandlerResult, OperationContext, OperationFailure, OperationStepHandler,
};

fn invalid_parameter(err: impl std::fmt::Display) -> OperationFailure {
    OperationFailure::validation(format!(
        "Invalid value for parameter '{}': {err}",
        names::NAMESPACE
    ))
}

/// Reads the `namespace` parameter as a `prefix -> uri` property.
fn namespace_property(operation: &Operation) -> Result<(String, String), OperationFailure> {
    let (prefix, uri) = operation
        .require(names::NAMESPACE)?
        .as_property()
        .map_err(invalid_parameter)?;
    let uri = uri.as_str().map_err(invalid_parameter)?;
    Ok((prefix.to_string(), uri.to_string()))
}

fn registered_uri<'a>(ctx: &'a OperationContext, prefix: &str) -> Option<&'a ModelNode> {
    ctx.model()
        .get(names::NAMESPACES)
        .and_then(|namespaces| namespaces.get(prefix))
        .filter(|uri| uri.is_defined())
}

pub struct AddNamespaceHandler;

impl OperationStepHandler for AddNamespaceHandler {
    fn validate(&self, operation: &Operation) -> Result<(), OperationFailure> {
        namespace_property(operation).map(|_| ())
    }

    fn execute(&self, ctx: &mut OperationContext, operation: &Operation) -> HandlerResult {
        let (prefix, uri) = namespace_property(operation)?;
        if let Some(existing) = registered_uri(ctx, &prefix) {
            return Err(OperationFailure::domain(format!(
                "Namespace with prefix {prefix} already registered with schema URI {existing}"
            )));
        }

        let created = !ctx.model().has_defined(names::NAMESPACES);
        ctx.model_mut()
            .get_mut(names::NAMESPACES)?
            .get_mut(&prefix)?
            .set(uri);

        let mut compensation = Operation::new(names::REMOVE_NAMESPACE, operation.address().clone())
            .with_param(names::NAMESPACE, prefix);
        if created {
            compensation = compensation.with_param(names::PRUNE_EMPTY, true);
        }
        Ok(HandlerOutcome::compensated_by(compensation))
    }
}

pub struct RemoveNamespaceHandler;

impl OperationStepHandler for RemoveNamespaceHandler {
    fn validate(&self, operation: &Operation) -> Result<(), OperationFailure> {
        operation
            .require(names::NAMESPACE)?
            .as_str()
            .map_err(invalid_parameter)?;
        Ok(())
    }

    fn execute(&self, ctx: &mut OperationContext, operation: &Operation) -> HandlerResult {
        let prefix = operation
            .require(names::NAMESPACE)?
            .as_str()
            .map_err(invalid_parameter)?
            .to_string();
        let Some(uri) = registered_uri(ctx, &prefix).cloned() else {
            return Err(OperationFailure::domain(format!(
                "No namespace with prefix {prefix} is registered"
            )));
        };

        let prune = match operation.param(names::PRUNE_EMPTY) {
            Some(flag) => flag.as_bool().map_err(|err| {
                OperationFailure::validation(format!(
                    "Invalid value for parameter '{}': {err}",
                    names::PRUNE_EMPTY
                ))
            })?,
            None => false,
        };
        let namespaces = ctx.model_mut().get_mut(names::NAMESPACES)?;
        namespaces.remove(&prefix);
        if prune && namespaces.keys().next().is_none() {
            ctx.model_mut().remove(names::NAMESPACES);
        }

        Ok(HandlerOutcome::compensated_by(
            Operation::new(names::ADD_NAMESPACE, operation.address().clone())
                .with_param(names::NAMESPACE, ModelNode::property(prefix, uri)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;
    use warden_core::PathAddress;

    use super::*;
    use crate::controller::{ExecutionMode, FailureKind, OperationResponse};
    use crate::handlers::standard_handlers;

    fn add(prefix: &str, uri: &str) -> Operation {
        Operation::new(names::ADD_NAMESPACE, PathAddress::root())
            .with_param(names::NAMESPACE, ModelNode::property(prefix, uri))
    }

    async fn run(model: ModelNode, op: Operation) -> (ModelNode, OperationResponse) {
        OperationContext::new(model, ExecutionMode::ModelOnly, Arc::new(standard_handlers()))
            .execute(op)
            .await
    }

    #[test]
    fn add_requires_a_property() {
        let op = Operation::new(names::ADD_NAMESPACE, PathAddress::root())
            .with_param(names::NAMESPACE, "just-a-string");
        let failure = AddNamespaceHandler.validate(&op).unwrap_err();
        assert_eq!(failure.kind(), FailureKind::Validation);
        assert_eq!(
            failure.to_string(),
            "Invalid value for parameter 'namespace': expected a value of type PROPERTY but found STRING"
        );
    }

    #[tokio::test]
    async fn duplicate_prefix_is_rejected_without_mutation() {
        let model = ModelNode::from(serde_json::json!({ "namespaces": { "ex": "urn:one" } }));
        let (after, response) = run(model.clone(), add("ex", "urn:two")).await;
        assert_eq!(after, model);
        let failure = response.failure.unwrap();
        assert_eq!(failure.kind(), FailureKind::Domain);
        assert_eq!(
            failure.to_string(),
            "Namespace with prefix ex already registered with schema URI urn:one"
        );
    }

    #[tokio::test]
    async fn existing_empty_container_survives_the_round_trip() {
        let model = ModelNode::from(serde_json::json!({ "namespaces": {} }));
        let (added, response) = run(model.clone(), add("ex", "urn:example")).await;
        let undo = response.compensating_operation.unwrap();
        assert!(undo.param(names::PRUNE_EMPTY).is_none());

        let (restored, response) = run(added, undo).await;
        assert!(response.is_success());
        assert_eq!(restored, model);
    }

    #[tokio::test]
    async fn plain_remove_keeps_the_container() {
        let model = ModelNode::from(serde_json::json!({ "namespaces": { "ex": "urn:example" } }));
        let op = Operation::new(names::REMOVE_NAMESPACE, PathAddress::root())
            .with_param(names::NAMESPACE, "ex");
        let (after, response) = run(model, op).await;
        assert!(response.is_success());
        assert_eq!(after, ModelNode::from(serde_json::json!({ "namespaces": {} })));
    }

    #[tokio::test]
    async fn remove_unknown_prefix_fails() {
        let op = Operation::new(names::REMOVE_NAMESPACE, PathAddress::root())
            .with_param(names::NAMESPACE, "nope");
        let (_, response) = run(ModelNode::empty_object(), op).await;
        assert_eq!(
            response.failure.unwrap().to_string(),
            "No namespace with prefix nope is registered"
        );
    }

    #[tokio::test]
    async fn add_then_compensate_restores_model() {
        let model = ModelNode::empty_object();
        let (after_add, response) = run(model.clone(), add("ex", "urn:example")).await;
        assert!(response.is_success());
        let compensation = response.compensating_operation.unwrap();
        assert_eq!(compensation.name(), names::REMOVE_NAMESPACE);

        let (restored, response) = run(after_add, compensation).await;
        assert!(response.is_success());
        assert_eq!(restored, model);
    }

    proptest! {
        #[test]
        fn remove_undoes_add_for_any_prefix(
            prefix in "[a-z][a-z0-9]{0,7}",
            uri in "urn:[a-z]{1,12}",
            others in proptest::collection::btree_map("[a-z]{1,6}", "urn:[a-z]{1,6}", 0..4),
        ) {
            prop_assume!(!others.contains_key(&prefix));
            let mut model = ModelNode::empty_object();
            for (p, u) in &others {
                model.get_mut("namespaces").unwrap().get_mut(p).unwrap().set(u.as_str());
            }

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let (added, response) = runtime.block_on(run(model.clone(), add(&prefix, &uri)));
            prop_assert!(response.is_success());
            let undo = response.compensating_operation.unwrap();
            let (restored, response) = runtime.block_on(run(added, undo));
            prop_assert!(response.is_success());
            prop_assert_eq!(restored, model);
        }
    }
}
