//! Pipeline composition: combines all middleware layers into a single service stack.

use tower::ServiceBuilder;
use warden_core::Operation;

use super::load_shed::LoadShedLayer;
use super::metrics::MetricsLayer;
use crate::controller::config::ControllerConfig;
use crate::controller::{ControllerError, ModelController, OperationResponse};

/// Build the operation pipeline by wrapping the `ModelController` with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `LoadShedLayer` -- shed once the admission queue is full
/// 2. `MetricsLayer` -- span and outcome summary per admitted operation
///
/// No timeout layer: an operation finishes when its runtime effects report
/// completion.
#[must_use]
pub fn build_operation_pipeline(
    controller: ModelController,
    config: &ControllerConfig,
) -> impl tower::Service<Operation, Response = OperationResponse, Error = ControllerError> {
    ServiceBuilder::new()
        .layer(LoadShedLayer::new(config.max_concurrent_operations))
        .layer(MetricsLayer)
        .service(controller)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tower::ServiceExt;
    use warden_core::{ModelNode, PathAddress};

    use super::*;
    use crate::controller::ExecutionMode;
    use crate::handlers::standard_handlers;

    #[tokio::test]
    async fn pipeline_routes_through_all_layers() {
        let model = ModelNode::from(serde_json::json!({ "namespaces": { "a": "urn:a" } }));
        let controller =
            ModelController::new(model, Arc::new(standard_handlers()), ExecutionMode::ModelOnly);
        let config = ControllerConfig {
            max_concurrent_operations: 100,
            ..ControllerConfig::default()
        };

        let svc = build_operation_pipeline(controller, &config);
        let resp = svc
            .oneshot(Operation::new("read-resource", PathAddress::root()))
            .await
            .unwrap();
        assert!(resp.is_success());
        assert_eq!(
            resp.result.get("namespaces").and_then(|ns| ns.get("a")),
            Some(&ModelNode::from("urn:a"))
        );
    }
}
