//! The handler catalogue: composite batches, namespaces, deployments and
//! resource reads.

pub mod composite;
pub mod deployment;
pub mod namespace;
pub mod read;

use std::sync::Arc;

use warden_core::names;

pub use composite::{CompositeOperationHandler, CompositeRollback};
pub use deployment::{DeploymentModeHandler, RestoreDeployment};
pub use namespace::{AddNamespaceHandler, RemoveNamespaceHandler};
pub use read::ReadResourceHandler;

use crate::controller::HandlerRegistry;

/// Registry with every built-in operation.
#[must_use]
pub fn standard_handlers() -> HandlerRegistry {
    HandlerRegistry::builder()
        .register(names::COMPOSITE, Arc::new(CompositeOperationHandler::new()))
        .register(names::ADD_NAMESPACE, Arc::new(AddNamespaceHandler))
        .register(names::REMOVE_NAMESPACE, Arc::new(RemoveNamespaceHandler))
        .register(names::DEPLOY, Arc::new(DeploymentModeHandler::deploy()))
        .register(names::UNDEPLOY, Arc::new(DeploymentModeHandler::undeploy()))
        .register(names::READ_RESOURCE, Arc::new(ReadResourceHandler))
        .build()
}
