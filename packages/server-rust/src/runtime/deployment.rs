//! Runtime service backing a deployment resource.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use warden_core::{names, ModelNode};

use super::lifecycle::{ServiceMode, ServiceName};
use super::registry::ServiceRegistry;
use super::service::ManagedService;

/// A deployed unit. Starting it makes the deployment available; stopping it
/// takes it out of service.
pub struct DeploymentUnitService {
    deployment: String,
    running: AtomicBool,
}

impl DeploymentUnitService {
    #[must_use]
    pub fn new(deployment: impl Into<String>) -> Self {
        Self {
            deployment: deployment.into(),
            running: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

#[async_trait]
impl ManagedService for DeploymentUnitService {
    async fn start(&self) -> anyhow::Result<()> {
        self.running.store(true, Ordering::Release);
        info!(deployment = %self.deployment, "deployment unit available");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.running.store(false, Ordering::Release);
        info!(deployment = %self.deployment, "deployment unit withdrawn");
        Ok(())
    }
}

/// Installs a [`DeploymentUnitService`] for every `deployment=*` resource in
/// `model`, active when the resource is enabled. Units are named after the
/// resource key, as the `deploy` and `undeploy` handlers address them.
/// Returns the number installed.
///
/// # Errors
///
/// Returns an error if a unit fails to install or start.
pub async fn install_deployment_units(
    registry: &ServiceRegistry,
    model: &ModelNode,
) -> anyhow::Result<usize> {
    let Some(deployments) = model.get(names::DEPLOYMENT).and_then(ModelNode::as_object) else {
        return Ok(0);
    };
    for (name, resource) in deployments {
        let enabled = resource
            .get(names::ENABLED)
            .and_then(|flag| flag.as_bool().ok())
            .unwrap_or(false);
        let mode = if enabled {
            ServiceMode::Active
        } else {
            ServiceMode::Never
        };
        registry
            .install(
                ServiceName::deployment_unit(name),
                Arc::new(DeploymentUnitService::new(name.clone())),
                mode,
            )
            .await?;
    }
    Ok(deployments.len())
}
