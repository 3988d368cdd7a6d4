//! `deploy` / `undeploy`: flip a deployment's `enabled` flag and move its
//! deployment-unit service to the matching mode.

use warden_core::{names, Operation, PathAddress};

use crate::controller::{
    HandlerOutcome, HandlerResult, OperationContext, OperationFailure, OperationStepHandler,
    RollbackHandler,
};
use crate::runtime::{ServiceMode, ServiceModeChange, ServiceName};

fn mode_for(enabled: bool) -> ServiceMode {
    if enabled {
        ServiceMode::Active
    } else {
        ServiceMode::Never
    }
}

fn operation_for(enabled: bool) -> &'static str {
    if enabled {
        names::DEPLOY
    } else {
        names::UNDEPLOY
    }
}

/// Name of the deployment addressed by `operation`, which is also the name
/// of its deployment-unit service.
fn deployment_name(operation: &Operation) -> Result<&str, OperationFailure> {
    match operation.address().last() {
        Some(element) if element.key == names::DEPLOYMENT => Ok(element.value.as_str()),
        _ => Err(OperationFailure::validation(format!(
            "Operation {} requires a deployment address, got {}",
            operation.name(),
            operation.address()
        ))),
    }
}

fn flag_param(operation: &Operation, key: &str) -> Result<bool, OperationFailure> {
    operation.param(key).map_or(Ok(false), |value| {
        value.as_bool().map_err(|err| {
            OperationFailure::validation(format!("Invalid value for parameter '{key}': {err}"))
        })
    })
}

/// Operation that puts the `enabled` attribute back to `previous`, removing
/// it when it was not set.
fn restore_operation(address: &PathAddress, previous: Option<bool>) -> Operation {
    match previous {
        Some(enabled) => Operation::new(operation_for(enabled), address.clone()),
        None => Operation::new(names::UNDEPLOY, address.clone()).with_param(names::CLEAR_ENABLED, true),
    }
}

/// Handler for both `deploy` (`enable = true`) and `undeploy`.
///
/// `undeploy` accepts `clear-enabled`, which removes the attribute instead
/// of writing `false`; the service is stopped either way.
#[derive(Debug, Clone, Copy)]
pub struct DeploymentModeHandler {
    enable: bool,
}

impl DeploymentModeHandler {
    #[must_use]
    pub fn deploy() -> Self {
        Self { enable: true }
    }

    #[must_use]
    pub fn undeploy() -> Self {
        Self { enable: false }
    }
}

impl OperationStepHandler for DeploymentModeHandler {
    fn validate(&self, operation: &Operation) -> Result<(), OperationFailure> {
        deployment_name(operation)?;
        if flag_param(operation, names::CLEAR_ENABLED)? && self.enable {
            return Err(OperationFailure::validation(format!(
                "Parameter '{}' is only valid for {}",
                names::CLEAR_ENABLED,
                names::UNDEPLOY
            )));
        }
        Ok(())
    }

    fn execute(&self, ctx: &mut OperationContext, operation: &Operation) -> HandlerResult {
        let address = operation.address();
        let service = ServiceName::deployment_unit(deployment_name(operation)?);
        let clear = !self.enable && flag_param(operation, names::CLEAR_ENABLED)?;

        let resource = ctx.resource_mut(address)?;
        let previous = match resource.get(names::ENABLED) {
            Some(flag) if flag.is_defined() => Some(flag.as_bool()?),
            _ => None,
        };
        if clear {
            resource.remove(names::ENABLED);
        } else {
            resource.get_mut(names::ENABLED)?.set(self.enable);
        }

        ctx.complete_step(RestoreDeployment {
            address: address.clone(),
            service: service.clone(),
            enabled: previous,
        });
        ctx.run_runtime_effect(ServiceModeChange::new(service, mode_for(self.enable)));

        Ok(HandlerOutcome::compensated_by(restore_operation(address, previous)))
    }
}

/// Puts a deployment's `enabled` attribute (or its absence) and, when the
/// service is installed, its service mode back to what they were before the
/// step.
#[derive(Debug, Clone)]
pub struct RestoreDeployment {
    address: PathAddress,
    service: ServiceName,
    enabled: Option<bool>,
}

impl RollbackHandler for RestoreDeployment {
    fn handle_rollback(&self, ctx: &mut OperationContext, _operation: &Operation) {
        let restored = ctx.resource_mut(&self.address).and_then(|resource| match self.enabled {
            Some(enabled) => resource
                .get_mut(names::ENABLED)
                .map(|flag| {
                    flag.set(enabled);
                })
                .map_err(OperationFailure::from),
            None => {
                resource.remove(names::ENABLED);
                Ok(())
            }
        });
        if let Err(failure) = restored {
            ctx.record_rollback_failure(failure);
            return;
        }

        let installed = ctx
            .runtime()
            .is_some_and(|runtime| runtime.lookup(&self.service).is_some());
        if installed {
            ctx.run_runtime_effect(ServiceModeChange::new(
                self.service.clone(),
                mode_for(self.enabled.unwrap_or(false)),
            ));
        }
    }
}
