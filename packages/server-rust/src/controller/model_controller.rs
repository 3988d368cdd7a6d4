//! `ModelController`: the front door that owns the live model and runs one
//! root operation at a time against it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::Mutex;
use tower::Service;
use tracing::{info_span, warn, Instrument};
use warden_core::{ModelNode, Operation};

use super::config::ControllerConfig;
use super::context::{ExecutionMode, OperationContext};
use super::failure::ControllerError;
use super::registry::StepResolver;
use super::response::OperationResponse;
use crate::runtime::{RuntimeServices, ServiceLookup};

struct Inner {
    node_id: String,
    model: Arc<Mutex<ModelNode>>,
    resolver: Arc<dyn StepResolver>,
    mode: ExecutionMode,
}

/// Cheaply cloneable handle to the live model.
///
/// Root operations are serialized: each one takes the model out for the
/// duration of its context and puts the (possibly rolled back) result back.
#[derive(Clone)]
pub struct ModelController {
    inner: Arc<Inner>,
}

impl ModelController {
    #[must_use]
    pub fn new(model: ModelNode, resolver: Arc<dyn StepResolver>, mode: ExecutionMode) -> Self {
        Self {
            inner: Arc::new(Inner {
                node_id: ControllerConfig::default().node_id,
                model: Arc::new(Mutex::new(model)),
                resolver,
                mode,
            }),
        }
    }

    /// Builds a controller whose execution mode follows
    /// `config.runtime_effects`.
    #[must_use]
    pub fn with_config(
        config: &ControllerConfig,
        model: ModelNode,
        resolver: Arc<dyn StepResolver>,
        services: Arc<dyn ServiceLookup>,
    ) -> Self {
        let mode = if config.runtime_effects {
            ExecutionMode::Runtime(RuntimeServices::new(services))
        } else {
            ExecutionMode::ModelOnly
        };
        Self {
            inner: Arc::new(Inner {
                node_id: config.node_id.clone(),
                model: Arc::new(Mutex::new(model)),
                resolver,
                mode,
            }),
        }
    }

    #[must_use]
    pub fn mode(&self) -> &ExecutionMode {
        &self.inner.mode
    }

    /// Snapshot of the live model.
    pub async fn read_model(&self) -> ModelNode {
        self.inner.model.lock().await.clone()
    }

    /// Executes `operation` in the controller's configured mode.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::Internal` if the operation task panicked. The
    /// model is restored to its state before the operation in that case.
    pub async fn execute(&self, operation: Operation) -> Result<OperationResponse, ControllerError> {
        self.execute_with_mode(operation, self.inner.mode.clone()).await
    }

    /// Executes `operation` with an explicit execution mode.
    ///
    /// Once the model lock is acquired the operation runs to completion on
    /// its own task, which holds the lock and writes the model back. Dropping
    /// the returned future after that point only discards the response.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn execute_with_mode(
        &self,
        operation: Operation,
        mode: ExecutionMode,
    ) -> Result<OperationResponse, ControllerError> {
        let span = info_span!("model_controller", node_id = %self.inner.node_id);
        let guard = Arc::clone(&self.inner.model).lock_owned().await;
        let resolver = Arc::clone(&self.inner.resolver);

        let owner = tokio::spawn(
            async move {
                let mut guard = guard;
                let snapshot = guard.clone();
                let ctx = OperationContext::new(std::mem::take(&mut *guard), mode, resolver);
                match tokio::spawn(ctx.execute(operation).in_current_span()).await {
                    Ok((model, response)) => {
                        *guard = model;
                        Ok(response)
                    }
                    Err(err) => {
                        *guard = snapshot;
                        warn!(error = %err, "operation task failed, model restored");
                        Err(ControllerError::Internal(anyhow::anyhow!(
                            "operation task failed: {err}"
                        )))
                    }
                }
            }
            .instrument(span),
        );

        owner.await.map_err(|err| {
            ControllerError::Internal(anyhow::anyhow!("operation owner task failed: {err}"))
        })?
    }
}

impl Service<Operation> for ModelController {
    type Response = OperationResponse;
    type Error = ControllerError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationResponse, ControllerError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let controller = self.clone();
        Box::pin(async move { controller.execute(op).await })
    }
}
