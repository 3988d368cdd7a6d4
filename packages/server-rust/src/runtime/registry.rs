use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::info;

use super::lifecycle::{ServiceHandle, ServiceLookup, ServiceMode, ServiceName};
use super::service::{ManagedService, ServiceController};

/// Registry of installed runtime services.
///
/// Services installed through [`install`](Self::install) get a controller and
/// are shut down in reverse installation order. Externally managed handles
/// can be registered for lookup only.
pub struct ServiceRegistry {
    handles: DashMap<ServiceName, Arc<dyn ServiceHandle>>,
    controllers: DashMap<ServiceName, Arc<ServiceController>>,
    install_order: RwLock<Vec<ServiceName>>,
}

impl ServiceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            controllers: DashMap::new(),
            install_order: RwLock::new(Vec::new()),
        }
    }

    /// Installs `service` under `name` and drives it to `mode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken or the service fails to reach
    /// `mode`. A service that fails to start stays installed.
    pub async fn install(
        &self,
        name: ServiceName,
        service: Arc<dyn ManagedService>,
        mode: ServiceMode,
    ) -> anyhow::Result<Arc<ServiceController>> {
        if self.handles.contains_key(&name) {
            anyhow::bail!("service {name} is already installed");
        }
        let controller = ServiceController::spawn(name.clone(), service);
        self.handles
            .insert(name.clone(), controller.clone() as Arc<dyn ServiceHandle>);
        self.controllers.insert(name.clone(), controller.clone());
        self.install_order.write().push(name.clone());
        info!(service = %name, ?mode, "service installed");

        if mode == ServiceMode::Active {
            controller
                .transition_to(mode)
                .await
                .map_err(|failure| anyhow::anyhow!("{failure}"))?;
        }
        Ok(controller)
    }

    /// Makes an externally managed handle visible to lookups.
    pub fn register_handle(&self, handle: Arc<dyn ServiceHandle>) {
        self.handles.insert(handle.name().clone(), handle);
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn ServiceHandle>> {
        self.lookup(&ServiceName::new(name))
    }

    pub fn controller(&self, name: &ServiceName) -> Option<Arc<ServiceController>> {
        self.controllers.get(name).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stops every installed service in reverse installation order.
    pub async fn shutdown_all(&self) {
        let order = self.install_order.read().clone();
        for name in order.iter().rev() {
            if let Some(controller) = self.controller(name) {
                controller.shutdown().await;
            }
        }
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceLookup for ServiceRegistry {
    fn lookup(&self, name: &ServiceName) -> Option<Arc<dyn ServiceHandle>> {
        self.handles.get(name).map(|entry| entry.value().clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
