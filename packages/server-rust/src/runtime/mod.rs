//! Runtime service layer: lifecycle contract, service controllers, the
//! service registry and the bridge from operation steps to service
//! transitions.

pub mod deployment;
pub mod lifecycle;
pub mod listener;
pub mod registry;
pub mod service;

pub use deployment::{install_deployment_units, DeploymentUnitService};
pub use lifecycle::{
    LifecycleEvent, LifecycleListener, ListenerControl, ListenerSet, RuntimeServices,
    ServiceHandle, ServiceLookup, ServiceMode, ServiceName, ServiceState,
};
pub use listener::{OneShotListener, ServiceModeChange};
pub use registry::ServiceRegistry;
pub use service::{ManagedService, ServiceController};
