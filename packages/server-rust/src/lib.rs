//! Warden server: management operation engine with composite steps,
//! compensation and rollback, and a bridge to asynchronous runtime services.

pub mod controller;
pub mod handlers;
pub mod runtime;

pub use controller::middleware::build_operation_pipeline;
pub use controller::{
    ControllerConfig, ControllerError, ExecutionMode, ModelController, OperationContext,
    OperationFailure, OperationResponse, OperationStepHandler, StepResolver,
};
pub use handlers::standard_handlers;
pub use runtime::{RuntimeServices, ServiceRegistry};
