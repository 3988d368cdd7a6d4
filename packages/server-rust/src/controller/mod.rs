//! Management operation execution: the Operation Context and step engine,
//! handler resolution, responses, and the `ModelController` front door.

pub mod config;
pub mod context;
pub mod failure;
pub mod handler;
pub mod middleware;
pub mod model_controller;
pub mod registry;
pub mod response;
pub mod step;

pub use config::ControllerConfig;
pub use context::{AttachmentKey, ExecutionMode, OperationContext, EXPLAINED_FAILURE};
pub use failure::{ControllerError, FailureKind, OperationFailure};
pub use handler::{HandlerOutcome, HandlerResult, OperationStepHandler};
pub use model_controller::ModelController;
pub use registry::{record_steps, HandlerRegistry, HandlerRegistryBuilder, StepResolver};
pub use response::{OperationResponse, Outcome};
pub use step::{
    CompensatingRollback, CompletionReceiver, RollbackHandler, RuntimeEffect, StepCompletion,
    StepId, StepRecord, StepStatus,
};
