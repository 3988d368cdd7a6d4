//! Tower middleware layers for the operation pipeline.
//!
//! - [`load_shed`]: bounded admission of root operations
//! - [`metrics`]: per-operation span and outcome summary
//! - [`pipeline`]: Composes all layers around the [`ModelController`](super::ModelController)

pub mod load_shed;
pub mod metrics;
pub mod pipeline;

pub use load_shed::{Admission, LoadShedLayer};
pub use metrics::{MetricsLayer, OperationSummary};
pub use pipeline::build_operation_pipeline;
