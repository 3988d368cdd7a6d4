//! Warden core: configuration tree values, resource addresses and operations.

pub mod address;
pub mod error;
pub mod names;
pub mod node;
pub mod operation;

pub use address::{PathAddress, PathElement};
pub use error::ModelError;
pub use node::{ModelNode, ModelType};
pub use operation::Operation;
