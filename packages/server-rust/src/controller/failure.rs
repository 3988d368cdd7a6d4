//! Failure taxonomy for management operations.

use std::fmt;

use warden_core::{ModelError, ModelNode};

/// Classifies why a step failed. Callers branch on the kind, never on the
/// message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Malformed or missing parameters, detected before any mutation.
    Validation,
    /// Business rules rejected the operation after inspecting the model.
    Domain,
    /// The runtime service could not be located or its lifecycle transition
    /// reported an error.
    RuntimeBridge,
    /// One or more child steps of a composite operation failed.
    Composite,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Domain => "domain",
            Self::RuntimeBridge => "runtime",
            Self::Composite => "composite",
        };
        f.write_str(name)
    }
}

/// The single failure type returned by every handler step.
///
/// `description` becomes the step's `failure-description`. It is usually a
/// string but may be any node.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{description}")]
pub struct OperationFailure {
    kind: FailureKind,
    description: ModelNode,
}

impl OperationFailure {
    #[must_use]
    pub fn new(kind: FailureKind, description: impl Into<ModelNode>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    #[must_use]
    pub fn validation(description: impl Into<ModelNode>) -> Self {
        Self::new(FailureKind::Validation, description)
    }

    #[must_use]
    pub fn domain(description: impl Into<ModelNode>) -> Self {
        Self::new(FailureKind::Domain, description)
    }

    #[must_use]
    pub fn runtime_bridge(description: impl Into<ModelNode>) -> Self {
        Self::new(FailureKind::RuntimeBridge, description)
    }

    #[must_use]
    pub fn composite(description: impl Into<ModelNode>) -> Self {
        Self::new(FailureKind::Composite, description)
    }

    #[must_use]
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    #[must_use]
    pub fn description(&self) -> &ModelNode {
        &self.description
    }
}

impl From<ModelError> for OperationFailure {
    fn from(err: ModelError) -> Self {
        Self::validation(err.to_string())
    }
}

/// Errors from the controller front door, as opposed to operation failures
/// which are reported inside an `OperationResponse`.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// The admission queue in front of the model was full.
    #[error("controller overloaded with {admitted} admitted operations, rejected {operation}")]
    Overloaded { operation: String, admitted: usize },
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use warden_core::ModelType;

    use super::*;

    #[test]
    fn model_errors_become_validation_failures() {
        let failure = OperationFailure::from(ModelError::TypeMismatch {
            expected: ModelType::List,
            actual: ModelType::String,
        });
        assert_eq!(failure.kind(), FailureKind::Validation);
        assert_eq!(
            failure.to_string(),
            "expected a value of type LIST but found STRING"
        );
    }

    #[test]
    fn overloaded_names_the_rejected_operation() {
        let err = ControllerError::Overloaded {
            operation: "deploy".to_string(),
            admitted: 4,
        };
        assert_eq!(
            err.to_string(),
            "controller overloaded with 4 admitted operations, rejected deploy"
        );
    }

    #[test]
    fn display_is_the_description() {
        let failure = OperationFailure::domain("already registered");
        assert_eq!(failure.to_string(), "already registered");
        assert_eq!(failure.description(), &ModelNode::from("already registered"));
    }
}
