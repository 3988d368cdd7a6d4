//! The response of a root management operation.

use std::fmt;

use warden_core::{names, ModelNode, Operation};

use super::failure::OperationFailure;
use super::step::StepRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed,
}

impl Outcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => names::SUCCESS,
            Self::Failed => names::FAILED,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response of one root operation, including the nested step responses in
/// `result` and the audit trail of every step that was registered.
#[derive(Debug, Clone)]
pub struct OperationResponse {
    pub outcome: Outcome,
    pub result: ModelNode,
    pub failure: Option<OperationFailure>,
    /// `true` when the operation failed and every rollback action succeeded.
    pub rolled_back: bool,
    /// Undo for a successful operation, for a caller layer that records it.
    pub compensating_operation: Option<Operation>,
    pub audit: Vec<StepRecord>,
}

impl OperationResponse {
    /// Failure detected before any step ran. Nothing was mutated, so there
    /// is nothing left to roll back.
    #[must_use]
    pub fn rejected(failure: OperationFailure) -> Self {
        Self {
            outcome: Outcome::Failed,
            result: ModelNode::Undefined,
            failure: Some(failure),
            rolled_back: true,
            compensating_operation: None,
            audit: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// Steps whose rollback action reported a failure.
    pub fn rollback_failures(&self) -> impl Iterator<Item = &StepRecord> {
        self.audit
            .iter()
            .filter(|record| record.rollback_failure.is_some())
    }

    /// Renders the boundary response node.
    #[must_use]
    pub fn to_node(&self) -> ModelNode {
        let mut node = ModelNode::empty_object();
        if let ModelNode::Object(fields) = &mut node {
            fields.insert(names::OUTCOME.to_string(), ModelNode::from(self.outcome.as_str()));
            if self.result.is_defined() {
                fields.insert(names::RESULT.to_string(), self.result.clone());
            }
            if let Some(failure) = &self.failure {
                fields.insert(names::FAILURE_DESCRIPTION.to_string(), failure.description().clone());
            }
            if self.outcome == Outcome::Failed {
                fields.insert(names::ROLLED_BACK.to_string(), ModelNode::from(self.rolled_back));
            }
            if let Some(compensating) = &self.compensating_operation {
                fields.insert(names::COMPENSATING_OPERATION.to_string(), compensating.to_node());
            }
        }
        node
    }
}

#[cfg(test)]
mod tests {
    use warden_core::PathAddress;

    use super::*;

    #[test]
    fn rejected_response_node() {
        let response = OperationResponse::rejected(OperationFailure::validation("bad"));
        let node = response.to_node();
        assert_eq!(node.get("outcome"), Some(&ModelNode::from("failed")));
        assert_eq!(node.get("failure-description"), Some(&ModelNode::from("bad")));
        assert_eq!(node.get("rolled-back"), Some(&ModelNode::Bool(true)));
        assert!(!node.has_defined("result"));
    }

    #[test]
    fn success_node_carries_compensation() {
        let response = OperationResponse {
            outcome: Outcome::Success,
            result: ModelNode::from("ok"),
            failure: None,
            rolled_back: false,
            compensating_operation: Some(Operation::new("undeploy", PathAddress::root())),
            audit: Vec::new(),
        };
        let node = response.to_node();
        assert!(!node.has_defined("rolled-back"));
        let compensation = Operation::from_node(node.get("compensating-operation").unwrap()).unwrap();
        assert_eq!(compensation.name(), "undeploy");
        assert_eq!(response.rollback_failures().count(), 0);
    }
}
