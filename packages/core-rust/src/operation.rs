//! The management operation value submitted against the configuration tree.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::address::PathAddress;
use crate::error::ModelError;
use crate::names;
use crate::node::ModelNode;

/// A named operation against a resource address.
///
/// Immutable once handed to a step; builders consume and return `self`.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    name: String,
    address: PathAddress,
    parameters: IndexMap<String, ModelNode>,
}

impl Operation {
    #[must_use]
    pub fn new(name: impl Into<String>, address: PathAddress) -> Self {
        Self {
            name: name.into(),
            address,
            parameters: IndexMap::new(),
        }
    }

    /// Adds or replaces a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ModelNode>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn address(&self) -> &PathAddress {
        &self.address
    }

    #[must_use]
    pub fn parameters(&self) -> &IndexMap<String, ModelNode> {
        &self.parameters
    }

    /// Returns a defined parameter value.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&ModelNode> {
        self.parameters.get(key).filter(|v| v.is_defined())
    }

    /// Returns a defined parameter value or a `MissingKey` error.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::MissingKey` if the parameter is absent or undefined.
    pub fn require(&self, key: &str) -> Result<&ModelNode, ModelError> {
        self.param(key).ok_or_else(|| ModelError::MissingKey {
            key: key.to_string(),
        })
    }

    /// Reads an operation from its boundary node form
    /// `{ "operation": name, "address": [...], <parameters...> }`.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is not an object, lacks a string
    /// `operation` field, or carries a malformed address.
    pub fn from_node(node: &ModelNode) -> Result<Self, ModelError> {
        let Some(fields) = node.as_object() else {
            return Err(ModelError::TypeMismatch {
                expected: crate::node::ModelType::Object,
                actual: node.model_type(),
            });
        };
        let name = fields
            .get(names::OPERATION)
            .ok_or_else(|| ModelError::MissingKey {
                key: names::OPERATION.to_string(),
            })?
            .as_str()?
            .to_string();
        let address = match fields.get(names::ADDRESS) {
            Some(address) => PathAddress::from_node(address)?,
            None => PathAddress::root(),
        };
        let parameters = fields
            .iter()
            .filter(|(key, _)| *key != names::OPERATION && *key != names::ADDRESS)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Ok(Self {
            name,
            address,
            parameters,
        })
    }

    /// Renders the boundary node form.
    #[must_use]
    pub fn to_node(&self) -> ModelNode {
        let mut fields = IndexMap::with_capacity(self.parameters.len() + 2);
        fields.insert(names::OPERATION.to_string(), ModelNode::from(self.name.as_str()));
        fields.insert(names::ADDRESS.to_string(), self.address.to_node());
        for (key, value) in &self.parameters {
            fields.insert(key.clone(), value.clone());
        }
        ModelNode::Object(fields)
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_node().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let node = ModelNode::deserialize(deserializer)?;
        Self::from_node(&node).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn from_node_splits_envelope_and_parameters() {
        let node = ModelNode::from(json!({
            "operation": "add-namespace",
            "address": [],
            "namespace": {"ee": "urn:ee"}
        }));
        let op = Operation::from_node(&node).unwrap();
        assert_eq!(op.name(), "add-namespace");
        assert!(op.address().is_root());
        assert_eq!(op.parameters().len(), 1);
        assert!(op.param("namespace").is_some());
    }

    #[test]
    fn missing_operation_name_is_rejected() {
        let node = ModelNode::from(json!({"address": []}));
        assert_eq!(
            Operation::from_node(&node).unwrap_err(),
            ModelError::MissingKey {
                key: "operation".to_string()
            }
        );
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(Operation::from_node(&ModelNode::from("composite")).is_err());
    }

    #[test]
    fn undefined_parameter_counts_as_missing() {
        let op = Operation::new("deploy", PathAddress::root()).with_param("x", ModelNode::Undefined);
        assert!(op.param("x").is_none());
        assert!(op.require("x").is_err());
    }

    #[test]
    fn serde_uses_node_form() {
        let op = Operation::new("undeploy", PathAddress::root().append("deployment", "a.war"));
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(
            json,
            json!({"operation": "undeploy", "address": [{"deployment": "a.war"}]})
        );
        let back: Operation = serde_json::from_value(json).unwrap();
        assert_eq!(back, op);
    }
}
