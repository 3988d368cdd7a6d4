//! Resource addresses within the configuration tree.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ModelError;
use crate::node::ModelNode;

/// One `key=value` segment of a [`PathAddress`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathElement {
    /// Resource type, e.g. `deployment`.
    pub key: String,
    /// Resource name, e.g. `app.war`.
    pub value: String,
}

impl PathElement {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Ordered path from the root resource to a resource in the tree.
///
/// The empty address is the root. Text form is `/` for the root and
/// `/key=value/key=value` otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PathAddress {
    elements: Vec<PathElement>,
}

impl PathAddress {
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new(elements: Vec<PathElement>) -> Self {
        Self { elements }
    }

    /// Returns a new address with one more segment.
    #[must_use]
    pub fn append(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut elements = self.elements.clone();
        elements.push(PathElement::new(key, value));
        Self { elements }
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.elements.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&PathElement> {
        self.elements.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathElement> {
        self.elements.iter()
    }

    /// Node form: a list of `key -> value` properties.
    #[must_use]
    pub fn to_node(&self) -> ModelNode {
        ModelNode::List(
            self.elements
                .iter()
                .map(|e| ModelNode::property(e.key.clone(), e.value.clone()))
                .collect(),
        )
    }

    /// Reads an address from its node form.
    ///
    /// Accepts an undefined node (root), the text form, or a list of
    /// properties / single-key objects.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidAddress` or `ModelError::TypeMismatch`
    /// when the node has any other shape.
    pub fn from_node(node: &ModelNode) -> Result<Self, ModelError> {
        match node {
            ModelNode::Undefined => Ok(Self::root()),
            ModelNode::String(text) => text.parse(),
            ModelNode::List(items) => {
                let mut elements = Vec::with_capacity(items.len());
                for item in items {
                    let (key, value) = item.as_property()?;
                    let value = value.as_str()?;
                    elements.push(validated(key, value, &node.to_string())?);
                }
                Ok(Self { elements })
            }
            other => Err(ModelError::InvalidAddress {
                input: other.to_string(),
                reason: "address must be a list of key=value pairs",
            }),
        }
    }
}

fn validated(key: &str, value: &str, input: &str) -> Result<PathElement, ModelError> {
    let invalid = |reason| ModelError::InvalidAddress {
        input: input.to_string(),
        reason,
    };
    if key.is_empty() || value.is_empty() {
        return Err(invalid("empty key or value"));
    }
    if key.contains(['/', '=']) || value.contains(['/', '=']) {
        return Err(invalid("'/' and '=' are reserved"));
    }
    Ok(PathElement::new(key, value))
}

impl FromStr for PathAddress {
    type Err = ModelError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let Some(rest) = input.strip_prefix('/') else {
            return Err(ModelError::InvalidAddress {
                input: input.to_string(),
                reason: "address must start with '/'",
            });
        };
        if rest.is_empty() {
            return Ok(Self::root());
        }
        let elements = rest
            .split('/')
            .map(|segment| {
                let (key, value) = segment.split_once('=').ok_or(ModelError::InvalidAddress {
                    input: input.to_string(),
                    reason: "segment is missing '='",
                })?;
                validated(key, value, input)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { elements })
    }
}

impl fmt::Display for PathAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.elements.is_empty() {
            return f.write_str("/");
        }
        for element in &self.elements {
            write!(f, "/{}={}", element.key, element.value)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a PathAddress {
    type Item = &'a PathElement;
    type IntoIter = std::slice::Iter<'a, PathElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

impl Serialize for PathAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_node().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PathAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let node = ModelNode::deserialize(deserializer)?;
        Self::from_node(&node).map_err(serde::de::Error::custom)
    }
}
