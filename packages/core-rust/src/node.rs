//! Dynamically typed configuration tree values.
//!
//! [`ModelNode`] is the single value type used for the configuration tree,
//! operation parameters and operation responses. Objects keep insertion order
//! so response maps render in the order their keys were reserved, while
//! equality ignores key order.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::address::PathAddress;
use crate::error::ModelError;

/// Discriminant of a [`ModelNode`], used in type errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    Undefined,
    Bool,
    Int,
    Double,
    String,
    List,
    Object,
    Property,
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Undefined => "UNDEFINED",
            Self::Bool => "BOOLEAN",
            Self::Int => "INT",
            Self::Double => "DOUBLE",
            Self::String => "STRING",
            Self::List => "LIST",
            Self::Object => "OBJECT",
            Self::Property => "PROPERTY",
        };
        f.write_str(name)
    }
}

/// A node in the configuration tree.
///
/// `Undefined` is the default and stands in for "no value"; reading a missing
/// key yields `None` rather than an undefined node so callers cannot confuse
/// the two by accident.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ModelNode {
    #[default]
    Undefined,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    List(Vec<ModelNode>),
    /// Ordered map of child nodes. Equality is order-insensitive.
    Object(IndexMap<String, ModelNode>),
    /// A single named value, e.g. a namespace `prefix -> uri` pair.
    Property(String, Box<ModelNode>),
}

impl ModelNode {
    /// Creates an empty object node.
    #[must_use]
    pub fn empty_object() -> Self {
        Self::Object(IndexMap::new())
    }

    /// Creates a property node.
    #[must_use]
    pub fn property(name: impl Into<String>, value: impl Into<ModelNode>) -> Self {
        Self::Property(name.into(), Box::new(value.into()))
    }

    #[must_use]
    pub fn model_type(&self) -> ModelType {
        match self {
            Self::Undefined => ModelType::Undefined,
            Self::Bool(_) => ModelType::Bool,
            Self::Int(_) => ModelType::Int,
            Self::Double(_) => ModelType::Double,
            Self::String(_) => ModelType::String,
            Self::List(_) => ModelType::List,
            Self::Object(_) => ModelType::Object,
            Self::Property(..) => ModelType::Property,
        }
    }

    #[must_use]
    pub fn is_defined(&self) -> bool {
        !matches!(self, Self::Undefined)
    }

    /// Replaces this node's value, returning the previous one.
    pub fn set(&mut self, value: impl Into<ModelNode>) -> ModelNode {
        std::mem::replace(self, value.into())
    }

    /// Turns this node into an empty object and returns it.
    pub fn set_empty_object(&mut self) -> &mut Self {
        *self = Self::empty_object();
        self
    }

    /// Returns the child under `key` if this is an object holding that key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ModelNode> {
        match self {
            Self::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// Returns the child under `key`, creating it (undefined) if absent.
    ///
    /// An undefined node is converted into an empty object first.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::TypeMismatch` if this node is neither undefined
    /// nor an object.
    pub fn get_mut(&mut self, key: &str) -> Result<&mut ModelNode, ModelError> {
        if !self.is_defined() {
            self.set_empty_object();
        }
        match self {
            Self::Object(map) => Ok(map.entry(key.to_string()).or_default()),
            other => Err(ModelError::TypeMismatch {
                expected: ModelType::Object,
                actual: other.model_type(),
            }),
        }
    }

    /// Returns `true` if `key` exists and holds a defined value.
    #[must_use]
    pub fn has_defined(&self, key: &str) -> bool {
        self.get(key).is_some_and(ModelNode::is_defined)
    }

    /// Removes `key`, preserving the order of the remaining keys.
    pub fn remove(&mut self, key: &str) -> Option<ModelNode> {
        match self {
            Self::Object(map) => map.shift_remove(key),
            _ => None,
        }
    }

    /// Appends to a list node. An undefined node becomes an empty list first.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::TypeMismatch` if this node is not a list.
    pub fn push(&mut self, value: impl Into<ModelNode>) -> Result<(), ModelError> {
        if !self.is_defined() {
            *self = Self::List(Vec::new());
        }
        match self {
            Self::List(items) => {
                items.push(value.into());
                Ok(())
            }
            other => Err(ModelError::TypeMismatch {
                expected: ModelType::List,
                actual: other.model_type(),
            }),
        }
    }

    /// Returns the keys of an object node in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.as_object()
            .into_iter()
            .flat_map(|map| map.keys().map(String::as_str))
    }

    // -- typed accessors --------------------------------------------------

    /// # Errors
    ///
    /// Returns `ModelError::TypeMismatch` unless this is a string node.
    pub fn as_str(&self) -> Result<&str, ModelError> {
        match self {
            Self::String(s) => Ok(s),
            other => Err(other.mismatch(ModelType::String)),
        }
    }

    /// # Errors
    ///
    /// Returns `ModelError::TypeMismatch` unless this is a boolean node.
    pub fn as_bool(&self) -> Result<bool, ModelError> {
        match self {
            Self::Bool(b) => Ok(*b),
            other => Err(other.mismatch(ModelType::Bool)),
        }
    }

    /// # Errors
    ///
    /// Returns `ModelError::TypeMismatch` unless this is an integer node.
    pub fn as_i64(&self) -> Result<i64, ModelError> {
        match self {
            Self::Int(i) => Ok(*i),
            other => Err(other.mismatch(ModelType::Int)),
        }
    }

    /// # Errors
    ///
    /// Returns `ModelError::TypeMismatch` unless this is a list node.
    pub fn as_list(&self) -> Result<&[ModelNode], ModelError> {
        match self {
            Self::List(items) => Ok(items),
            other => Err(other.mismatch(ModelType::List)),
        }
    }

    /// Returns the object map, or `None` for any other node type.
    #[must_use]
    pub fn as_object(&self) -> Option<&IndexMap<String, ModelNode>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Reads this node as a `name -> value` property.
    ///
    /// Single-key objects are accepted too, since that is how a property
    /// arrives over JSON.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::TypeMismatch` for any other shape.
    pub fn as_property(&self) -> Result<(&str, &ModelNode), ModelError> {
        match self {
            Self::Property(name, value) => Ok((name, value)),
            Self::Object(map) if map.len() == 1 => map
                .first()
                .map(|(name, value)| (name.as_str(), value))
                .ok_or_else(|| self.mismatch(ModelType::Property)),
            other => Err(other.mismatch(ModelType::Property)),
        }
    }

    fn mismatch(&self, expected: ModelType) -> ModelError {
        ModelError::TypeMismatch {
            expected,
            actual: self.model_type(),
        }
    }

    // -- tree navigation ---------------------------------------------------

    /// Walks `address` from this node. Each element `key=value` descends into
    /// `self[key][value]`.
    #[must_use]
    pub fn navigate(&self, address: &PathAddress) -> Option<&ModelNode> {
        address.iter().try_fold(self, |node, element| {
            node.get(&element.key)?.get(&element.value)
        })
    }

    /// Mutable variant of [`navigate`](Self::navigate). Never creates nodes.
    pub fn navigate_mut(&mut self, address: &PathAddress) -> Option<&mut ModelNode> {
        let mut node = self;
        for element in address.iter() {
            let Self::Object(children) = node else {
                return None;
            };
            let Some(Self::Object(resources)) = children.get_mut(&element.key) else {
                return None;
            };
            node = resources.get_mut(&element.value)?;
        }
        Some(node)
    }

    /// Creates the resource at `address` (and any missing parents) as an empty
    /// object, returning it. An existing resource is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::TypeMismatch` if a node along the way is a
    /// non-object value.
    pub fn create_resource(&mut self, address: &PathAddress) -> Result<&mut ModelNode, ModelError> {
        let mut node = self;
        for element in address.iter() {
            node = node.get_mut(&element.key)?.get_mut(&element.value)?;
        }
        if !node.is_defined() {
            node.set_empty_object();
        }
        Ok(node)
    }

    // -- JSON --------------------------------------------------------------

    /// Renders this node as JSON. Properties become single-key objects and
    /// undefined nodes become `null`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Undefined => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Double(d) => serde_json::Number::from_f64(*d).map_or(Value::Null, Value::Number),
            Self::String(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(ModelNode::to_json).collect()),
            Self::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Property(name, value) => {
                let mut map = serde_json::Map::new();
                map.insert(name.clone(), value.to_json());
                Value::Object(map)
            }
        }
    }
}

impl fmt::Display for ModelNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Bare strings read better in failure messages than quoted JSON.
            Self::String(s) => f.write_str(s),
            Self::Undefined => f.write_str("undefined"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<serde_json::Value> for ModelNode {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Undefined,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for ModelNode {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ModelNode {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ModelNode {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for ModelNode {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ModelNode {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<ModelNode>> for ModelNode {
    fn from(value: Vec<ModelNode>) -> Self {
        Self::List(value)
    }
}

impl From<IndexMap<String, ModelNode>> for ModelNode {
    fn from(value: IndexMap<String, ModelNode>) -> Self {
        Self::Object(value)
    }
}

impl Serialize for ModelNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ModelNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
