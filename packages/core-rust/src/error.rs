use crate::node::ModelType;

/// Errors raised while reading or reshaping configuration tree values.
///
/// These are structural errors: the value under inspection does not have the
/// shape the caller asked for. The server layer converts them into
/// validation failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("expected a value of type {expected} but found {actual}")]
    TypeMismatch {
        expected: ModelType,
        actual: ModelType,
    },
    #[error("required key '{key}' is not defined")]
    MissingKey { key: String },
    #[error("invalid address '{input}': {reason}")]
    InvalidAddress { input: String, reason: &'static str },
}
