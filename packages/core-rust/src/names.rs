//! Well-known operation, parameter, attribute and response field names.

// Operation envelope.
pub const OPERATION: &str = "operation";
pub const ADDRESS: &str = "address";

// Response fields.
pub const OUTCOME: &str = "outcome";
pub const RESULT: &str = "result";
pub const FAILURE_DESCRIPTION: &str = "failure-description";
pub const ROLLED_BACK: &str = "rolled-back";
pub const COMPENSATING_OPERATION: &str = "compensating-operation";

// Outcome values.
pub const SUCCESS: &str = "success";
pub const FAILED: &str = "failed";
pub const CANCELLED: &str = "cancelled";

// Operation names.
pub const COMPOSITE: &str = "composite";
pub const ADD_NAMESPACE: &str = "add-namespace";
pub const REMOVE_NAMESPACE: &str = "remove-namespace";
pub const DEPLOY: &str = "deploy";
pub const UNDEPLOY: &str = "undeploy";
pub const READ_RESOURCE: &str = "read-resource";

// Parameters and attributes.
pub const STEPS: &str = "steps";
pub const NAMESPACE: &str = "namespace";
pub const NAMESPACES: &str = "namespaces";
pub const DEPLOYMENT: &str = "deployment";
pub const NAME: &str = "name";
pub const ENABLED: &str = "enabled";
/// `undeploy` parameter: remove the `enabled` attribute instead of writing
/// `false`.
pub const CLEAR_ENABLED: &str = "clear-enabled";
/// `remove-namespace` parameter: also drop `namespaces` once it is empty.
pub const PRUNE_EMPTY: &str = "prune-empty";
