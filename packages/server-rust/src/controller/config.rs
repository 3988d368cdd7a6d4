//! Controller configuration.

/// Settings for a [`ModelController`](super::ModelController) and its
/// operation pipeline.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Identifier of this node, attached to operation spans.
    pub node_id: String,
    /// Maximum number of root operations admitted at once: the one running
    /// plus those queued for the model. Excess operations are rejected with
    /// `ControllerError::Overloaded`.
    pub max_concurrent_operations: u32,
    /// When `false`, operations only touch the configuration model and
    /// runtime effects complete immediately.
    pub runtime_effects: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            node_id: String::from("standalone"),
            max_concurrent_operations: 64,
            runtime_effects: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_runs_runtime_effects() {
        let config = ControllerConfig::default();
        assert_eq!(config.node_id, "standalone");
        assert_eq!(config.max_concurrent_operations, 64);
        assert!(config.runtime_effects);
    }
}
