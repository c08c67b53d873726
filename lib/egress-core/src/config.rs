//! Process-wide controller settings, fixed at startup

use std::collections::BTreeMap;
use std::time::Duration;

/// Settings shared by every reconcile pass
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Namespace where gateway ConfigMaps and NetworkPolicies are placed
    pub namespace: String,
    /// Field manager recorded on created and patched objects
    pub field_manager: String,
    /// Namespace labels a client must carry to reach a gateway.
    /// Empty means clients from any namespace are allowed.
    pub allowed_namespace_labels: BTreeMap<String, String>,
    /// Requeue delay after a successful pass
    pub requeue_interval: Duration,
    /// Requeue delay after a failed pass
    pub error_requeue_interval: Duration,
}

impl ControllerConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: "egress-operator-system".to_string(),
            field_manager: "egress-controller".to_string(),
            allowed_namespace_labels: BTreeMap::new(),
            requeue_interval: Duration::from_secs(300),
            error_requeue_interval: Duration::from_secs(60),
        }
    }
}
