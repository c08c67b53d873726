use egress_api::Protocol;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("No administrative port available in {start}..{end}")]
    AdminPortExhausted { start: u16, end: u16 },

    #[error("Invalid external service: {0}")]
    InvalidSpec(String),

    #[error("Duplicate port entry: {protocol}/{port}")]
    DuplicatePort { protocol: Protocol, port: u16 },

    #[error("Owner is missing the name or uid required for an owner reference")]
    MissingOwnerMetadata,

    #[error("{kind} {name} is already controlled by {owner_kind} {owner}")]
    AlreadyOwned {
        kind: String,
        name: String,
        owner_kind: String,
        owner: String,
    },

    #[error("Kubernetes error: {0}")]
    KubernetesError(#[from] kube::error::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_yaml::Error),

    #[error("JSON encoding error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CoreError {
    /// Whether retrying the same spec can succeed without it being edited
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::KubernetesError(_))
    }
}
