/// API version v1 for egress CRDs

pub mod external_service;

pub use external_service::{ExternalService, ExternalServicePort, ExternalServiceSpec, Protocol};

/// API group for egress resources
pub const API_GROUP: &str = "egress.monzo.com";
/// API version for egress resources
pub const API_VERSION: &str = "v1";
