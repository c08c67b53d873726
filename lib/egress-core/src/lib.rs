//! Core egress gateway functionality
//!
//! This library provides:
//! - Envoy bootstrap synthesis for an ExternalService
//! - Administrative port allocation and config fingerprinting
//! - Desired ConfigMap/NetworkPolicy construction
//! - Idempotent reconciliation of those objects against the cluster

pub mod admin_port;
pub mod apply;
pub mod bootstrap;
pub mod config;
pub mod desired;
pub mod error;
pub mod fingerprint;
pub mod reconcile;
pub mod validation;

#[cfg(test)]
mod testing;

pub use apply::{apply, Applied, Artifact, KubeStore, ObjectStore};
pub use config::ControllerConfig;
pub use error::{CoreError, Result};
pub use reconcile::{reconcile, Outcome};
