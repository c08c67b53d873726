//! Egress gateway API types and CRDs for Kubernetes integration
//!
//! This library defines the custom resources for the egress controller:
//! - ExternalService: An external destination (DNS name or fixed IPs) that
//!   workloads may reach through a dedicated egress gateway

pub mod v1;

pub use v1::{ExternalService, ExternalServicePort, ExternalServiceSpec, Protocol};
