//! One reconcile pass for an ExternalService

use crate::apply::{apply, Applied, ObjectStore};
use crate::bootstrap::{bootstrap, render};
use crate::config::ControllerConfig;
use crate::desired;
use crate::fingerprint::fingerprint;
use crate::validation::validate;
use crate::Result;
use egress_api::ExternalService;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::ResourceExt;
use tracing::{debug, info};

/// Result of a successful pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub admin_port: u16,
    pub config_hash: String,
    pub config_map: Applied,
    pub network_policy: Applied,
}

/// Converge the gateway ConfigMap and NetworkPolicy of `es`.
///
/// Everything is computed before the first write, so an invalid spec or an
/// exhausted admin port range leaves the cluster untouched. The two objects
/// are applied independently: a failure on the NetworkPolicy does not roll
/// back the ConfigMap, the next pass converges both.
pub async fn reconcile<S>(es: &ExternalService, cfg: &ControllerConfig, store: &S) -> Result<Outcome>
where
    S: ObjectStore<ConfigMap> + ObjectStore<NetworkPolicy> + ?Sized,
{
    let name = es.name_any();
    validate(&es.spec)?;

    let config = bootstrap(&name, &es.spec)?;
    let admin_port = config.admin.address.socket_address.port_value;
    let envoy_config = render(&config)?;
    let config_hash = fingerprint(&envoy_config);

    let config_map = desired::config_map(es, cfg, &envoy_config, &config_hash)?;
    let network_policy = desired::network_policy(es, cfg)?;

    info!(
        "Reconciling ExternalService {} (admin port {}, config hash {})",
        name, admin_port, config_hash
    );

    let config_map = apply(store, &config_map).await?;
    debug!("ConfigMap for {}: {:?}", name, config_map);
    let network_policy = apply(store, &network_policy).await?;
    debug!("NetworkPolicy for {}: {:?}", name, network_policy);

    Ok(Outcome {
        admin_port,
        config_hash,
        config_map,
        network_policy,
    })
}
