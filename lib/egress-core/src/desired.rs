//! Desired ConfigMap and NetworkPolicy for an ExternalService

use crate::config::ControllerConfig;
use crate::{CoreError, Result};
use egress_api::ExternalService;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPeer, NetworkPolicyPort,
    NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// ConfigMap key holding the rendered Envoy bootstrap
pub const ENVOY_CONFIG_KEY: &str = "envoy.yaml";

pub const APP_LABEL: &str = "app";
pub const APP_NAME: &str = "egress-gateway";
/// Label identifying which ExternalService a gateway object belongs to
pub const GATEWAY_LABEL: &str = "egress.monzo.com/gateway";
/// Label a client pod must carry to be let through to a gateway
pub const ALLOWED_GATEWAY_LABEL: &str = "egress.monzo.com/allowed-gateway";
pub const DNS_NAME_ANNOTATION: &str = "egress.monzo.com/dns-name";
/// Fingerprint of the rendered proxy configuration
pub const CONFIG_HASH_ANNOTATION: &str = "egress.monzo.com/config-hash";

pub fn labels(es: &ExternalService) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_LABEL.to_string(), APP_NAME.to_string()),
        (GATEWAY_LABEL.to_string(), es.name_any()),
    ])
}

/// Labels selecting the gateway pods of an ExternalService
pub fn labels_to_select(es: &ExternalService) -> BTreeMap<String, String> {
    BTreeMap::from([(GATEWAY_LABEL.to_string(), es.name_any())])
}

pub fn annotations(es: &ExternalService) -> BTreeMap<String, String> {
    BTreeMap::from([(DNS_NAME_ANNOTATION.to_string(), es.spec.dns_name.clone())])
}

/// Controller reference that lets the garbage collector remove derived
/// objects together with the ExternalService
pub fn owner_reference(es: &ExternalService) -> Result<OwnerReference> {
    es.controller_owner_ref(&())
        .ok_or(CoreError::MissingOwnerMetadata)
}

fn object_meta(
    es: &ExternalService,
    cfg: &ControllerConfig,
    annotations: Option<BTreeMap<String, String>>,
) -> Result<ObjectMeta> {
    Ok(ObjectMeta {
        name: Some(es.name_any()),
        namespace: Some(cfg.namespace.clone()),
        labels: Some(labels(es)),
        annotations,
        owner_references: Some(vec![owner_reference(es)?]),
        ..Default::default()
    })
}

/// ConfigMap carrying the rendered proxy configuration and its fingerprint
pub fn config_map(
    es: &ExternalService,
    cfg: &ControllerConfig,
    envoy_config: &str,
    config_hash: &str,
) -> Result<ConfigMap> {
    let mut annotations = annotations(es);
    annotations.insert(CONFIG_HASH_ANNOTATION.to_string(), config_hash.to_string());

    Ok(ConfigMap {
        metadata: object_meta(es, cfg, Some(annotations))?,
        data: Some(BTreeMap::from([(
            ENVOY_CONFIG_KEY.to_string(),
            envoy_config.to_string(),
        )])),
        ..Default::default()
    })
}

/// NetworkPolicy admitting traffic to the gateway pods only from pods
/// labelled `egress.monzo.com/allowed-gateway=<name>`, on the declared ports
pub fn network_policy(es: &ExternalService, cfg: &ControllerConfig) -> Result<NetworkPolicy> {
    let ports = es
        .spec
        .ports
        .iter()
        .map(|p| NetworkPolicyPort {
            port: Some(IntOrString::Int(i32::from(p.port))),
            protocol: Some(p.protocol.to_string()),
            ..Default::default()
        })
        .collect();

    let namespace_selector = if cfg.allowed_namespace_labels.is_empty() {
        // Empty selector: clients in every namespace
        LabelSelector::default()
    } else {
        LabelSelector {
            match_labels: Some(cfg.allowed_namespace_labels.clone()),
            ..Default::default()
        }
    };

    Ok(NetworkPolicy {
        metadata: object_meta(es, cfg, None)?,
        spec: Some(NetworkPolicySpec {
            pod_selector: LabelSelector {
                match_labels: Some(labels_to_select(es)),
                ..Default::default()
            },
            policy_types: Some(vec!["Ingress".to_string()]),
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(vec![NetworkPolicyPeer {
                    pod_selector: Some(LabelSelector {
                        match_labels: Some(BTreeMap::from([(
                            ALLOWED_GATEWAY_LABEL.to_string(),
                            es.name_any(),
                        )])),
                        ..Default::default()
                    }),
                    namespace_selector: Some(namespace_selector),
                    ..Default::default()
                }]),
                ports: Some(ports),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use egress_api::v1::{API_GROUP, API_VERSION};
    use egress_api::{ExternalServicePort, ExternalServiceSpec};

    pub(crate) fn external_service(name: &str, spec: ExternalServiceSpec) -> ExternalService {
        let mut es = ExternalService::new(name, spec);
        es.metadata.uid = Some(format!("{}-uid", name));
        es
    }

    fn foo() -> ExternalService {
        external_service(
            "foo",
            ExternalServiceSpec {
                dns_name: "bar.example.com".to_string(),
                ip_override: Vec::new(),
                ports: vec![ExternalServicePort::tcp(443), ExternalServicePort::udp(53)],
            },
        )
    }

    #[test]
    fn test_config_map_shape() {
        let cfg = ControllerConfig::new("egress");
        let cm = config_map(&foo(), &cfg, "static_resources: {}\n", "0badcafe").unwrap();

        assert_eq!(cm.metadata.name.as_deref(), Some("foo"));
        assert_eq!(cm.metadata.namespace.as_deref(), Some("egress"));
        assert_eq!(cm.labels().get(GATEWAY_LABEL).map(String::as_str), Some("foo"));
        assert_eq!(cm.labels().get(APP_LABEL).map(String::as_str), Some(APP_NAME));
        assert_eq!(
            cm.annotations().get(CONFIG_HASH_ANNOTATION).map(String::as_str),
            Some("0badcafe")
        );
        assert_eq!(
            cm.annotations().get(DNS_NAME_ANNOTATION).map(String::as_str),
            Some("bar.example.com")
        );
        assert_eq!(
            cm.data.unwrap().get(ENVOY_CONFIG_KEY).map(String::as_str),
            Some("static_resources: {}\n")
        );
    }

    #[test]
    fn test_owner_reference_is_controller() {
        let cfg = ControllerConfig::new("egress");
        let cm = config_map(&foo(), &cfg, "", "0").unwrap();
        let np = network_policy(&foo(), &cfg).unwrap();

        for owners in [cm.owner_references(), np.owner_references()] {
            assert_eq!(owners.len(), 1);
            let owner = &owners[0];
            assert_eq!(owner.kind, "ExternalService");
            assert_eq!(owner.api_version, format!("{}/{}", API_GROUP, API_VERSION));
            assert_eq!(owner.name, "foo");
            assert_eq!(owner.uid, "foo-uid");
            assert_eq!(owner.controller, Some(true));
        }
    }

    #[test]
    fn test_missing_uid_is_an_error() {
        let es = ExternalService::new("foo", ExternalServiceSpec::default());
        let cfg = ControllerConfig::default();
        assert!(matches!(
            network_policy(&es, &cfg),
            Err(CoreError::MissingOwnerMetadata)
        ));
    }

    #[test]
    fn test_network_policy_rules() {
        let cfg = ControllerConfig::new("egress");
        let np = network_policy(&foo(), &cfg).unwrap();
        let spec = np.spec.unwrap();

        assert_eq!(spec.pod_selector.match_labels, Some(labels_to_select(&foo())));

        let rules = spec.ingress.unwrap();
        assert_eq!(rules.len(), 1);

        let peer = &rules[0].from.as_ref().unwrap()[0];
        assert_eq!(
            peer.pod_selector.as_ref().unwrap().match_labels,
            Some(BTreeMap::from([(
                ALLOWED_GATEWAY_LABEL.to_string(),
                "foo".to_string()
            )]))
        );
        assert_eq!(peer.namespace_selector, Some(LabelSelector::default()));

        let ports: Vec<_> = rules[0]
            .ports
            .as_ref()
            .unwrap()
            .iter()
            .map(|p| (p.port.clone(), p.protocol.clone()))
            .collect();
        assert_eq!(
            ports,
            vec![
                (Some(IntOrString::Int(443)), Some("TCP".to_string())),
                (Some(IntOrString::Int(53)), Some("UDP".to_string())),
            ]
        );
    }

    #[test]
    fn test_network_policy_namespace_restriction() {
        let mut cfg = ControllerConfig::new("egress");
        cfg.allowed_namespace_labels =
            BTreeMap::from([("team".to_string(), "payments".to_string())]);
        let np = network_policy(&foo(), &cfg).unwrap();

        let rules = np.spec.unwrap().ingress.unwrap();
        let selector = rules[0].from.as_ref().unwrap()[0]
            .namespace_selector
            .clone()
            .unwrap();
        assert_eq!(selector.match_labels, Some(cfg.allowed_namespace_labels));
    }
}
