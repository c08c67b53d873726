//! Checks an ExternalService spec must pass before anything is synthesized

use crate::{CoreError, Result};
use egress_api::ExternalServiceSpec;
use std::collections::HashSet;
use std::net::Ipv4Addr;

/// Reject specs that would render an ambiguous or unusable proxy config.
///
/// Duplicate (protocol, port) entries would produce clusters and listeners
/// with the same name, which Envoy refuses to load. A spec without ports
/// would leave the NetworkPolicy rule without a port list, which admits
/// every port of the gateway, the admin listener included.
pub fn validate(spec: &ExternalServiceSpec) -> Result<()> {
    if spec.ports.is_empty() {
        return Err(CoreError::InvalidSpec(
            "at least one port is required".to_string(),
        ));
    }

    if spec.ip_override.is_empty() && spec.dns_name.trim().is_empty() {
        return Err(CoreError::InvalidSpec(
            "dnsName is required when ipOverride is empty".to_string(),
        ));
    }

    // Clusters resolve V4_ONLY, so overrides must be IPv4 as well
    for ip in &spec.ip_override {
        if ip.parse::<Ipv4Addr>().is_err() {
            return Err(CoreError::InvalidSpec(format!(
                "ipOverride entry {:?} is not an IPv4 address",
                ip
            )));
        }
    }

    let mut seen = HashSet::new();
    for entry in &spec.ports {
        if entry.port == 0 {
            return Err(CoreError::InvalidSpec("port 0 is not allowed".to_string()));
        }
        if !seen.insert((entry.protocol, entry.port)) {
            return Err(CoreError::DuplicatePort {
                protocol: entry.protocol,
                port: entry.port,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use egress_api::{ExternalServicePort, Protocol};

    fn spec(ports: Vec<ExternalServicePort>) -> ExternalServiceSpec {
        ExternalServiceSpec {
            dns_name: "bar.example.com".to_string(),
            ip_override: Vec::new(),
            ports,
        }
    }

    #[test]
    fn test_valid_spec() {
        let s = spec(vec![ExternalServicePort::tcp(443), ExternalServicePort::udp(443)]);
        assert!(validate(&s).is_ok());
    }

    #[test]
    fn test_duplicate_port_rejected() {
        let s = spec(vec![ExternalServicePort::tcp(443), ExternalServicePort::tcp(443)]);
        match validate(&s) {
            Err(CoreError::DuplicatePort { protocol, port }) => {
                assert_eq!(protocol, Protocol::Tcp);
                assert_eq!(port, 443);
            }
            other => panic!("expected DuplicatePort, got {:?}", other),
        }
    }

    #[test]
    fn test_port_zero_rejected() {
        let s = spec(vec![ExternalServicePort::udp(0)]);
        assert!(matches!(validate(&s), Err(CoreError::InvalidSpec(_))));
    }

    #[test]
    fn test_bad_ip_override_rejected() {
        let mut s = spec(vec![ExternalServicePort::tcp(443)]);
        s.ip_override = vec!["10.0.0.1".to_string(), "not-an-ip".to_string()];
        assert!(matches!(validate(&s), Err(CoreError::InvalidSpec(_))));
    }

    #[test]
    fn test_ipv6_override_rejected() {
        let mut s = spec(vec![ExternalServicePort::tcp(443)]);
        s.ip_override = vec!["2001:db8::1".to_string()];
        assert!(matches!(validate(&s), Err(CoreError::InvalidSpec(_))));
    }

    #[test]
    fn test_empty_ports_rejected() {
        let s = spec(Vec::new());
        match validate(&s) {
            Err(CoreError::InvalidSpec(msg)) => assert!(msg.contains("port")),
            other => panic!("expected InvalidSpec, got {:?}", other),
        }
    }

    #[test]
    fn test_dns_name_optional_with_ip_override() {
        let mut s = spec(vec![ExternalServicePort::tcp(443)]);
        s.dns_name = String::new();
        assert!(matches!(validate(&s), Err(CoreError::InvalidSpec(_))));

        s.ip_override = vec!["10.0.0.1".to_string()];
        assert!(validate(&s).is_ok());
    }
}
