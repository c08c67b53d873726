use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// ExternalService describes one external destination that workloads in the
/// cluster are allowed to reach through an egress gateway
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "egress.monzo.com",
    version = "v1",
    kind = "ExternalService",
    plural = "externalservices",
    derive = "Default",
    printcolumn = r#"{"name":"DNS","type":"string","jsonPath":".spec.dnsName"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct ExternalServiceSpec {
    /// DNS name of the external destination
    pub dns_name: String,

    /// Optional: fixed IP addresses to use instead of resolving `dns_name`.
    /// When set, every port is routed to exactly these addresses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_override: Vec<String>,

    /// Ports and protocols allowed towards the destination
    #[serde(default)]
    pub ports: Vec<ExternalServicePort>,
}

/// A single allowed port on the external destination
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExternalServicePort {
    /// Port number (1-65535)
    pub port: u16,

    /// Protocol: TCP or UDP
    #[serde(default)]
    pub protocol: Protocol,
}

/// Transport protocol of an allowed port
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Protocol {
    #[default]
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
}

impl Protocol {
    /// Upper-case protocol name, as used by Kubernetes and Envoy
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ExternalServicePort {
    pub fn tcp(port: u16) -> Self {
        Self { port, protocol: Protocol::Tcp }
    }

    pub fn udp(port: u16) -> Self {
        Self { port, protocol: Protocol::Udp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_defaults_to_tcp() {
        let spec: ExternalServiceSpec = serde_yaml::from_str(
            r#"
dnsName: bar.example.com
ports:
  - port: 443
  - port: 53
    protocol: UDP
"#,
        )
        .unwrap();

        assert_eq!(spec.dns_name, "bar.example.com");
        assert!(spec.ip_override.is_empty());
        assert_eq!(
            spec.ports,
            vec![ExternalServicePort::tcp(443), ExternalServicePort::udp(53)]
        );
    }

    #[test]
    fn test_ip_override_round_trips_camel_case() {
        let spec = ExternalServiceSpec {
            dns_name: "bar.example.com".to_string(),
            ip_override: vec!["10.0.0.1".to_string()],
            ports: vec![ExternalServicePort::tcp(443)],
        };
        let json = serde_json::to_value(&spec).unwrap();

        assert_eq!(json["dnsName"], "bar.example.com");
        assert_eq!(json["ipOverride"][0], "10.0.0.1");
        assert_eq!(json["ports"][0]["protocol"], "TCP");
    }

    #[test]
    fn test_protocol_display() {
        assert_eq!(Protocol::Tcp.to_string(), "TCP");
        assert_eq!(Protocol::Udp.to_string(), "UDP");
    }
}
