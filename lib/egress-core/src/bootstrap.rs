//! Envoy bootstrap synthesis for an egress gateway
//!
//! The gateway proxy is configured entirely through static resources: one
//! cluster and one listener per allowed port, plus an admin endpoint. Every
//! type here serializes with a fixed field order so that the rendered YAML
//! is byte-identical for equal inputs.

use crate::admin_port::admin_port;
use crate::Result;
use egress_api::{ExternalServicePort, ExternalServiceSpec, Protocol};
use serde::Serialize;

/// Bind address for the admin endpoint and all listeners
pub const ALL_INTERFACES: &str = "0.0.0.0";
/// Sink for admin and TCP access logs
pub const STDOUT_PATH: &str = "/dev/stdout";
/// Upstream connect timeout for every cluster
pub const CONNECT_TIMEOUT: &str = "1s";
/// Access log line for TCP listeners
pub const ACCESS_LOG_FORMAT: &str = "[%START_TIME%] %BYTES_RECEIVED% %BYTES_SENT% %DURATION% \"%DOWNSTREAM_REMOTE_ADDRESS%\" \"%UPSTREAM_HOST%\"\n";

const FILE_ACCESS_LOG: &str = "envoy.access_loggers.file";
const TCP_PROXY_FILTER: &str = "envoy.filters.network.tcp_proxy";
const UDP_PROXY_FILTER: &str = "envoy.filters.udp_listener.udp_proxy";

/// Complete bootstrap handed to the gateway proxy
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Bootstrap {
    pub node: Node,
    pub admin: Admin,
    pub static_resources: StaticResources,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Node {
    pub id: String,
    pub cluster: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Admin {
    pub access_log: Vec<AccessLog>,
    pub address: Address,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StaticResources {
    pub listeners: Vec<Listener>,
    pub clusters: Vec<Cluster>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Address {
    pub socket_address: SocketAddress,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SocketAddress {
    pub address: String,
    pub port_value: u16,
    pub protocol: Protocol,
}

impl Address {
    fn socket(address: &str, port_value: u16, protocol: Protocol) -> Self {
        Self {
            socket_address: SocketAddress {
                address: address.to_string(),
                port_value,
                protocol,
            },
        }
    }
}

/// How a cluster finds its upstream hosts
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DiscoveryType {
    /// Resolve the DNS name on connect, round-robin across results
    #[serde(rename = "LOGICAL_DNS")]
    LogicalDns,
    /// Fixed list of IP addresses
    #[serde(rename = "STATIC")]
    Static,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LbPolicy {
    #[serde(rename = "ROUND_ROBIN")]
    RoundRobin,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DnsLookupFamily {
    #[serde(rename = "V4_ONLY")]
    V4Only,
}

/// Upstream target group for one allowed port
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Cluster {
    pub name: String,
    #[serde(rename = "type")]
    pub discovery: DiscoveryType,
    pub connect_timeout: String,
    pub lb_policy: LbPolicy,
    pub dns_lookup_family: DnsLookupFamily,
    pub load_assignment: LoadAssignment,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LoadAssignment {
    pub cluster_name: String,
    pub endpoints: Vec<LocalityEndpoints>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LocalityEndpoints {
    pub lb_endpoints: Vec<LbEndpoint>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LbEndpoint {
    pub endpoint: Endpoint,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Endpoint {
    pub address: Address,
}

#[cfg(test)]
impl Cluster {
    /// Upstream hosts, in configuration order
    pub(crate) fn hosts(&self) -> Vec<&SocketAddress> {
        self.load_assignment
            .endpoints
            .iter()
            .flat_map(|locality| locality.lb_endpoints.iter())
            .map(|lb| &lb.endpoint.address.socket_address)
            .collect()
    }
}

/// Bound endpoint for one allowed port.
///
/// TCP listeners carry a network filter chain, UDP listeners a listener
/// filter; only one of the two lists is ever populated.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Listener {
    pub name: String,
    pub address: Address,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filter_chains: Vec<FilterChain>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub listener_filters: Vec<Filter>,
}

#[cfg(test)]
impl Listener {
    /// All filters of the listener, whatever list they live in
    pub(crate) fn filters(&self) -> impl Iterator<Item = &Filter> {
        self.filter_chains
            .iter()
            .flat_map(|chain| chain.filters.iter())
            .chain(self.listener_filters.iter())
    }

    /// Access logs configured on any of the listener's filters
    pub(crate) fn access_logs(&self) -> Vec<&AccessLog> {
        self.filters()
            .filter_map(|filter| match &filter.typed_config {
                TypedConfig::TcpProxy { access_log, .. } => Some(access_log),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FilterChain {
    pub filters: Vec<Filter>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Filter {
    pub name: String,
    pub typed_config: TypedConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AccessLog {
    pub name: String,
    pub typed_config: TypedConfig,
}

impl AccessLog {
    fn stdout(log_format: Option<LogFormat>) -> Self {
        Self {
            name: FILE_ACCESS_LOG.to_string(),
            typed_config: TypedConfig::FileAccessLog {
                path: STDOUT_PATH.to_string(),
                log_format,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogFormat {
    pub text_format_source: DataSource,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DataSource {
    pub inline_string: String,
}

/// Extension configs, tagged with their protobuf type URL
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "@type")]
pub enum TypedConfig {
    #[serde(rename = "type.googleapis.com/envoy.extensions.filters.network.tcp_proxy.v3.TcpProxy")]
    TcpProxy {
        stat_prefix: String,
        cluster: String,
        access_log: Vec<AccessLog>,
    },
    #[serde(rename = "type.googleapis.com/envoy.extensions.filters.udp.udp_proxy.v3.UdpProxyConfig")]
    UdpProxy { stat_prefix: String, cluster: String },
    #[serde(rename = "type.googleapis.com/envoy.extensions.access_loggers.file.v3.FileAccessLog")]
    FileAccessLog {
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        log_format: Option<LogFormat>,
    },
}

/// Cluster and listener name for a port entry: `<owner>_<PROTOCOL>_<port>`
pub fn resource_name(owner: &str, port: &ExternalServicePort) -> String {
    format!("{}_{}_{}", owner, port.protocol, port.port)
}

/// Assemble the bootstrap for the external service `owner`.
///
/// Fails only when no admin port is available.
pub fn bootstrap(owner: &str, spec: &ExternalServiceSpec) -> Result<Bootstrap> {
    let admin = Admin {
        access_log: vec![AccessLog::stdout(None)],
        address: Address::socket(ALL_INTERFACES, admin_port(&spec.ports)?, Protocol::Tcp),
    };

    let mut static_resources = StaticResources {
        listeners: Vec::with_capacity(spec.ports.len()),
        clusters: Vec::with_capacity(spec.ports.len()),
    };
    for port in &spec.ports {
        let name = resource_name(owner, port);
        static_resources.clusters.push(cluster(&name, spec, port));
        static_resources.listeners.push(listener(&name, port));
    }

    Ok(Bootstrap {
        node: Node {
            id: owner.to_string(),
            cluster: owner.to_string(),
        },
        admin,
        static_resources,
    })
}

fn cluster(name: &str, spec: &ExternalServiceSpec, port: &ExternalServicePort) -> Cluster {
    // ipOverride switches every cluster to static hosts
    let (discovery, hosts): (_, Vec<&str>) = if spec.ip_override.is_empty() {
        (DiscoveryType::LogicalDns, vec![spec.dns_name.as_str()])
    } else {
        (
            DiscoveryType::Static,
            spec.ip_override.iter().map(String::as_str).collect(),
        )
    };

    let lb_endpoints = hosts
        .into_iter()
        .map(|host| LbEndpoint {
            endpoint: Endpoint {
                address: Address::socket(host, port.port, port.protocol),
            },
        })
        .collect();

    Cluster {
        name: name.to_string(),
        discovery,
        connect_timeout: CONNECT_TIMEOUT.to_string(),
        lb_policy: LbPolicy::RoundRobin,
        dns_lookup_family: DnsLookupFamily::V4Only,
        load_assignment: LoadAssignment {
            cluster_name: name.to_string(),
            endpoints: vec![LocalityEndpoints { lb_endpoints }],
        },
    }
}

fn listener(name: &str, port: &ExternalServicePort) -> Listener {
    let address = Address::socket(ALL_INTERFACES, port.port, port.protocol);

    match port.protocol {
        Protocol::Tcp => Listener {
            name: name.to_string(),
            address,
            filter_chains: vec![FilterChain {
                filters: vec![Filter {
                    name: TCP_PROXY_FILTER.to_string(),
                    typed_config: TypedConfig::TcpProxy {
                        stat_prefix: "tcp_proxy".to_string(),
                        cluster: name.to_string(),
                        access_log: vec![AccessLog::stdout(Some(LogFormat {
                            text_format_source: DataSource {
                                inline_string: ACCESS_LOG_FORMAT.to_string(),
                            },
                        }))],
                    },
                }],
            }],
            listener_filters: Vec::new(),
        },
        // udp_proxy has no access log support
        Protocol::Udp => Listener {
            name: name.to_string(),
            address,
            filter_chains: Vec::new(),
            listener_filters: vec![Filter {
                name: UDP_PROXY_FILTER.to_string(),
                typed_config: TypedConfig::UdpProxy {
                    stat_prefix: "udp_proxy".to_string(),
                    cluster: name.to_string(),
                },
            }],
        },
    }
}

/// Render a bootstrap to its canonical YAML text
pub fn render(bootstrap: &Bootstrap) -> Result<String> {
    Ok(serde_yaml::to_string(bootstrap)?)
}
