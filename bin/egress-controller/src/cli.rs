use clap::{Parser, ValueEnum};
use egress_core::ControllerConfig;
use std::collections::BTreeMap;
use std::time::Duration;

/// Watch ExternalServices and maintain their egress gateway
/// ConfigMaps and NetworkPolicies
#[derive(Debug, Parser)]
#[clap(version, about)]
pub struct Args {
    /// Tracing filter directives (e.g. "info,egress_core=debug")
    #[clap(long, env = "EGRESS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[clap(long, env = "EGRESS_LOG_FORMAT", value_enum, default_value = "plain")]
    pub log_format: LogFormat,

    /// Namespace where gateway objects are created
    #[clap(long, short = 'n', env = "EGRESS_NAMESPACE", default_value = "egress-operator-system")]
    pub namespace: String,

    #[clap(long, env = "EGRESS_FIELD_MANAGER", default_value = "egress-controller")]
    pub field_manager: String,

    /// Namespace labels (key=value, comma separated) clients must carry to
    /// reach a gateway. Unset allows clients from every namespace.
    #[clap(
        long,
        env = "EGRESS_ALLOWED_NAMESPACE_LABELS",
        value_delimiter = ',',
        value_parser = parse_label
    )]
    pub allowed_namespace_labels: Vec<(String, String)>,

    /// Seconds between resyncs of a healthy ExternalService
    #[clap(long, env = "EGRESS_REQUEUE_SECONDS", default_value = "300")]
    pub requeue_seconds: u64,

    /// Seconds before retrying a failed reconcile
    #[clap(long, env = "EGRESS_ERROR_REQUEUE_SECONDS", default_value = "60")]
    pub error_requeue_seconds: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Plain,
    Json,
}

fn parse_label(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got {:?}", s)),
    }
}

impl Args {
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            namespace: self.namespace.clone(),
            field_manager: self.field_manager.clone(),
            allowed_namespace_labels: self
                .allowed_namespace_labels
                .iter()
                .cloned()
                .collect::<BTreeMap<_, _>>(),
            requeue_interval: Duration::from_secs(self.requeue_seconds),
            error_requeue_interval: Duration::from_secs(self.error_requeue_seconds),
        }
    }
}
