//! ExternalService controller for reconciling egress gateway objects

use egress_api::ExternalService;
use egress_core::desired::{APP_LABEL, APP_NAME, GATEWAY_LABEL};
use egress_core::{ControllerConfig, CoreError, KubeStore};
use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::{Api, Client, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{controller::Action, watcher, Controller};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
#[error("Reconciliation error: {0}")]
pub struct ReconcileError(#[from] CoreError);

/// State shared by every reconcile call
struct Context {
    store: KubeStore,
    config: Arc<ControllerConfig>,
}

pub struct ExternalServiceController {
    client: Client,
    config: Arc<ControllerConfig>,
}

impl ExternalServiceController {
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        info!(
            "Starting ExternalService reconciliation into namespace {}",
            self.config.namespace
        );

        let external_services: Api<ExternalService> = Api::all(self.client.clone());
        let config_maps: Api<ConfigMap> =
            Api::namespaced(self.client.clone(), &self.config.namespace);
        let network_policies: Api<NetworkPolicy> =
            Api::namespaced(self.client.clone(), &self.config.namespace);
        let gateway_objects = watcher::Config::default().labels(&format!("{}={}", APP_LABEL, APP_NAME));

        let ctx = Arc::new(Context {
            store: KubeStore::new(self.client.clone(), self.config.field_manager.clone()),
            config: self.config.clone(),
        });

        // Edits to derived objects re-trigger their ExternalService
        let mut stream = Controller::new(external_services, watcher::Config::default())
            .watches(config_maps, gateway_objects.clone(), owning_service::<ConfigMap>)
            .watches(network_policies, gateway_objects, owning_service::<NetworkPolicy>)
            .run(reconcile, error_policy, ctx)
            .boxed();

        while let Some(item) = stream.next().await {
            match item {
                Ok((obj, _)) => debug!("Reconciled ExternalService {}", obj.name),
                Err(e) => error!("Error in reconciliation stream: {}", e),
            }
        }

        Ok(())
    }
}

async fn reconcile(es: Arc<ExternalService>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let outcome = egress_core::reconcile(&es, &ctx.config, &ctx.store).await?;
    info!(
        "Reconciled ExternalService {}: configmap {:?}, networkpolicy {:?}",
        es.name_any(),
        outcome.config_map,
        outcome.network_policy
    );
    Ok(Action::requeue(ctx.config.requeue_interval))
}

fn error_policy(es: Arc<ExternalService>, err: &ReconcileError, ctx: Arc<Context>) -> Action {
    if err.0.is_transient() {
        error!("Error reconciling ExternalService {}: {}", es.name_any(), err);
    } else {
        error!(
            "ExternalService {} cannot be applied until it is changed: {}",
            es.name_any(),
            err
        );
    }
    Action::requeue(ctx.config.error_requeue_interval)
}

/// Map a derived object back to the ExternalService that produced it
fn owning_service<K: ResourceExt>(obj: K) -> Option<ObjectRef<ExternalService>> {
    obj.labels()
        .get(GATEWAY_LABEL)
        .map(|name| ObjectRef::new(name))
}
