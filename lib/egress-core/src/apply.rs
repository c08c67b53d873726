//! Idempotent create-or-patch of derived objects against live cluster state

use crate::{CoreError, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::{debug, info};

/// Get/create/patch primitives against the cluster object store
#[async_trait]
pub trait ObjectStore<K>: Send + Sync {
    /// Fetch an object, `None` if it does not exist
    async fn get(&self, namespace: &str, name: &str) -> kube::Result<Option<K>>;

    async fn create(&self, namespace: &str, object: &K) -> kube::Result<K>;

    /// Apply a JSON merge patch
    async fn patch(&self, namespace: &str, name: &str, patch: &Value) -> kube::Result<K>;
}

/// [`ObjectStore`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    field_manager: String,
}

impl KubeStore {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }
}

#[async_trait]
impl<K> ObjectStore<K> for KubeStore
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> kube::Result<Option<K>> {
        Api::<K>::namespaced(self.client.clone(), namespace)
            .get_opt(name)
            .await
    }

    async fn create(&self, namespace: &str, object: &K) -> kube::Result<K> {
        let params = PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        Api::<K>::namespaced(self.client.clone(), namespace)
            .create(&params, object)
            .await
    }

    async fn patch(&self, namespace: &str, name: &str, patch: &Value) -> kube::Result<K> {
        let params = PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        Api::<K>::namespaced(self.client.clone(), namespace)
            .patch(name, &params, &Patch::Merge(patch))
            .await
    }
}

/// A derived object whose payload this controller fully owns.
///
/// Metadata is merged with whatever is live; the payload is replaced.
pub trait Artifact: Resource<DynamicType = ()> + Clone + Serialize + Send + Sync {
    fn replace_payload(&mut self, desired: &Self);
}

impl Artifact for ConfigMap {
    fn replace_payload(&mut self, desired: &Self) {
        self.data = desired.data.clone();
        self.binary_data = desired.binary_data.clone();
    }
}

impl Artifact for NetworkPolicy {
    fn replace_payload(&mut self, desired: &Self) {
        self.spec = desired.spec.clone();
    }
}

/// What [`apply`] did to the live object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    Created,
    Patched,
    /// Live object already matched
    Unchanged,
    /// Deleted by someone else between get and patch; the next pass
    /// recreates it
    Gone,
}

/// Converge the live object identified by `desired`'s namespace and name
/// onto `desired`.
///
/// Store errors are returned as-is, except a 404 on the patch itself. A live
/// object controlled by some other owner is left alone and reported as
/// [`CoreError::AlreadyOwned`].
pub async fn apply<K, S>(store: &S, desired: &K) -> Result<Applied>
where
    K: Artifact,
    S: ObjectStore<K> + ?Sized,
{
    let kind = K::kind(&());
    let name = desired.name_any();
    let namespace = desired.namespace().unwrap_or_default();

    let live = match store.get(&namespace, &name).await? {
        Some(live) => live,
        None => {
            store.create(&namespace, desired).await?;
            info!("Created {} {}/{}", kind, namespace, name);
            return Ok(Applied::Created);
        }
    };

    let updated = updated_from(&live, desired)?;
    let patch = match merge_diff(&serde_json::to_value(&live)?, &serde_json::to_value(&updated)?) {
        Some(patch) => patch,
        None => {
            debug!("{} {}/{} is up to date", kind, namespace, name);
            return Ok(Applied::Unchanged);
        }
    };

    debug!("Patching {} {}/{}: {}", kind, namespace, name, patch);
    match store.patch(&namespace, &name, &patch).await {
        Ok(_) => {
            info!("Patched {} {}/{}", kind, namespace, name);
            Ok(Applied::Patched)
        }
        Err(kube::Error::Api(e)) if e.code == 404 => {
            debug!("{} {}/{} deleted before patch", kind, namespace, name);
            Ok(Applied::Gone)
        }
        Err(e) => Err(e.into()),
    }
}

/// Live object with desired labels, annotations, owners and payload
fn updated_from<K: Artifact>(live: &K, desired: &K) -> Result<K> {
    let wanted = desired.meta();
    if let Some(other) = foreign_controller(live.owner_references(), wanted.owner_references.as_ref()) {
        return Err(CoreError::AlreadyOwned {
            kind: K::kind(&()).to_string(),
            name: live.name_any(),
            owner_kind: other.kind.clone(),
            owner: other.name.clone(),
        });
    }

    let mut updated = live.clone();
    let meta = updated.meta_mut();

    merge_map(&mut meta.labels, wanted.labels.as_ref());
    merge_map(&mut meta.annotations, wanted.annotations.as_ref());
    ensure_owners(&mut meta.owner_references, wanted.owner_references.as_ref());

    updated.replace_payload(desired);
    Ok(updated)
}

/// Live controller reference that none of the desired owners accounts for.
///
/// The API server allows one controller per object, so adding ours next to
/// it would be rejected on every pass.
fn foreign_controller<'a>(
    live: &'a [OwnerReference],
    desired: Option<&Vec<OwnerReference>>,
) -> Option<&'a OwnerReference> {
    let desired = desired.map(Vec::as_slice).unwrap_or_default();
    if !desired.iter().any(|o| o.controller == Some(true)) {
        return None;
    }
    live.iter()
        .filter(|o| o.controller == Some(true))
        .find(|o| !desired.iter().any(|d| d.uid == o.uid))
}

/// Copy `desired` entries into `target`, keeping keys only `target` has
fn merge_map(target: &mut Option<BTreeMap<String, String>>, desired: Option<&BTreeMap<String, String>>) {
    let desired = match desired {
        Some(desired) if !desired.is_empty() => desired,
        _ => return,
    };
    target
        .get_or_insert_with(BTreeMap::new)
        .extend(desired.iter().map(|(k, v)| (k.clone(), v.clone())));
}

fn ensure_owners(target: &mut Option<Vec<OwnerReference>>, desired: Option<&Vec<OwnerReference>>) {
    for owner in desired.into_iter().flatten() {
        let owners = target.get_or_insert_with(Vec::new);
        match owners.iter_mut().find(|o| o.uid == owner.uid) {
            Some(existing) => *existing = owner.clone(),
            None => owners.push(owner.clone()),
        }
    }
}

/// JSON merge patch (RFC 7386) turning `from` into `to`, `None` if equal.
///
/// Objects are diffed key by key; any other differing value, arrays
/// included, is replaced wholesale.
pub fn merge_diff(from: &Value, to: &Value) -> Option<Value> {
    match (from, to) {
        (Value::Object(from), Value::Object(to)) => {
            let mut patch = Map::new();
            for (key, old) in from {
                match to.get(key) {
                    Some(new) => {
                        if let Some(diff) = merge_diff(old, new) {
                            patch.insert(key.clone(), diff);
                        }
                    }
                    None => {
                        patch.insert(key.clone(), Value::Null);
                    }
                }
            }
            for (key, new) in to {
                if !from.contains_key(key) {
                    patch.insert(key.clone(), new.clone());
                }
            }
            if patch.is_empty() {
                None
            } else {
                Some(Value::Object(patch))
            }
        }
        (from, to) if from == to => None,
        (_, to) => Some(to.clone()),
    }
}
