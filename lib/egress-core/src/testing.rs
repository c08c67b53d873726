//! In-memory object store for exercising reconcile logic without a cluster

use crate::apply::ObjectStore;
use async_trait::async_trait;
use kube::error::ErrorResponse;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// A write the store received
#[derive(Clone, Debug, PartialEq)]
pub enum Write {
    Create { kind: String, name: String },
    Patch { kind: String, name: String, patch: Value },
}

type Key = (String, String, String);

/// Stores objects as JSON keyed by (kind, namespace, name)
#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<BTreeMap<Key, Value>>,
    writes: Mutex<Vec<Write>>,
    get_error: Mutex<Option<u16>>,
    patch_not_found: Mutex<bool>,
}

fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("fake store: {}", reason),
        reason: reason.to_string(),
        code,
    })
}

fn key<K: Resource<DynamicType = ()>>(namespace: &str, name: &str) -> Key {
    (K::kind(&()).to_string(), namespace.to_string(), name.to_string())
}

fn bump_resource_version(value: &mut Value) {
    let next = value["metadata"]["resourceVersion"]
        .as_str()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    value["metadata"]["resourceVersion"] = json!(next.to_string());
}

impl FakeStore {
    /// Seed a live object, bypassing the write log
    pub fn insert<K: Resource<DynamicType = ()> + Serialize>(&self, object: &K) {
        let meta = object.meta();
        let mut value = serde_json::to_value(object).unwrap();
        bump_resource_version(&mut value);
        self.objects.lock().unwrap().insert(
            key::<K>(
                meta.namespace.as_deref().unwrap_or_default(),
                meta.name.as_deref().unwrap_or_default(),
            ),
            value,
        );
    }

    pub fn object<K: Resource<DynamicType = ()> + DeserializeOwned>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&key::<K>(namespace, name))
            .map(|v| serde_json::from_value(v.clone()).unwrap())
    }

    pub fn remove<K: Resource<DynamicType = ()>>(&self, namespace: &str, name: &str) {
        self.objects.lock().unwrap().remove(&key::<K>(namespace, name));
    }

    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }

    /// Answer every get with an API error of this status code
    pub fn fail_gets_with(&self, code: u16) {
        *self.get_error.lock().unwrap() = Some(code);
    }

    /// Pretend objects vanish between get and patch
    pub fn fail_patches_with_not_found(&self) {
        *self.patch_not_found.lock().unwrap() = true;
    }
}

#[async_trait]
impl<K> ObjectStore<K> for FakeStore
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> kube::Result<Option<K>> {
        if let Some(code) = *self.get_error.lock().unwrap() {
            return Err(api_error(code, "InternalError"));
        }
        Ok(self.object(namespace, name))
    }

    async fn create(&self, namespace: &str, object: &K) -> kube::Result<K> {
        let key = key::<K>(namespace, &object.meta().name.clone().unwrap_or_default());
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(api_error(409, "AlreadyExists"));
        }

        let mut value = serde_json::to_value(object).unwrap();
        bump_resource_version(&mut value);
        objects.insert(key.clone(), value.clone());
        self.writes.lock().unwrap().push(Write::Create {
            kind: key.0,
            name: key.2,
        });
        Ok(serde_json::from_value(value).unwrap())
    }

    async fn patch(&self, namespace: &str, name: &str, patch: &Value) -> kube::Result<K> {
        let key = key::<K>(namespace, name);
        self.writes.lock().unwrap().push(Write::Patch {
            kind: key.0.clone(),
            name: name.to_string(),
            patch: patch.clone(),
        });

        if *self.patch_not_found.lock().unwrap() {
            return Err(api_error(404, "NotFound"));
        }
        let mut objects = self.objects.lock().unwrap();
        let value = objects.get_mut(&key).ok_or_else(|| api_error(404, "NotFound"))?;
        json_patch::merge(value, patch);
        bump_resource_version(value);
        Ok(serde_json::from_value(value.clone()).unwrap())
    }
}
