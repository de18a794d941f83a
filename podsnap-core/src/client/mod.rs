/*!
Access to the orchestration API.

This module defines the client abstraction (port) and its concrete
implementations (adapters). Lifecycle logic only ever talks to a
[`ResourceClient`], so it runs unchanged against a live cluster through
`kubectl` or against the in-memory store used in tests.
*/

pub mod kubectl;
pub mod memory;

use crate::resources::{Resource, ResourceKind};
use crate::{Result, SnapshotError};
use serde_json::Value;
use std::marker::PhantomData;

pub use kubectl::KubectlClient;
pub use memory::MemoryResourceClient;

/// Untyped access to namespaced resources
///
/// Bodies are plain JSON objects in the API's wire format. Implementations
/// must report a missing object as `Ok(None)` from `get` and `Ok(false)` from
/// `delete`, and a name collision on `create` as [`SnapshotError::Conflict`].
#[cfg_attr(test, mockall::automock)]
pub trait ResourceClient {
    /// Fetch a single object by name
    fn get(&self, kind: &ResourceKind, namespace: &str, name: &str) -> Result<Option<Value>>;

    /// List every object of `kind` in `namespace`
    fn list(&self, kind: &ResourceKind, namespace: &str) -> Result<Vec<Value>>;

    /// Create an object and return it as stored by the server
    fn create(&self, kind: &ResourceKind, namespace: &str, body: &Value) -> Result<Value>;

    /// Delete an object; returns whether it existed
    fn delete(&self, kind: &ResourceKind, namespace: &str, name: &str) -> Result<bool>;

    /// Current log output of a pod's default container
    fn pod_logs(&self, namespace: &str, pod: &str) -> Result<String>;
}

impl<C: ResourceClient + ?Sized> ResourceClient for &C {
    fn get(&self, kind: &ResourceKind, namespace: &str, name: &str) -> Result<Option<Value>> {
        (**self).get(kind, namespace, name)
    }

    fn list(&self, kind: &ResourceKind, namespace: &str) -> Result<Vec<Value>> {
        (**self).list(kind, namespace)
    }

    fn create(&self, kind: &ResourceKind, namespace: &str, body: &Value) -> Result<Value> {
        (**self).create(kind, namespace, body)
    }

    fn delete(&self, kind: &ResourceKind, namespace: &str, name: &str) -> Result<bool> {
        (**self).delete(kind, namespace, name)
    }

    fn pod_logs(&self, namespace: &str, pod: &str) -> Result<String> {
        (**self).pod_logs(namespace, pod)
    }
}

impl<C: ResourceClient + ?Sized> ResourceClient for std::sync::Arc<C> {
    fn get(&self, kind: &ResourceKind, namespace: &str, name: &str) -> Result<Option<Value>> {
        (**self).get(kind, namespace, name)
    }

    fn list(&self, kind: &ResourceKind, namespace: &str) -> Result<Vec<Value>> {
        (**self).list(kind, namespace)
    }

    fn create(&self, kind: &ResourceKind, namespace: &str, body: &Value) -> Result<Value> {
        (**self).create(kind, namespace, body)
    }

    fn delete(&self, kind: &ResourceKind, namespace: &str, name: &str) -> Result<bool> {
        (**self).delete(kind, namespace, name)
    }

    fn pod_logs(&self, namespace: &str, pod: &str) -> Result<String> {
        (**self).pod_logs(namespace, pod)
    }
}

/// Typed, namespace-bound view over a [`ResourceClient`]
pub struct Api<'a, K, C: ?Sized> {
    client: &'a C,
    namespace: &'a str,
    _kind: PhantomData<fn() -> K>,
}

impl<'a, K, C> Api<'a, K, C>
where
    K: Resource,
    C: ResourceClient + ?Sized,
{
    pub fn namespaced(client: &'a C, namespace: &'a str) -> Self {
        Self {
            client,
            namespace,
            _kind: PhantomData,
        }
    }

    pub fn namespace(&self) -> &str {
        self.namespace
    }

    /// Fetch an object, `None` if it does not exist
    pub fn get_opt(&self, name: &str) -> Result<Option<K>> {
        match self.client.get(&K::KIND, self.namespace, name)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Fetch an object, failing with `NotFound` if it does not exist
    pub fn get(&self, name: &str) -> Result<K> {
        self.get_opt(name)?
            .ok_or_else(|| SnapshotError::not_found(K::KIND.kind, name, self.namespace))
    }

    pub fn list(&self) -> Result<Vec<K>> {
        self.client
            .list(&K::KIND, self.namespace)?
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(SnapshotError::from))
            .collect()
    }

    /// Create an object; `apiVersion`, `kind` and the namespace are filled in
    pub fn create(&self, object: &K) -> Result<K> {
        let mut body = serde_json::to_value(object)?;
        let Value::Object(map) = &mut body else {
            return Err(SnapshotError::validation(format!(
                "{} must serialize to a JSON object",
                K::KIND
            )));
        };
        map.insert("apiVersion".into(), Value::String(K::KIND.api_version()));
        map.insert("kind".into(), Value::String(K::KIND.kind.to_string()));
        if let Some(Value::Object(metadata)) = map.get_mut("metadata") {
            metadata.insert("namespace".into(), Value::String(self.namespace.to_string()));
        }

        let created = self.client.create(&K::KIND, self.namespace, &body)?;
        Ok(serde_json::from_value(created)?)
    }

    /// Delete an object; returns whether it existed
    pub fn delete(&self, name: &str) -> Result<bool> {
        self.client.delete(&K::KIND, self.namespace, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{PodSnapshotManualTrigger, POD_SNAPSHOT_MANUAL_TRIGGER};
    use mockall::predicate::*;
    use serde_json::json;

    #[test]
    fn test_api_create_fills_type_meta() {
        let mut mock = MockResourceClient::new();
        mock.expect_create()
            .withf(|kind, namespace, body| {
                *kind == POD_SNAPSHOT_MANUAL_TRIGGER
                    && namespace == "team-a"
                    && body["apiVersion"] == "podsnapshot.gke.io/v1alpha1"
                    && body["kind"] == "PodSnapshotManualTrigger"
                    && body["metadata"]["namespace"] == "team-a"
            })
            .times(1)
            .returning(|_, _, body| Ok(body.clone()));

        let api: Api<PodSnapshotManualTrigger, _> = Api::namespaced(&mock, "team-a");
        let created = api
            .create(&PodSnapshotManualTrigger::new("t1", "elsewhere", "pod-a"))
            .unwrap();
        assert_eq!(created.metadata.namespace.as_deref(), Some("team-a"));
    }

    #[test]
    fn test_api_get_maps_missing_to_not_found() {
        let mut mock = MockResourceClient::new();
        mock.expect_get()
            .with(always(), eq("ns"), eq("missing"))
            .returning(|_, _, _| Ok(None));

        let api: Api<PodSnapshotManualTrigger, _> = Api::namespaced(&mock, "ns");
        assert!(api.get_opt("missing").unwrap().is_none());
        assert!(api.get("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_api_list_rejects_malformed_objects() {
        let mut mock = MockResourceClient::new();
        mock.expect_list()
            .returning(|_, _| Ok(vec![json!({"metadata": {"name": "t1"}})]));

        let api: Api<PodSnapshotManualTrigger, _> = Api::namespaced(&mock, "ns");
        assert!(matches!(api.list(), Err(SnapshotError::Json(_))));
    }
}
