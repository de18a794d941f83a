/*!
In-memory resource client.

Stores objects as JSON in a map keyed by kind, namespace and name. The server
side is mimicked where lifecycle logic depends on it: `uid` and
`creationTimestamp` are assigned on create, name collisions are rejected, and
status changes can be scripted to land after a number of reads so controller
progress can be simulated without a cluster.
*/

use super::ResourceClient;
use crate::resources::{Resource, ResourceKind, POD};
use crate::{Result, SnapshotError};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Operations that can be made to fail on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Get,
    List,
    Create,
    Delete,
}

type ObjectKey = (&'static str, String, String);

#[derive(Debug)]
struct ScriptedStatus {
    key: ObjectKey,
    reads_left: usize,
    status: Value,
}

#[derive(Debug)]
struct InjectedFailure {
    operation: Operation,
    plural: &'static str,
    name: Option<String>,
    message: String,
}

#[derive(Debug)]
struct MemoryState {
    objects: BTreeMap<ObjectKey, Value>,
    scripted: Vec<ScriptedStatus>,
    failures: Vec<InjectedFailure>,
    logs: BTreeMap<(String, String), String>,
    now: DateTime<Utc>,
    calls: BTreeMap<Operation, usize>,
}

/// Resource client backed by process memory
///
/// Cloning is not supported; share it by reference or through an `Arc`.
#[derive(Debug)]
pub struct MemoryResourceClient {
    state: Mutex<MemoryState>,
}

impl Default for MemoryResourceClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryResourceClient {
    pub fn new() -> Self {
        let epoch = Utc
            .with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self {
            state: Mutex::new(MemoryState {
                objects: BTreeMap::new(),
                scripted: Vec::new(),
                failures: Vec::new(),
                logs: BTreeMap::new(),
                now: epoch,
                calls: BTreeMap::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn key(kind: &ResourceKind, namespace: &str, name: &str) -> ObjectKey {
        (kind.plural, namespace.to_string(), name.to_string())
    }

    /// Timestamp the next created object will get
    pub fn now(&self) -> DateTime<Utc> {
        self.state().now
    }

    /// Set the store's notion of the current time
    pub fn set_now(&self, now: DateTime<Utc>) {
        self.state().now = now;
    }

    /// Move the store's notion of time forward
    pub fn advance(&self, seconds: i64) {
        let mut state = self.state();
        state.now += ChronoDuration::seconds(seconds);
    }

    /// Store an object as-is, filling in `uid`, `namespace` and
    /// `creationTimestamp` when absent. Replaces any existing object.
    pub fn insert(&self, kind: &ResourceKind, namespace: &str, mut object: Value) -> Result<()> {
        let mut state = self.state();
        let name = stamp_metadata(&mut object, kind, namespace, state.now)?;
        state.objects.insert(Self::key(kind, namespace, &name), object);
        Ok(())
    }

    /// Typed variant of [`insert`](Self::insert)
    pub fn insert_resource<K: Resource>(&self, namespace: &str, object: &K) -> Result<()> {
        self.insert(&K::KIND, namespace, serde_json::to_value(object)?)
    }

    /// Replace the `status` of a stored object
    pub fn set_status(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        status: Value,
    ) -> Result<()> {
        let mut state = self.state();
        let object = state
            .objects
            .get_mut(&Self::key(kind, namespace, name))
            .ok_or_else(|| SnapshotError::not_found(kind.kind, name, namespace))?;
        object["status"] = status;
        Ok(())
    }

    /// Apply `status` to the named object once it has been read `after_reads`
    /// more times through [`ResourceClient::get`]. The object may be created
    /// later than the schedule.
    pub fn schedule_status(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        after_reads: usize,
        status: Value,
    ) {
        self.state().scripted.push(ScriptedStatus {
            key: Self::key(kind, namespace, name),
            reads_left: after_reads,
            status,
        });
    }

    /// Make `operation` on `kind` fail with an API error, for one object or
    /// for all of them
    pub fn fail_on(
        &self,
        operation: Operation,
        kind: &ResourceKind,
        name: Option<&str>,
        message: impl Into<String>,
    ) {
        self.state().failures.push(InjectedFailure {
            operation,
            plural: kind.plural,
            name: name.map(str::to_string),
            message: message.into(),
        });
    }

    /// Remove every injected failure
    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    pub fn set_logs(&self, namespace: &str, pod: &str, logs: impl Into<String>) {
        self.state()
            .logs
            .insert((namespace.to_string(), pod.to_string()), logs.into());
    }

    pub fn contains(&self, kind: &ResourceKind, namespace: &str, name: &str) -> bool {
        self.state()
            .objects
            .contains_key(&Self::key(kind, namespace, name))
    }

    /// Names of stored objects of `kind` in `namespace`, sorted
    pub fn names(&self, kind: &ResourceKind, namespace: &str) -> Vec<String> {
        self.state()
            .objects
            .keys()
            .filter(|(plural, ns, _)| *plural == kind.plural && ns == namespace)
            .map(|(_, _, name)| name.clone())
            .collect()
    }

    /// Raw stored object
    pub fn object(&self, kind: &ResourceKind, namespace: &str, name: &str) -> Option<Value> {
        self.state()
            .objects
            .get(&Self::key(kind, namespace, name))
            .cloned()
    }

    /// Number of calls made for `operation` so far
    pub fn calls(&self, operation: Operation) -> usize {
        self.state().calls.get(&operation).copied().unwrap_or(0)
    }

    fn begin(
        state: &mut MemoryState,
        operation: Operation,
        kind: &ResourceKind,
        name: Option<&str>,
    ) -> Result<()> {
        *state.calls.entry(operation).or_insert(0) += 1;
        let failure = state.failures.iter().find(|f| {
            f.operation == operation
                && f.plural == kind.plural
                && (f.name.is_none() || f.name.as_deref() == name)
        });
        match failure {
            Some(f) => Err(SnapshotError::api(f.message.clone())),
            None => Ok(()),
        }
    }
}

fn stamp_metadata(
    object: &mut Value,
    kind: &ResourceKind,
    namespace: &str,
    now: DateTime<Utc>,
) -> Result<String> {
    let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) else {
        return Err(SnapshotError::validation(format!(
            "{kind} object has no metadata"
        )));
    };
    let name = metadata
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| SnapshotError::validation(format!("{kind} object has no name")))?
        .to_string();

    metadata.insert("namespace".into(), Value::String(namespace.to_string()));
    metadata
        .entry("uid")
        .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
    metadata
        .entry("creationTimestamp")
        .or_insert_with(|| Value::String(now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)));
    Ok(name)
}

impl ResourceClient for MemoryResourceClient {
    fn get(&self, kind: &ResourceKind, namespace: &str, name: &str) -> Result<Option<Value>> {
        let mut state = self.state();
        Self::begin(&mut state, Operation::Get, kind, Some(name))?;

        let key = Self::key(kind, namespace, name);
        let mut due = Vec::new();
        state.scripted.retain_mut(|scripted| {
            if scripted.key != key {
                return true;
            }
            if scripted.reads_left == 0 {
                due.push(scripted.status.clone());
                false
            } else {
                scripted.reads_left -= 1;
                true
            }
        });

        let Some(object) = state.objects.get_mut(&key) else {
            return Ok(None);
        };
        for status in due {
            object["status"] = status;
        }
        Ok(Some(object.clone()))
    }

    fn list(&self, kind: &ResourceKind, namespace: &str) -> Result<Vec<Value>> {
        let mut state = self.state();
        Self::begin(&mut state, Operation::List, kind, None)?;

        Ok(state
            .objects
            .iter()
            .filter(|((plural, ns, _), _)| *plural == kind.plural && ns == namespace)
            .map(|(_, object)| object.clone())
            .collect())
    }

    fn create(&self, kind: &ResourceKind, namespace: &str, body: &Value) -> Result<Value> {
        let mut state = self.state();
        let mut object = body.clone();
        let requested = object
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .map(str::to_string);
        Self::begin(&mut state, Operation::Create, kind, requested.as_deref())?;

        let now = state.now;
        let name = stamp_metadata(&mut object, kind, namespace, now)?;
        let key = Self::key(kind, namespace, &name);
        if state.objects.contains_key(&key) {
            return Err(SnapshotError::Conflict {
                kind: kind.kind.to_string(),
                name,
                namespace: namespace.to_string(),
            });
        }

        // distinct, increasing creation timestamps
        state.now = now + ChronoDuration::seconds(1);
        state.objects.insert(key, object.clone());
        Ok(object)
    }

    fn delete(&self, kind: &ResourceKind, namespace: &str, name: &str) -> Result<bool> {
        let mut state = self.state();
        Self::begin(&mut state, Operation::Delete, kind, Some(name))?;
        Ok(state
            .objects
            .remove(&Self::key(kind, namespace, name))
            .is_some())
    }

    fn pod_logs(&self, namespace: &str, pod: &str) -> Result<String> {
        let mut state = self.state();
        Self::begin(&mut state, Operation::Get, &POD, Some(pod))?;
        state
            .logs
            .get(&(namespace.to_string(), pod.to_string()))
            .cloned()
            .ok_or_else(|| SnapshotError::not_found("Pod", pod, namespace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{POD_SNAPSHOT, POD_SNAPSHOT_MANUAL_TRIGGER};
    use serde_json::json;

    #[test]
    fn test_create_assigns_uid_and_increasing_timestamps() {
        let client = MemoryResourceClient::new();
        let a = client
            .create(&POD_SNAPSHOT, "ns", &json!({"metadata": {"name": "a"}}))
            .unwrap();
        let b = client
            .create(&POD_SNAPSHOT, "ns", &json!({"metadata": {"name": "b"}}))
            .unwrap();

        assert!(a["metadata"]["uid"].is_string());
        assert_ne!(a["metadata"]["uid"], b["metadata"]["uid"]);
        let ta: DateTime<Utc> = a["metadata"]["creationTimestamp"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        let tb: DateTime<Utc> = b["metadata"]["creationTimestamp"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(tb > ta);
    }

    #[test]
    fn test_create_conflict() {
        let client = MemoryResourceClient::new();
        let body = json!({"metadata": {"name": "t1"}});
        client
            .create(&POD_SNAPSHOT_MANUAL_TRIGGER, "ns", &body)
            .unwrap();
        let err = client
            .create(&POD_SNAPSHOT_MANUAL_TRIGGER, "ns", &body)
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Conflict { .. }));
    }

    #[test]
    fn test_delete_reports_existence() {
        let client = MemoryResourceClient::new();
        client
            .insert(&POD_SNAPSHOT, "ns", json!({"metadata": {"name": "a"}}))
            .unwrap();
        assert!(client.delete(&POD_SNAPSHOT, "ns", "a").unwrap());
        assert!(!client.delete(&POD_SNAPSHOT, "ns", "a").unwrap());
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let client = MemoryResourceClient::new();
        client
            .insert(&POD_SNAPSHOT, "one", json!({"metadata": {"name": "a"}}))
            .unwrap();
        assert_eq!(client.list(&POD_SNAPSHOT, "one").unwrap().len(), 1);
        assert!(client.list(&POD_SNAPSHOT, "two").unwrap().is_empty());
        assert!(client.get(&POD_SNAPSHOT, "two", "a").unwrap().is_none());
    }

    #[test]
    fn test_scheduled_status_lands_after_reads() {
        let client = MemoryResourceClient::new();
        client
            .insert(
                &POD_SNAPSHOT_MANUAL_TRIGGER,
                "ns",
                json!({"metadata": {"name": "t"}}),
            )
            .unwrap();
        client.schedule_status(
            &POD_SNAPSHOT_MANUAL_TRIGGER,
            "ns",
            "t",
            2,
            json!({"phase": "Succeeded"}),
        );

        for _ in 0..2 {
            let t = client
                .get(&POD_SNAPSHOT_MANUAL_TRIGGER, "ns", "t")
                .unwrap()
                .unwrap();
            assert!(t.get("status").is_none());
        }
        let t = client
            .get(&POD_SNAPSHOT_MANUAL_TRIGGER, "ns", "t")
            .unwrap()
            .unwrap();
        assert_eq!(t["status"]["phase"], "Succeeded");
    }

    #[test]
    fn test_injected_failure() {
        let client = MemoryResourceClient::new();
        client.fail_on(Operation::Delete, &POD_SNAPSHOT, Some("stuck"), "forbidden");
        client
            .insert(&POD_SNAPSHOT, "ns", json!({"metadata": {"name": "stuck"}}))
            .unwrap();
        client
            .insert(&POD_SNAPSHOT, "ns", json!({"metadata": {"name": "free"}}))
            .unwrap();

        assert!(client.delete(&POD_SNAPSHOT, "ns", "stuck").is_err());
        assert!(client.delete(&POD_SNAPSHOT, "ns", "free").unwrap());
        assert_eq!(client.calls(Operation::Delete), 2);
    }
}
