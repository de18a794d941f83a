/*!
Simulated cluster for integration tests.

`SimulatedCluster` wraps the in-memory client and plays the part of the
sandbox operator and the snapshot controller in virtual time:

- a SandboxClaim yields a Sandbox whose pod runs a counter that ticks once per
  virtual second, starting from zero or from the restored snapshot's value
- a manual trigger completes after a processing delay, producing a Ready
  PodSnapshot that records the counter value at trigger time
- pod logs print one `Count: N` line per tick
*/

#![allow(dead_code)]

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use podsnap_core::resources::{
    ResourceKind, POD, POD_NAME_ANNOTATION, POD_SNAPSHOT, POD_SNAPSHOT_MANUAL_TRIGGER,
    POD_SNAPSHOT_POLICY, RESTORE_ANNOTATION, SANDBOX, SANDBOX_CLAIM, SANDBOX_TEMPLATE,
};
use podsnap_core::{MemoryResourceClient, ResourceClient, Result};
use podsnap_poll::ManualClock;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NAMESPACE: &str = "sandbox-test";
pub const TEMPLATE: &str = "python-counter-template";
pub const POLICY: &str = "counter-policy";

/// Annotation the simulated controller stores the captured counter in
pub const COUNTER_ANNOTATION: &str = "test.podsnap.dev/counter";

struct SimPod {
    started: Duration,
    base: u64,
}

struct PendingTrigger {
    target_pod: String,
    count: Option<u64>,
    done_at: Duration,
}

#[derive(Default)]
struct SimState {
    pods: BTreeMap<String, SimPod>,
    sandboxes: BTreeMap<String, (Duration, u64)>,
    triggers: BTreeMap<String, PendingTrigger>,
    failing: BTreeMap<String, (String, String)>,
    snapshot_seq: usize,
}

pub struct SimulatedCluster {
    pub store: MemoryResourceClient,
    pub clock: Arc<ManualClock>,
    /// Virtual time a sandbox needs to report its pod
    pub sandbox_delay: Duration,
    /// Virtual time the controller needs per checkpoint
    pub checkpoint_delay: Duration,
    state: Mutex<SimState>,
}

impl SimulatedCluster {
    /// Cluster with the counter template, a matching policy and a running
    /// controller
    pub fn new() -> Self {
        let store = MemoryResourceClient::new();
        store
            .insert(
                &SANDBOX_TEMPLATE,
                NAMESPACE,
                json!({"metadata": {"name": TEMPLATE},
                       "spec": {"podTemplate": {"metadata": {"labels": {"app": "counter"}}}}}),
            )
            .unwrap();
        store
            .insert(
                &POD_SNAPSHOT_POLICY,
                NAMESPACE,
                json!({"metadata": {"name": POLICY},
                       "spec": {"selector": {"matchLabels": {"app": "counter"}},
                                "triggerConfig": {"type": "manual"}}}),
            )
            .unwrap();
        store
            .insert(
                &POD,
                "gps-system",
                json!({"metadata": {"name": "gke-pod-snapshot-controller-7c9d-x2"},
                       "status": {"phase": "Running"}}),
            )
            .unwrap();

        Self {
            store,
            clock: Arc::new(ManualClock::new()),
            sandbox_delay: Duration::from_secs(2),
            checkpoint_delay: Duration::from_secs(3),
            state: Mutex::new(SimState::default()),
        }
    }

    pub fn without_controller() -> Self {
        let cluster = Self::new();
        cluster
            .store
            .delete(&POD, "gps-system", "gke-pod-snapshot-controller-7c9d-x2")
            .unwrap();
        cluster
    }

    /// Let `duration` of virtual time pass
    pub fn wait(&self, duration: Duration) {
        self.clock.advance(duration);
    }

    /// Make the controller fail the named trigger
    pub fn fail_trigger(&self, trigger: &str, reason: &str, message: &str) {
        self.state()
            .failing
            .insert(trigger.to_string(), (reason.to_string(), message.to_string()));
    }

    /// Current counter value of a pod
    pub fn counter(&self, pod: &str) -> Option<u64> {
        let now = self.clock.elapsed();
        self.state().pods.get(pod).map(|p| count_at(p, now))
    }

    pub fn trigger_names(&self) -> Vec<String> {
        self.store.names(&POD_SNAPSHOT_MANUAL_TRIGGER, NAMESPACE)
    }

    pub fn snapshot_names(&self) -> Vec<String> {
        self.store.names(&POD_SNAPSHOT, NAMESPACE)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap()
    }

    fn sync_store_time(&self) {
        let epoch = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let elapsed = ChronoDuration::from_std(self.clock.elapsed()).unwrap();
        self.store.set_now(epoch + elapsed);
    }

    fn restored_count(&self, claim: &Value) -> u64 {
        let snapshots = self.store.list(&POD_SNAPSHOT, NAMESPACE).unwrap();
        let ready = |s: &&Value| s["status"]["phase"] == "Ready";
        let chosen = match claim["metadata"]["annotations"][RESTORE_ANNOTATION].as_str() {
            Some(uid) => snapshots.iter().find(|s| s["metadata"]["uid"] == uid),
            None => snapshots.iter().filter(ready).max_by(|a, b| {
                let ta = a["metadata"]["creationTimestamp"].as_str().unwrap_or_default();
                let tb = b["metadata"]["creationTimestamp"].as_str().unwrap_or_default();
                ta.cmp(tb)
            }),
        };
        chosen
            .and_then(|s| s["metadata"]["annotations"][COUNTER_ANNOTATION].as_str())
            .and_then(|c| c.parse().ok())
            .unwrap_or(0)
    }

    fn advance_sandbox(&self, name: &str) {
        let now = self.clock.elapsed();
        let due = {
            let mut state = self.state();
            match state.sandboxes.get(name) {
                Some((ready_at, base)) if *ready_at <= now => {
                    let base = *base;
                    state.sandboxes.remove(name);
                    let pod = format!("{name}-pod");
                    state.pods.insert(pod.clone(), SimPod { started: now, base });
                    Some(pod)
                }
                _ => None,
            }
        };
        if let Some(pod) = due {
            self.store
                .insert(
                    &SANDBOX,
                    NAMESPACE,
                    json!({"metadata": {"name": name, "annotations": {POD_NAME_ANNOTATION: pod}},
                           "status": {"conditions": [{"type": "Ready", "status": "True"}]}}),
                )
                .unwrap();
        }
    }

    fn advance_trigger(&self, name: &str) {
        let now = self.clock.elapsed();
        let mut state = self.state();
        let Some(pending) = state.triggers.get(name) else {
            return;
        };
        if pending.done_at > now {
            return;
        }
        let pending = state.triggers.remove(name).unwrap();

        if let Some((reason, message)) = state.failing.remove(name) {
            drop(state);
            self.store
                .set_status(
                    &POD_SNAPSHOT_MANUAL_TRIGGER,
                    NAMESPACE,
                    name,
                    json!({"phase": "Failed", "reason": reason, "message": message}),
                )
                .unwrap();
            return;
        }

        let Some(count) = pending.count else {
            drop(state);
            self.store
                .set_status(
                    &POD_SNAPSHOT_MANUAL_TRIGGER,
                    NAMESPACE,
                    name,
                    json!({"phase": "Failed", "reason": "PodNotFound",
                           "message": format!("pod {} not found", pending.target_pod)}),
                )
                .unwrap();
            return;
        };

        state.snapshot_seq += 1;
        let snapshot = format!("{POLICY}-{:04}", state.snapshot_seq);
        drop(state);

        self.sync_store_time();
        self.store
            .create(
                &POD_SNAPSHOT,
                NAMESPACE,
                &json!({
                    "metadata": {
                        "name": snapshot,
                        "labels": {"podsnapshot.gke.io/trigger-name": name},
                        "annotations": {COUNTER_ANNOTATION: count.to_string()}
                    },
                    "spec": {"policyName": POLICY, "sourcePod": pending.target_pod},
                    "status": {"phase": "Ready", "storageLocation": format!("gs://snapshots/{snapshot}")}
                }),
            )
            .unwrap();
        self.store
            .set_status(
                &POD_SNAPSHOT_MANUAL_TRIGGER,
                NAMESPACE,
                name,
                json!({"phase": "Succeeded", "snapshotName": snapshot}),
            )
            .unwrap();
    }
}

fn count_at(pod: &SimPod, now: Duration) -> u64 {
    pod.base + now.saturating_sub(pod.started).as_secs()
}

impl ResourceClient for SimulatedCluster {
    fn get(&self, kind: &ResourceKind, namespace: &str, name: &str) -> Result<Option<Value>> {
        if *kind == SANDBOX {
            self.advance_sandbox(name);
        } else if *kind == POD_SNAPSHOT_MANUAL_TRIGGER {
            self.advance_trigger(name);
        }
        self.store.get(kind, namespace, name)
    }

    fn list(&self, kind: &ResourceKind, namespace: &str) -> Result<Vec<Value>> {
        self.store.list(kind, namespace)
    }

    fn create(&self, kind: &ResourceKind, namespace: &str, body: &Value) -> Result<Value> {
        self.sync_store_time();
        let created = self.store.create(kind, namespace, body)?;
        let name = created["metadata"]["name"].as_str().unwrap_or_default().to_string();
        let now = self.clock.elapsed();

        if *kind == SANDBOX_CLAIM {
            let base = self.restored_count(&created);
            self.store
                .insert(&SANDBOX, namespace, json!({"metadata": {"name": name}}))?;
            self.state()
                .sandboxes
                .insert(name, (now + self.sandbox_delay, base));
        } else if *kind == POD_SNAPSHOT_MANUAL_TRIGGER {
            let target_pod = created["spec"]["targetPod"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let mut state = self.state();
            let count = state.pods.get(&target_pod).map(|p| count_at(p, now));
            state.triggers.insert(
                name,
                PendingTrigger {
                    target_pod,
                    count,
                    done_at: now + self.checkpoint_delay,
                },
            );
        }
        Ok(created)
    }

    fn delete(&self, kind: &ResourceKind, namespace: &str, name: &str) -> Result<bool> {
        let existed = self.store.delete(kind, namespace, name)?;
        if *kind == SANDBOX_CLAIM && existed {
            self.store.delete(&SANDBOX, namespace, name)?;
            let mut state = self.state();
            state.sandboxes.remove(name);
            state.pods.remove(&format!("{name}-pod"));
        } else if *kind == POD_SNAPSHOT_MANUAL_TRIGGER {
            self.state().triggers.remove(name);
        }
        Ok(existed)
    }

    fn pod_logs(&self, namespace: &str, pod: &str) -> Result<String> {
        let now = self.clock.elapsed();
        let state = self.state();
        let Some(sim) = state.pods.get(pod) else {
            return Err(podsnap_core::SnapshotError::not_found("Pod", pod, namespace));
        };
        let lines: Vec<String> = (sim.base..=count_at(sim, now))
            .map(|n| format!("Count: {n}"))
            .collect();
        Ok(lines.join("\n"))
    }
}

/// Last `Count: N` value printed in `logs`
pub fn last_count(logs: &str) -> Option<u64> {
    logs.lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix("Count: "))
        .and_then(|n| n.trim().parse().ok())
}

/// Label set used by counter sessions
pub fn counter_labels() -> BTreeMap<String, String> {
    [("app".to_string(), "counter".to_string())].into_iter().collect()
}

pub fn unique(names: &[String]) -> bool {
    names.iter().collect::<BTreeSet<_>>().len() == names.len()
}
