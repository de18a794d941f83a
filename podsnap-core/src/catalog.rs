/*!
Policy-scoped listing of snapshot records.
*/

use crate::client::{Api, ResourceClient};
use crate::resources::{
    LabelSelector, PodSnapshot, PodSnapshotPolicy, PodSnapshotStorageConfig, RetentionSpec,
    SnapshotPhase,
};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Reverse;
use tracing::debug;

/// Metadata of one snapshot, detached from the underlying resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotRecord {
    /// Resource name; the identifier users refer to
    pub snapshot_id: String,
    /// Server-assigned unique identifier used for restore
    pub uid: Option<String>,
    pub policy_name: Option<String>,
    pub trigger_name: Option<String>,
    pub state: SnapshotPhase,
    pub created_at: Option<DateTime<Utc>>,
    pub storage_location: Option<String>,
}

impl From<&PodSnapshot> for SnapshotRecord {
    fn from(snapshot: &PodSnapshot) -> Self {
        Self {
            snapshot_id: snapshot.metadata.name.clone(),
            uid: snapshot.metadata.uid.clone(),
            policy_name: snapshot.policy_name().map(str::to_string),
            trigger_name: snapshot.trigger_name().map(str::to_string),
            state: snapshot.phase(),
            created_at: snapshot.metadata.creation_timestamp,
            storage_location: snapshot.storage_location().map(str::to_string),
        }
    }
}

/// Summary of a snapshot policy and where it stores snapshots
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicySummary {
    pub policy_name: String,
    pub selector: LabelSelector,
    pub retention: Option<RetentionSpec>,
    pub storage_config: Option<String>,
    pub storage_location: Option<String>,
}

/// Newest first; ties by identifier; records without a timestamp last
pub fn sort_newest_first(records: &mut [SnapshotRecord]) {
    records.sort_by(|a, b| {
        Reverse(a.created_at)
            .cmp(&Reverse(b.created_at))
            .then_with(|| a.snapshot_id.cmp(&b.snapshot_id))
    });
}

/// Lists snapshot records in one namespace
pub struct SnapshotCatalog<'a, C: ?Sized> {
    client: &'a C,
    namespace: &'a str,
}

impl<'a, C: ResourceClient + ?Sized> SnapshotCatalog<'a, C> {
    pub fn new(client: &'a C, namespace: &'a str) -> Self {
        Self { client, namespace }
    }

    /// Every snapshot in the namespace, unfiltered and unordered
    pub fn all_snapshots(&self) -> Result<Vec<PodSnapshot>> {
        Api::<PodSnapshot, C>::namespaced(self.client, self.namespace).list()
    }

    /// Snapshots owned by `policy_name`, newest first
    ///
    /// With `ready_only`, Pending and Failed snapshots are left out so a
    /// half-written snapshot is never offered for restore.
    pub fn list_snapshots(&self, policy_name: &str, ready_only: bool) -> Result<Vec<SnapshotRecord>> {
        let snapshots = self.all_snapshots()?;
        let total = snapshots.len();

        let mut records: Vec<SnapshotRecord> = snapshots
            .iter()
            .filter(|s| s.policy_name() == Some(policy_name))
            .filter(|s| !ready_only || s.phase() == SnapshotPhase::Ready)
            .map(SnapshotRecord::from)
            .collect();
        sort_newest_first(&mut records);

        debug!(
            namespace = self.namespace,
            policy = policy_name,
            ready_only,
            total,
            matched = records.len(),
            "Listed snapshots"
        );
        Ok(records)
    }

    /// Snapshots produced by a given trigger, newest first
    pub fn snapshots_for_trigger(&self, trigger_name: &str) -> Result<Vec<SnapshotRecord>> {
        let mut records: Vec<SnapshotRecord> = self
            .all_snapshots()?
            .iter()
            .filter(|s| s.trigger_name() == Some(trigger_name))
            .map(SnapshotRecord::from)
            .collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    /// Describe a policy, resolving its storage configuration when present
    pub fn describe_policy(&self, policy_name: &str) -> Result<PolicySummary> {
        let policy =
            Api::<PodSnapshotPolicy, C>::namespaced(self.client, self.namespace).get(policy_name)?;

        let storage_config = policy.spec.storage_config_name.clone();
        let storage_location = match &storage_config {
            Some(name) => Api::<PodSnapshotStorageConfig, C>::namespaced(self.client, self.namespace)
                .get_opt(name)?
                .and_then(|config| config.location()),
            None => None,
        };

        Ok(PolicySummary {
            policy_name: policy.metadata.name,
            selector: policy.spec.selector,
            retention: policy.spec.retention,
            storage_config,
            storage_location,
        })
    }
}
