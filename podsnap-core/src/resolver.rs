/*!
Decides which snapshot, if any, a new sandbox starts from.

An explicit snapshot identifier is looked up and pinned through the restore
annotation. Without one, the controller chooses on its own: the newest Ready
snapshot of any policy selecting the sandbox's pod labels, or a fresh pod.
The resolver predicts that choice so callers can report it, but only an
explicit target ever changes the claim that gets created.
*/

use crate::catalog::{SnapshotCatalog, SnapshotRecord};
use crate::client::{Api, ResourceClient};
use crate::resources::{
    PodSnapshot, PodSnapshotPolicy, SandboxTemplate, SnapshotPhase, RESTORE_ANNOTATION,
};
use crate::{Result, SnapshotError};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// A snapshot pinned for restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotReference {
    pub snapshot_id: String,
    /// Unique identifier the controller resolves the restore annotation by
    pub uid: String,
    pub policy_name: Option<String>,
    pub state: SnapshotPhase,
}

/// Where a new sandbox's state comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreTarget {
    /// Restore exactly this snapshot
    Explicit(SnapshotReference),
    /// The controller is expected to pick the newest Ready snapshot of a
    /// matching policy
    ImplicitLatest {
        policy_name: String,
        snapshot: SnapshotRecord,
    },
    /// No snapshot applies; the sandbox starts from scratch
    FreshCreate,
    /// The controller's choice could not be predicted; the claim is created
    /// without a restore annotation all the same
    Unpredicted,
}

impl RestoreTarget {
    /// Annotations to put on the sandbox claim
    pub fn annotations(&self) -> BTreeMap<String, String> {
        let mut annotations = BTreeMap::new();
        if let Self::Explicit(reference) = self {
            annotations.insert(RESTORE_ANNOTATION.to_string(), reference.uid.clone());
        }
        annotations
    }

    /// Name of the snapshot the sandbox is (expected to be) restored from
    pub fn snapshot_id(&self) -> Option<&str> {
        match self {
            Self::Explicit(reference) => Some(&reference.snapshot_id),
            Self::ImplicitLatest { snapshot, .. } => Some(&snapshot.snapshot_id),
            Self::FreshCreate | Self::Unpredicted => None,
        }
    }

    pub fn is_restore(&self) -> bool {
        matches!(self, Self::Explicit(_) | Self::ImplicitLatest { .. })
    }
}

impl fmt::Display for RestoreTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit(reference) => write!(f, "snapshot {}", reference.snapshot_id),
            Self::ImplicitLatest {
                policy_name,
                snapshot,
            } => write!(
                f,
                "latest snapshot {} of policy {policy_name}",
                snapshot.snapshot_id
            ),
            Self::FreshCreate => f.write_str("fresh sandbox"),
            Self::Unpredicted => f.write_str("controller's choice (not predicted)"),
        }
    }
}

pub struct SnapshotResolver<'a, C: ?Sized> {
    client: &'a C,
    namespace: &'a str,
}

impl<'a, C: ResourceClient + ?Sized> SnapshotResolver<'a, C> {
    pub fn new(client: &'a C, namespace: &'a str) -> Self {
        Self { client, namespace }
    }

    /// Resolve the restore target for a sandbox built from `template_name`
    /// and carrying `labels`
    ///
    /// A `snapshot_id` that does not exist fails with `NotFound`; there is no
    /// fallback to another snapshot. Without one the prediction is best-effort:
    /// a lookup failure is logged and yields `Unpredicted`.
    pub fn resolve(
        &self,
        snapshot_id: Option<&str>,
        template_name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<RestoreTarget> {
        let target = match snapshot_id {
            Some(id) => RestoreTarget::Explicit(self.reference(id)?),
            None => match self.predict_latest(template_name, labels) {
                Ok(target) => target,
                Err(error) => {
                    warn!(
                        namespace = self.namespace,
                        template = template_name,
                        %error,
                        "Could not predict the controller's restore choice"
                    );
                    RestoreTarget::Unpredicted
                }
            },
        };
        info!(
            namespace = self.namespace,
            template = template_name,
            target = %target,
            "Resolved restore target"
        );
        Ok(target)
    }

    /// Look up one snapshot by identifier
    pub fn reference(&self, snapshot_id: &str) -> Result<SnapshotReference> {
        if snapshot_id.trim().is_empty() {
            return Err(SnapshotError::validation("snapshot_id cannot be empty"));
        }
        let snapshot =
            Api::<PodSnapshot, C>::namespaced(self.client, self.namespace).get(snapshot_id)?;
        let uid = snapshot.metadata.uid.clone().ok_or_else(|| {
            SnapshotError::api(format!("PodSnapshot '{snapshot_id}' has no uid assigned"))
        })?;
        let state = snapshot.phase();
        if state != SnapshotPhase::Ready {
            warn!(
                namespace = self.namespace,
                snapshot = snapshot_id,
                state = %state,
                "Restoring from a snapshot that is not Ready"
            );
        }
        Ok(SnapshotReference {
            snapshot_id: snapshot.metadata.name.clone(),
            uid,
            policy_name: snapshot.policy_name().map(str::to_string),
            state,
        })
    }

    fn predict_latest(
        &self,
        template_name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<RestoreTarget> {
        let template =
            Api::<SandboxTemplate, C>::namespaced(self.client, self.namespace).get(template_name)?;
        let mut pod_labels = template.pod_labels().clone();
        pod_labels.extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));

        let policies: Vec<PodSnapshotPolicy> =
            Api::<PodSnapshotPolicy, C>::namespaced(self.client, self.namespace)
                .list()?
                .into_iter()
                .filter(|p| p.spec.selector.matches(&pod_labels))
                .collect();
        debug!(
            namespace = self.namespace,
            template = template_name,
            policies = policies.len(),
            "Policies selecting sandbox labels"
        );

        let catalog = SnapshotCatalog::new(self.client, self.namespace);
        let mut newest: Option<(String, SnapshotRecord)> = None;
        for policy in policies {
            let ready = catalog.list_snapshots(&policy.metadata.name, true)?;
            let Some(candidate) = ready.into_iter().next() else {
                continue;
            };
            let replace = match &newest {
                None => true,
                Some((_, current)) => is_newer(&candidate, current),
            };
            if replace {
                newest = Some((policy.metadata.name, candidate));
            }
        }

        Ok(match newest {
            Some((policy_name, snapshot)) => RestoreTarget::ImplicitLatest {
                policy_name,
                snapshot,
            },
            None => RestoreTarget::FreshCreate,
        })
    }
}

/// Catalog order: newer timestamp first, then lower identifier
fn is_newer(candidate: &SnapshotRecord, current: &SnapshotRecord) -> bool {
    match (candidate.created_at, current.created_at) {
        (Some(a), Some(b)) if a != b => a > b,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        _ => candidate.snapshot_id < current.snapshot_id,
    }
}
