/*!
Deletion of snapshot records by identifier or by policy-scoped criteria.
*/

use crate::catalog::SnapshotCatalog;
use crate::client::{Api, ResourceClient};
use crate::observability::record_deletions;
use crate::resources::{PodSnapshot, Resource, SnapshotPhase};
use crate::{Result, SnapshotError};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Which snapshots to delete
///
/// Either `snapshot_id` alone (exact delete) or metadata predicates scoped by
/// `policy_name`. All predicates given must hold for a snapshot to match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteFilter {
    pub snapshot_id: Option<String>,
    pub policy_name: Option<String>,
    pub trigger_name: Option<String>,
    pub state: Option<SnapshotPhase>,
    pub created_before: Option<DateTime<Utc>>,
}

impl DeleteFilter {
    /// Delete exactly one snapshot by name
    pub fn by_id<S: Into<String>>(snapshot_id: S) -> Self {
        Self {
            snapshot_id: Some(snapshot_id.into()),
            ..Self::default()
        }
    }

    /// Start a metadata filter scoped to one policy
    pub fn in_policy<S: Into<String>>(policy_name: S) -> Self {
        Self {
            policy_name: Some(policy_name.into()),
            ..Self::default()
        }
    }

    pub fn with_trigger_name<S: Into<String>>(mut self, trigger_name: S) -> Self {
        self.trigger_name = Some(trigger_name.into());
        self
    }

    pub fn with_state(mut self, state: SnapshotPhase) -> Self {
        self.state = Some(state);
        self
    }

    pub fn created_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.created_before = Some(cutoff);
        self
    }

    fn has_predicates(&self) -> bool {
        self.policy_name.is_some()
            || self.trigger_name.is_some()
            || self.state.is_some()
            || self.created_before.is_some()
    }

    fn matches(&self, snapshot: &PodSnapshot) -> bool {
        let trigger_ok = self
            .trigger_name
            .as_deref()
            .is_none_or(|t| snapshot.trigger_name() == Some(t));
        let state_ok = self.state.is_none_or(|s| snapshot.phase() == s);
        let age_ok = self.created_before.is_none_or(|cutoff| {
            snapshot
                .metadata
                .creation_timestamp
                .is_some_and(|created| created < cutoff)
        });
        trigger_ok && state_ok && age_ok
    }
}

/// Deletes snapshot records in one namespace
pub struct RetentionManager<'a, C: ?Sized> {
    client: &'a C,
    namespace: &'a str,
}

impl<'a, C: ResourceClient + ?Sized> RetentionManager<'a, C> {
    pub fn new(client: &'a C, namespace: &'a str) -> Self {
        Self { client, namespace }
    }

    /// Delete the snapshots selected by `filter` and return how many were
    /// actually removed
    ///
    /// Deleting an absent snapshot by id counts 0 and is not an error. A
    /// metadata filter without a non-empty `policy_name` is rejected before
    /// any API call. Batch deletions attempt every match and report failures
    /// together as [`SnapshotError::PartialDeletion`].
    pub fn delete_snapshots(&self, filter: &DeleteFilter) -> Result<usize> {
        match &filter.snapshot_id {
            Some(id) => {
                if filter.has_predicates() {
                    return Err(SnapshotError::validation(
                        "snapshot_id cannot be combined with metadata filters",
                    ));
                }
                self.delete_by_id(id)
            }
            None => self.delete_matching(filter),
        }
    }

    fn delete_by_id(&self, snapshot_id: &str) -> Result<usize> {
        if snapshot_id.trim().is_empty() {
            return Err(SnapshotError::validation("snapshot_id cannot be empty"));
        }
        let existed = Api::<PodSnapshot, C>::namespaced(self.client, self.namespace)
            .delete(snapshot_id)?;
        let count = usize::from(existed);
        if existed {
            info!(namespace = self.namespace, snapshot = snapshot_id, "Deleted snapshot");
        } else {
            info!(
                namespace = self.namespace,
                snapshot = snapshot_id,
                "Snapshot already absent"
            );
        }
        record_deletions(count, 0);
        Ok(count)
    }

    fn delete_matching(&self, filter: &DeleteFilter) -> Result<usize> {
        let policy_name = match filter.policy_name.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => p,
            _ => {
                return Err(SnapshotError::validation(
                    "policy_name is required when deleting by metadata filter",
                ))
            }
        };

        let catalog = SnapshotCatalog::new(self.client, self.namespace);
        let matches: Vec<PodSnapshot> = catalog
            .all_snapshots()?
            .into_iter()
            .filter(|s| s.policy_name() == Some(policy_name))
            .filter(|s| filter.matches(s))
            .collect();

        let api = Api::<PodSnapshot, C>::namespaced(self.client, self.namespace);
        let mut deleted = 0;
        let mut failures = Vec::new();
        for snapshot in &matches {
            let name = snapshot.name();
            match api.delete(name) {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        namespace = self.namespace,
                        snapshot = name,
                        error = %e,
                        "Failed to delete snapshot"
                    );
                    failures.push((name.to_string(), e.to_string()));
                }
            }
        }

        record_deletions(deleted, failures.len());
        info!(
            namespace = self.namespace,
            policy = policy_name,
            matched = matches.len(),
            deleted,
            failed = failures.len(),
            "Deleted snapshots by filter"
        );

        if failures.is_empty() {
            Ok(deleted)
        } else {
            Err(SnapshotError::PartialDeletion { deleted, failures })
        }
    }
}
