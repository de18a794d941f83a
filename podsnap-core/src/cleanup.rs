/*!
Scope-exit cleanup of resources a session created.
*/

use crate::client::{Api, ResourceClient};
use crate::observability::record_cleanup_failures;
use crate::resources::{PodSnapshotManualTrigger, SandboxClaim};
use crate::{Result, SnapshotError};
use std::mem;
use tracing::{debug, info, warn};

/// What a cleanup pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Resources that existed and were deleted
    pub deleted: Vec<String>,
    /// Resources that were already gone
    pub missing: Vec<String>,
    /// Resources whose deletion failed, with the error
    pub failed: Vec<(String, String)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Ledger of triggers (and the sandbox claim) created during a session
///
/// Names are appended as resources are created and consumed by
/// [`run`](Self::run). Snapshot records are never tracked here.
#[derive(Debug, Default)]
pub struct SessionCleanup {
    namespace: String,
    triggers: Vec<String>,
    claim: Option<String>,
}

impl SessionCleanup {
    pub fn new<S: Into<String>>(namespace: S) -> Self {
        Self {
            namespace: namespace.into(),
            triggers: Vec::new(),
            claim: None,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Trigger names recorded so far, in creation order
    pub fn triggers(&self) -> &[String] {
        &self.triggers
    }

    pub fn is_tracked(&self, trigger_name: &str) -> bool {
        self.triggers.iter().any(|t| t == trigger_name)
    }

    /// Record a trigger; a name may only be recorded once per session
    pub fn track_trigger<S: Into<String>>(&mut self, trigger_name: S) -> Result<()> {
        let trigger_name = trigger_name.into();
        if self.is_tracked(&trigger_name) {
            return Err(SnapshotError::validation(format!(
                "Trigger '{trigger_name}' was already used in this session"
            )));
        }
        debug!(namespace = %self.namespace, trigger = %trigger_name, "Tracking trigger");
        self.triggers.push(trigger_name);
        Ok(())
    }

    /// Record the sandbox claim to release on exit
    pub fn track_claim<S: Into<String>>(&mut self, claim_name: S) {
        self.claim = Some(claim_name.into());
    }

    /// Stop tracking the claim so it outlives the session
    pub fn release_claim(&mut self) -> Option<String> {
        self.claim.take()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty() && self.claim.is_none()
    }

    /// Delete every tracked resource
    ///
    /// Failures are logged and reported, never returned as errors. The ledger
    /// is drained first, so a second run does nothing.
    pub fn run<C: ResourceClient + ?Sized>(&mut self, client: &C) -> CleanupReport {
        let triggers = mem::take(&mut self.triggers);
        let claim = self.claim.take();
        let mut report = CleanupReport::default();

        let trigger_api = Api::<PodSnapshotManualTrigger, C>::namespaced(client, &self.namespace);
        for name in triggers {
            let outcome = trigger_api.delete(&name);
            settle(&mut report, name, outcome);
        }
        if let Some(name) = claim {
            let outcome = Api::<SandboxClaim, C>::namespaced(client, &self.namespace).delete(&name);
            settle(&mut report, name, outcome);
        }

        if !report.failed.is_empty() {
            record_cleanup_failures(report.failed.len());
        }
        if !(report.deleted.is_empty() && report.missing.is_empty() && report.failed.is_empty()) {
            info!(
                namespace = %self.namespace,
                deleted = report.deleted.len(),
                missing = report.missing.len(),
                failed = report.failed.len(),
                "Session cleanup finished"
            );
        }
        report
    }
}

fn settle(report: &mut CleanupReport, name: String, outcome: Result<bool>) {
    match outcome {
        Ok(true) => report.deleted.push(name),
        Ok(false) => report.missing.push(name),
        Err(e) => {
            warn!(resource = %name, error = %e, "Cleanup deletion failed");
            report.failed.push((name, e.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::Operation;
    use crate::client::MemoryResourceClient;
    use crate::resources::{POD_SNAPSHOT, POD_SNAPSHOT_MANUAL_TRIGGER, SANDBOX_CLAIM};
    use serde_json::json;

    fn trigger(client: &MemoryResourceClient, name: &str) {
        client
            .insert(
                &POD_SNAPSHOT_MANUAL_TRIGGER,
                "ns",
                json!({"metadata": {"name": name}, "spec": {"targetPod": "pod"}}),
            )
            .unwrap();
    }

    #[test]
    fn test_duplicate_trigger_rejected() {
        let mut cleanup = SessionCleanup::new("ns");
        cleanup.track_trigger("t1").unwrap();
        let err = cleanup.track_trigger("t1").unwrap_err();
        assert!(matches!(err, SnapshotError::Validation(_)));
        assert_eq!(cleanup.triggers(), ["t1"]);
    }

    #[test]
    fn test_run_deletes_triggers_and_claim_but_not_snapshots() {
        let client = MemoryResourceClient::new();
        trigger(&client, "t1");
        trigger(&client, "t2");
        client
            .insert(&SANDBOX_CLAIM, "ns", json!({"metadata": {"name": "claim"}}))
            .unwrap();
        client
            .insert(&POD_SNAPSHOT, "ns", json!({"metadata": {"name": "s1"}}))
            .unwrap();

        let mut cleanup = SessionCleanup::new("ns");
        cleanup.track_trigger("t1").unwrap();
        cleanup.track_trigger("t2").unwrap();
        cleanup.track_trigger("never-created").unwrap();
        cleanup.track_claim("claim");

        let report = cleanup.run(&client);
        assert_eq!(report.deleted, vec!["t1", "t2", "claim"]);
        assert_eq!(report.missing, vec!["never-created"]);
        assert!(report.is_clean());
        assert!(client.names(&POD_SNAPSHOT_MANUAL_TRIGGER, "ns").is_empty());
        assert!(client.contains(&POD_SNAPSHOT, "ns", "s1"));
    }

    #[test]
    fn test_failures_are_suppressed_and_others_still_deleted() {
        let client = MemoryResourceClient::new();
        trigger(&client, "t1");
        trigger(&client, "t2");
        client.fail_on(Operation::Delete, &POD_SNAPSHOT_MANUAL_TRIGGER, Some("t1"), "denied");

        let mut cleanup = SessionCleanup::new("ns");
        cleanup.track_trigger("t1").unwrap();
        cleanup.track_trigger("t2").unwrap();

        let report = cleanup.run(&client);
        assert_eq!(report.deleted, vec!["t2"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "t1");
        assert!(!report.is_clean());
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let client = MemoryResourceClient::new();
        trigger(&client, "t1");
        let mut cleanup = SessionCleanup::new("ns");
        cleanup.track_trigger("t1").unwrap();

        cleanup.run(&client);
        let deletes = client.calls(Operation::Delete);
        let report = cleanup.run(&client);

        assert_eq!(report, CleanupReport::default());
        assert_eq!(client.calls(Operation::Delete), deletes);
        assert!(cleanup.is_empty());
    }

    #[test]
    fn test_released_claim_survives() {
        let client = MemoryResourceClient::new();
        client
            .insert(&SANDBOX_CLAIM, "ns", json!({"metadata": {"name": "claim"}}))
            .unwrap();
        let mut cleanup = SessionCleanup::new("ns");
        cleanup.track_claim("claim");
        assert_eq!(cleanup.release_claim().as_deref(), Some("claim"));

        cleanup.run(&client);
        assert!(client.contains(&SANDBOX_CLAIM, "ns", "claim"));
    }
}
