/*!
On-demand checkpoints through manual triggers.

A checkpoint is a PodSnapshotManualTrigger naming the pod to capture. The
controller picks it up asynchronously; the coordinator waits on its status
with a bounded poll loop and reports which snapshot was produced.
*/

use crate::catalog::SnapshotCatalog;
use crate::cleanup::SessionCleanup;
use crate::client::{Api, ResourceClient};
use crate::observability::{record_checkpoint, CheckpointResult};
use crate::resources::{PodSnapshotManualTrigger, TriggerPhase, POD_SNAPSHOT_MANUAL_TRIGGER};
use crate::{Result, SnapshotError};
use podsnap_poll::{poll_until, Clock, PollError, PollPolicy, PollStatus};
use std::time::Duration;
use tracing::{error, info, warn};

/// A completed checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointOutcome {
    pub trigger_name: String,
    /// Snapshot the controller produced, when it could be determined
    pub snapshot_name: Option<String>,
    /// Virtual or wall time spent waiting
    pub elapsed: Duration,
    /// Number of status checks made
    pub polls: usize,
}

/// Creates manual triggers and waits for the controller to finish them
pub struct TriggerCoordinator<'a, C: ?Sized, K: ?Sized> {
    client: &'a C,
    clock: &'a K,
    namespace: &'a str,
    poll_interval: Duration,
}

impl<'a, C, K> TriggerCoordinator<'a, C, K>
where
    C: ResourceClient + ?Sized,
    K: Clock + ?Sized,
{
    pub fn new(client: &'a C, clock: &'a K, namespace: &'a str, poll_interval: Duration) -> Self {
        Self {
            client,
            clock,
            namespace,
            poll_interval,
        }
    }

    /// Checkpoint `pod_name` under the trigger name `trigger_name`
    ///
    /// The trigger is recorded in `cleanup` as soon as it exists, so it is
    /// removed on session exit whatever happens while waiting.
    pub fn checkpoint(
        &self,
        cleanup: &mut SessionCleanup,
        pod_name: &str,
        trigger_name: &str,
        deadline: Duration,
    ) -> Result<CheckpointOutcome> {
        if trigger_name.trim().is_empty() {
            return Err(SnapshotError::validation("trigger_name cannot be empty"));
        }
        if pod_name.trim().is_empty() {
            return Err(SnapshotError::validation("pod name cannot be empty"));
        }
        if cleanup.is_tracked(trigger_name) {
            return Err(SnapshotError::validation(format!(
                "Trigger '{trigger_name}' was already used in this session"
            )));
        }

        let api = Api::<PodSnapshotManualTrigger, C>::namespaced(self.client, self.namespace);
        let request = PodSnapshotManualTrigger::new(trigger_name, self.namespace, pod_name);
        match api.create(&request) {
            Ok(_) => {}
            Err(SnapshotError::Conflict { .. }) => {
                return Err(SnapshotError::validation(format!(
                    "Trigger '{trigger_name}' already exists in namespace '{}'",
                    self.namespace
                )));
            }
            Err(e) => return Err(e),
        }
        cleanup.track_trigger(trigger_name)?;
        info!(
            namespace = self.namespace,
            trigger = trigger_name,
            pod = pod_name,
            "Created manual trigger"
        );

        let started = self.clock.now();
        let mut polls = 0;
        let policy = PollPolicy::new(self.poll_interval, deadline);
        let check = |attempt: usize| -> Result<PollStatus<PodSnapshotManualTrigger>> {
            polls = attempt;
            let trigger = api.get_opt(trigger_name)?.ok_or_else(|| {
                SnapshotError::not_found(
                    POD_SNAPSHOT_MANUAL_TRIGGER.kind,
                    trigger_name,
                    self.namespace,
                )
            })?;
            Ok(match trigger.phase() {
                TriggerPhase::Pending => PollStatus::Pending,
                TriggerPhase::Succeeded | TriggerPhase::Failed => PollStatus::Done(trigger),
            })
        };
        let waited = poll_until("checkpoint", self.clock, policy, check);
        let elapsed = self.clock.now().saturating_duration_since(started);

        let trigger = match waited {
            Ok(trigger) => trigger,
            Err(PollError::DeadlineExceeded { .. }) => {
                record_checkpoint(CheckpointResult::TimedOut, elapsed);
                warn!(
                    namespace = self.namespace,
                    trigger = trigger_name,
                    deadline = ?deadline,
                    "Checkpoint timed out"
                );
                return Err(SnapshotError::Timeout {
                    trigger: trigger_name.to_string(),
                    deadline,
                });
            }
            Err(PollError::Check { error, .. }) => return Err(error),
        };

        if trigger.phase() == TriggerPhase::Failed {
            record_checkpoint(CheckpointResult::Failed, elapsed);
            let (reason, message) = trigger.failure();
            error!(
                namespace = self.namespace,
                trigger = trigger_name,
                reason = ?reason,
                message = %message,
                "Controller reported checkpoint failure"
            );
            return Err(SnapshotError::ControllerFailure {
                trigger: trigger_name.to_string(),
                reason,
                message,
            });
        }

        record_checkpoint(CheckpointResult::Succeeded, elapsed);
        let snapshot_name = match trigger.snapshot_name() {
            Some(name) => Some(name.to_string()),
            None => SnapshotCatalog::new(self.client, self.namespace)
                .snapshots_for_trigger(trigger_name)?
                .into_iter()
                .next()
                .map(|record| record.snapshot_id),
        };
        info!(
            namespace = self.namespace,
            trigger = trigger_name,
            snapshot = ?snapshot_name,
            polls,
            elapsed = ?elapsed,
            "Checkpoint completed"
        );

        Ok(CheckpointOutcome {
            trigger_name: trigger_name.to_string(),
            snapshot_name,
            elapsed,
            polls,
        })
    }
}
