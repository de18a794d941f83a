/*!
Sandbox sessions with checkpoint and restore.

A [`SnapshotSession`] owns one sandbox for its lifetime: it resolves the
restore target, claims a sandbox from a template, waits for its pod, and on
close (or drop) deletes every trigger it created plus, unless told to keep it,
the claim. Snapshot records outlive the session.
*/

use crate::catalog::{PolicySummary, SnapshotCatalog, SnapshotRecord};
use crate::cleanup::{CleanupReport, SessionCleanup};
use crate::client::{Api, ResourceClient};
use crate::config::{ClientConfig, ConnectionConfig, SessionConfig};
use crate::endpoint::{resolve_endpoint, Endpoint};
use crate::readiness::snapshot_controller_ready;
use crate::resolver::{RestoreTarget, SnapshotResolver};
use crate::resources::{Sandbox, SandboxClaim};
use crate::retention::{DeleteFilter, RetentionManager};
use crate::trigger::{CheckpointOutcome, TriggerCoordinator};
use crate::{Result, SnapshotError};
use podsnap_poll::{poll_until, Clock, PollError, PollPolicy, PollStatus, SystemClock};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A sandbox plus the snapshot operations scoped to it
pub struct SnapshotSession<C: ResourceClient, K: Clock = SystemClock> {
    client: C,
    clock: K,
    config: ClientConfig,
    sandbox_name: String,
    pod_name: String,
    restore_target: Option<RestoreTarget>,
    connection: ConnectionConfig,
    require_controller: bool,
    controller_ready: bool,
    keep_sandbox: bool,
    cleanup: SessionCleanup,
    closed: bool,
}

fn generated_claim_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("sandbox-claim-{}", &id[..8])
}

impl<C: ResourceClient, K: Clock> SnapshotSession<C, K> {
    /// Claim a new sandbox from `session.template_name` and wait for its pod
    ///
    /// With `session.snapshot_id` the sandbox is restored from exactly that
    /// snapshot; otherwise the controller decides. If the sandbox never
    /// becomes ready the claim is deleted again before the error is returned.
    pub fn open(client: C, clock: K, config: ClientConfig, session: SessionConfig) -> Result<Self> {
        config.validate()?;
        session.validate()?;
        let namespace = config.namespace.clone();

        let target = SnapshotResolver::new(&client, &namespace).resolve(
            session.snapshot_id.as_deref(),
            &session.template_name,
            &session.labels,
        )?;

        let claim_name = session.claim_name.clone().unwrap_or_else(generated_claim_name);
        let mut claim = SandboxClaim::new(&claim_name, &namespace, &session.template_name);
        claim.metadata.labels = session.labels.clone();
        claim.metadata.annotations = target.annotations();

        Api::<SandboxClaim, C>::namespaced(&client, &namespace).create(&claim)?;
        let mut cleanup = SessionCleanup::new(&namespace);
        cleanup.track_claim(&claim_name);
        info!(
            namespace = %namespace,
            claim = %claim_name,
            template = %session.template_name,
            target = %target,
            "Created sandbox claim"
        );

        let pod_name = match wait_for_sandbox(&client, &clock, &config, &claim_name) {
            Ok(pod_name) => pod_name,
            Err(e) => {
                warn!(claim = %claim_name, error = %e, "Sandbox did not become ready, releasing claim");
                cleanup.run(&client);
                return Err(e);
            }
        };

        Ok(Self {
            client,
            clock,
            sandbox_name: claim_name,
            pod_name,
            restore_target: Some(target),
            connection: session.connection,
            require_controller: session.require_controller,
            controller_ready: false,
            keep_sandbox: session.keep_sandbox,
            cleanup,
            closed: false,
            config,
        })
    }

    /// Attach to an existing sandbox; nothing but triggers is cleaned up
    pub fn attach(
        client: C,
        clock: K,
        config: ClientConfig,
        sandbox_name: &str,
        require_controller: bool,
    ) -> Result<Self> {
        config.validate()?;
        let sandbox =
            Api::<Sandbox, C>::namespaced(&client, &config.namespace).get(sandbox_name)?;
        let pod_name = sandbox
            .pod_name()
            .ok_or_else(|| {
                SnapshotError::sandbox(format!("Sandbox '{sandbox_name}' has no pod assigned"))
            })?
            .to_string();
        debug!(sandbox = sandbox_name, pod = %pod_name, "Attached to sandbox");

        Ok(Self {
            client,
            clock,
            sandbox_name: sandbox_name.to_string(),
            pod_name,
            restore_target: None,
            connection: ConnectionConfig::default(),
            require_controller,
            controller_ready: false,
            keep_sandbox: true,
            cleanup: SessionCleanup::new(&config.namespace),
            closed: false,
            config,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    pub fn sandbox_name(&self) -> &str {
        &self.sandbox_name
    }

    /// Pod backing the sandbox; the target of checkpoints
    pub fn pod_name(&self) -> &str {
        &self.pod_name
    }

    /// How the sandbox was seeded; `None` for attached sessions
    pub fn restore_target(&self) -> Option<&RestoreTarget> {
        self.restore_target.as_ref()
    }

    /// Triggers created so far and not yet cleaned up
    pub fn tracked_triggers(&self) -> &[String] {
        self.cleanup.triggers()
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Controller readiness, cached once it has been seen healthy
    pub fn controller_ready(&mut self) -> bool {
        if !self.controller_ready {
            self.controller_ready = snapshot_controller_ready(&self.client, &self.config.controller);
        }
        self.controller_ready
    }

    /// Checkpoint the sandbox's pod under `trigger_name`
    ///
    /// `deadline` defaults to the configured checkpoint timeout.
    pub fn checkpoint(
        &mut self,
        trigger_name: &str,
        deadline: Option<Duration>,
    ) -> Result<CheckpointOutcome> {
        if self.closed {
            return Err(SnapshotError::sandbox("session is closed"));
        }
        if self.require_controller && !self.controller_ready() {
            return Err(SnapshotError::ControllerUnavailable(format!(
                "no running '{}' pod in namespace '{}'",
                self.config.controller.name, self.config.controller.namespace
            )));
        }
        let deadline = deadline.unwrap_or_else(|| self.config.checkpoint_timeout());

        TriggerCoordinator::new(
            &self.client,
            &self.clock,
            &self.config.namespace,
            self.config.poll_interval(),
        )
        .checkpoint(&mut self.cleanup, &self.pod_name, trigger_name, deadline)
    }

    pub fn list_snapshots(&self, policy_name: &str, ready_only: bool) -> Result<Vec<SnapshotRecord>> {
        SnapshotCatalog::new(&self.client, &self.config.namespace)
            .list_snapshots(policy_name, ready_only)
    }

    pub fn describe_policy(&self, policy_name: &str) -> Result<PolicySummary> {
        SnapshotCatalog::new(&self.client, &self.config.namespace).describe_policy(policy_name)
    }

    pub fn delete_snapshots(&self, filter: &DeleteFilter) -> Result<usize> {
        RetentionManager::new(&self.client, &self.config.namespace).delete_snapshots(filter)
    }

    /// Where the sandbox's server can be reached
    pub fn endpoint(&self) -> Result<Endpoint> {
        resolve_endpoint(
            &self.client,
            &self.clock,
            &self.connection,
            &self.config.namespace,
            self.config.poll_interval(),
            self.config.sandbox_ready_timeout(),
        )
    }

    /// Current log output of the sandbox's pod
    pub fn pod_logs(&self) -> Result<String> {
        self.client.pod_logs(&self.config.namespace, &self.pod_name)
    }

    /// End the session, deleting triggers and (unless kept) the claim
    pub fn close(mut self) -> CleanupReport {
        self.finish()
    }

    fn finish(&mut self) -> CleanupReport {
        if self.closed {
            return CleanupReport::default();
        }
        self.closed = true;
        if self.keep_sandbox {
            if let Some(claim) = self.cleanup.release_claim() {
                info!(claim = %claim, "Keeping sandbox claim");
            }
        }
        self.cleanup.run(&self.client)
    }
}

impl<C: ResourceClient, K: Clock> Drop for SnapshotSession<C, K> {
    fn drop(&mut self) {
        if !self.closed {
            debug!(sandbox = %self.sandbox_name, "Session dropped without close");
            self.finish();
        }
    }
}

fn wait_for_sandbox<C, K>(
    client: &C,
    clock: &K,
    config: &ClientConfig,
    sandbox_name: &str,
) -> Result<String>
where
    C: ResourceClient + ?Sized,
    K: Clock + ?Sized,
{
    let api = Api::<Sandbox, C>::namespaced(client, &config.namespace);
    let deadline = config.sandbox_ready_timeout();
    let check = |_attempt: usize| -> Result<PollStatus<String>> {
        Ok(match api.get_opt(sandbox_name)? {
            Some(sandbox) if sandbox.is_ready() => match sandbox.pod_name() {
                Some(pod) => PollStatus::Done(pod.to_string()),
                None => PollStatus::Pending,
            },
            _ => PollStatus::Pending,
        })
    };

    match poll_until(
        "sandbox_ready",
        clock,
        PollPolicy::new(config.poll_interval(), deadline),
        check,
    ) {
        Ok(pod_name) => {
            info!(sandbox = sandbox_name, pod = %pod_name, "Sandbox is ready");
            Ok(pod_name)
        }
        Err(PollError::DeadlineExceeded { .. }) => Err(SnapshotError::sandbox(format!(
            "Sandbox '{sandbox_name}' did not become ready within {deadline:?}"
        ))),
        Err(PollError::Check { error, .. }) => Err(error),
    }
}
