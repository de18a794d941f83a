/*!
# Podsnap Core

Client-side lifecycle management for pod snapshots of sandboxed workloads.

A snapshot controller running in the cluster does the actual checkpointing;
this crate drives it through its custom resources:

- Checkpoint a running sandbox on demand and wait for the result
- List the snapshots a policy produced, newest first
- Delete snapshots by identifier or by policy-scoped criteria
- Start a sandbox from an exact snapshot, from the controller's default, or
  fresh
- Clean up every trigger a session created, even when checkpoints failed

## Architecture

All cluster access goes through the [`ResourceClient`] port. The
[`KubectlClient`] adapter talks to a live cluster; [`MemoryResourceClient`]
keeps everything in process for tests. Waits are plain blocking poll loops
driven by an injectable clock from `podsnap-poll`.

## Usage

```rust,no_run
use podsnap_core::{ClientConfig, KubectlClient, SessionConfig, SnapshotSession};
use podsnap_poll::SystemClock;

let config = ClientConfig::from_env()?;
let client = KubectlClient::from_config(&config.kubectl);
let mut session = SnapshotSession::open(
    client,
    SystemClock,
    config,
    SessionConfig::new("python-counter-template"),
)?;

let outcome = session.checkpoint("counter-at-10s", None)?;
println!("snapshot: {:?}", outcome.snapshot_name);

let report = session.close();
assert!(report.is_clean());
# Ok::<(), podsnap_core::SnapshotError>(())
```
*/

pub mod catalog;
pub mod cleanup;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod observability;
pub mod readiness;
pub mod resolver;
pub mod resources;
pub mod retention;
pub mod session;
pub mod trigger;


pub use catalog::{sort_newest_first, PolicySummary, SnapshotCatalog, SnapshotRecord};
pub use cleanup::{CleanupReport, SessionCleanup};
pub use client::{Api, KubectlClient, MemoryResourceClient, ResourceClient};
pub use config::{parse_labels, ClientConfig, ConnectionConfig, ControllerConfig, SessionConfig};
pub use endpoint::{resolve_endpoint, Endpoint};
pub use error::{Result, SnapshotError};
pub use readiness::snapshot_controller_ready;
pub use resolver::{RestoreTarget, SnapshotReference, SnapshotResolver};
pub use resources::SnapshotPhase;
pub use retention::{DeleteFilter, RetentionManager};
pub use session::SnapshotSession;
pub use trigger::{CheckpointOutcome, TriggerCoordinator};
