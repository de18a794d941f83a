/*!
Health check for the snapshot controller.
*/

use crate::client::{Api, ResourceClient};
use crate::config::ControllerConfig;
use crate::resources::Pod;
use tracing::{debug, warn};

/// Whether the snapshot controller is up
///
/// True iff some pod in the controller namespace whose name contains the
/// controller name is Running and not reporting `Ready=False`. API errors
/// count as not ready. Never retries.
pub fn snapshot_controller_ready<C: ResourceClient + ?Sized>(
    client: &C,
    controller: &ControllerConfig,
) -> bool {
    let pods = match Api::<Pod, C>::namespaced(client, &controller.namespace).list() {
        Ok(pods) => pods,
        Err(e) => {
            warn!(
                namespace = %controller.namespace,
                error = %e,
                "Failed to list snapshot controller pods"
            );
            return false;
        }
    };

    let ready = pods.iter().any(|pod| {
        pod.metadata.name.contains(&controller.name) && pod.is_running() && pod.is_ready()
    });
    debug!(
        namespace = %controller.namespace,
        controller = %controller.name,
        pods = pods.len(),
        ready,
        "Checked snapshot controller readiness"
    );
    ready
}
