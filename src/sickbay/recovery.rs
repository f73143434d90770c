//! Repair of an unhealthy container
//!
//! Detach from every required network, start the container once, then
//! reattach each network in declared order, retrying until it sticks or
//! the container stops running.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::manifest::ContainerSpec;
use crate::retry::{self, RetryOutcome, RetryPolicy};
use crate::runtime::ContainerRuntime;

/// Result of a repair pass
#[derive(Debug)]
pub enum RepairOutcome {
    /// Started and attached to every required network
    Reattached,
    /// The start call failed; no network was connected
    StartFailed(Error),
    /// The container went down while `network` was being connected
    Abandoned { network: String },
    /// Shutdown was requested mid-repair
    Cancelled,
}

/// Repair one container
pub async fn repair(
    runtime: &dyn ContainerRuntime,
    spec: &ContainerSpec,
    reconnect: &RetryPolicy,
    cancel: &CancellationToken,
) -> RepairOutcome {
    detach_all(runtime, spec).await;

    if let Err(e) = runtime.start(&spec.name).await {
        return RepairOutcome::StartFailed(e);
    }
    info!(container = %spec.name, "Container started");

    for network in &spec.networks {
        match reattach(runtime, &spec.name, network, reconnect, cancel).await {
            RetryOutcome::Succeeded { attempts, .. } => {
                info!(container = %spec.name, network = %network, attempts, "Connected to network");
            }
            RetryOutcome::Abandoned { attempts, .. } | RetryOutcome::Exhausted { attempts, .. } => {
                warn!(
                    container = %spec.name,
                    network = %network,
                    attempts,
                    "Container no longer running, abandoning network reconnection"
                );
                return RepairOutcome::Abandoned {
                    network: network.clone(),
                };
            }
            RetryOutcome::Cancelled { .. } => return RepairOutcome::Cancelled,
        }
    }

    RepairOutcome::Reattached
}

/// Disconnect every required network; failures are expected and skipped
async fn detach_all(runtime: &dyn ContainerRuntime, spec: &ContainerSpec) {
    for network in &spec.networks {
        match runtime.disconnect_network(network, &spec.name).await {
            Ok(()) => debug!(container = %spec.name, network = %network, "Disconnected from network"),
            Err(e) => debug!(
                container = %spec.name,
                network = %network,
                error = %e,
                "Disconnect failed, continuing"
            ),
        }
    }
}

/// Connect one network, re-checking liveness before every retry
async fn reattach(
    runtime: &dyn ContainerRuntime,
    container: &str,
    network: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> RetryOutcome<(), Error> {
    retry::retry(
        policy,
        cancel,
        move |attempt| async move {
            let result = runtime.connect_network(network, container).await;
            if let Err(e) = &result {
                warn!(
                    container,
                    network,
                    attempt,
                    error = %e,
                    "Failed to connect network, retrying in {:?}",
                    policy.interval
                );
            }
            result
        },
        move || still_running(runtime, container),
    )
    .await
}

async fn still_running(runtime: &dyn ContainerRuntime, container: &str) -> bool {
    match runtime.inspect(container).await {
        Ok(state) => state.status.is_running(),
        Err(e) => {
            warn!(container, error = %e, "Failed to re-inspect container during reconnect");
            false
        }
    }
}
