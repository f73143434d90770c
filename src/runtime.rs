//! Container runtime capability
//!
//! The reconciliation engine talks to the runtime only through
//! [`ContainerRuntime`]. Every call is a self-contained round trip and
//! nothing is cached, so one instance is shared by all watch tasks.

pub mod docker;

#[cfg(test)]
pub mod fake;

use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt;

pub use docker::DockerRuntime;

/// Run status reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Stopped,
    /// Paused, restarting, removing and anything else
    Other(String),
}

impl RunStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Stopped => write!(f, "stopped"),
            RunStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Snapshot of a container, fetched fresh for every check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedState {
    pub status: RunStatus,
    /// Names of the networks currently attached
    pub networks: BTreeSet<String>,
}

impl ObservedState {
    #[cfg(test)]
    pub fn new<S: Into<String>>(status: RunStatus, networks: impl IntoIterator<Item = S>) -> Self {
        Self {
            status,
            networks: networks.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_attached(&self, network: &str) -> bool {
        self.networks.contains(network)
    }
}

/// Narrow contract over the container runtime
///
/// Implementations must be safe to call from many tasks at once.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Inspect a container by name
    ///
    /// Fails when the container is unknown or the runtime is unreachable.
    async fn inspect(&self, container: &str) -> Result<ObservedState>;

    /// Start a container
    async fn start(&self, container: &str) -> Result<()>;

    /// Forcefully disconnect a container from a network
    async fn disconnect_network(&self, network: &str, container: &str) -> Result<()>;

    /// Connect a container to a network
    ///
    /// Commonly fails for a short while after a start, until the
    /// container's network namespace is ready.
    async fn connect_network(&self, network: &str, container: &str) -> Result<()>;
}
