//! Health assessment
//!
//! A container is healthy when it is running and attached to every
//! network its manifest entry requires. The verdict is always computed from the
//! snapshot at hand; nothing carries over between cycles.

use crate::manifest::ContainerSpec;
use crate::runtime::{ObservedState, RunStatus};
use std::fmt;

/// Why a container needs repair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// The container is not in the running state
    NotRunning(RunStatus),
    /// A required network is not attached
    MissingNetwork(String),
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::NotRunning(status) => write!(f, "not running ({})", status),
            Finding::MissingNetwork(network) => write!(f, "missing network {}", network),
        }
    }
}

/// Health verdict for one snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy { findings: Vec<Finding> },
}

impl HealthStatus {
    #[cfg(test)]
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// One-line summary of the findings
    pub fn summary(&self) -> String {
        match self {
            HealthStatus::Healthy => "healthy".to_string(),
            HealthStatus::Unhealthy { findings } => findings
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Compare a snapshot with the declared container
pub fn assess(spec: &ContainerSpec, observed: &ObservedState) -> HealthStatus {
    let mut findings = Vec::new();

    if !observed.status.is_running() {
        findings.push(Finding::NotRunning(observed.status.clone()));
    }

    findings.extend(
        spec.networks
            .iter()
            .filter(|n| !observed.is_attached(n))
            .map(|n| Finding::MissingNetwork(n.clone())),
    );

    if findings.is_empty() {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy { findings }
    }
}
