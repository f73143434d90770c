//! Per-container watch loop
//!
//! One `ContainerWatch` runs per watched container, in its own task. A
//! cycle inspects the container, repairs it when unhealthy, and the loop
//! sleeps the check interval before the next cycle. Every failure is
//! logged and absorbed here; nothing escapes to other containers.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::manifest::ContainerSpec;
use crate::retry::{sleep_or_cancel, RetryPolicy};
use crate::runtime::ContainerRuntime;
use crate::settings::Settings;
use crate::sickbay::checker::{assess, HealthStatus};
use crate::sickbay::cycle::{Cycle, CycleEvent, Phase};
use crate::sickbay::recovery::{repair, RepairOutcome};

/// Intervals used by a watch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchTiming {
    /// Sleep between two cycles
    pub check_interval: Duration,
    /// Sleep between two network connect attempts
    pub reconnect_interval: Duration,
}

impl From<&Settings> for WatchTiming {
    fn from(settings: &Settings) -> Self {
        Self {
            check_interval: settings.check_interval,
            reconnect_interval: settings.reconnect_interval,
        }
    }
}

/// How a single cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Running and attached everywhere, nothing done
    Healthy,
    /// Inspection failed, repair not attempted
    InspectFailed,
    /// Start failed, networks left alone
    StartFailed,
    /// Restarted and reattached to every network
    Repaired,
    /// Container went down while connecting `network`
    Abandoned { network: String },
    /// Shutdown requested mid-cycle
    Cancelled,
}

/// Watch loop state for one container
pub struct ContainerWatch {
    spec: Arc<ContainerSpec>,
    runtime: Arc<dyn ContainerRuntime>,
    timing: WatchTiming,
    cycle: Cycle,
    cycles: u64,
    repairs: u64,
}

impl ContainerWatch {
    pub fn new(
        spec: Arc<ContainerSpec>,
        runtime: Arc<dyn ContainerRuntime>,
        timing: WatchTiming,
    ) -> Self {
        Self {
            spec,
            runtime,
            timing,
            cycle: Cycle::new(),
            cycles: 0,
            repairs: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Current cycle phase
    pub fn phase(&self) -> Phase {
        self.cycle.phase()
    }

    /// Run cycles until cancelled
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(
            container = %self.spec.name,
            networks = ?self.spec.networks,
            interval = ?self.timing.check_interval,
            "Watching container"
        );

        loop {
            match self.run_cycle(&cancel).await {
                CycleOutcome::Cancelled => break,
                CycleOutcome::Repaired => self.repairs += 1,
                CycleOutcome::Abandoned { network } => {
                    debug!(container = %self.spec.name, network = %network, "Repair left for the next cycle");
                }
                _ => {}
            }

            debug!(
                container = %self.spec.name,
                "Next check in {:?}",
                self.timing.check_interval
            );
            if !sleep_or_cancel(self.timing.check_interval, &cancel).await {
                break;
            }
        }

        info!(
            container = %self.spec.name,
            cycles = self.cycles,
            repairs = self.repairs,
            phase = ?self.phase(),
            "Stopped watching container"
        );
    }

    /// Run one inspect and repair cycle
    pub async fn run_cycle(&mut self, cancel: &CancellationToken) -> CycleOutcome {
        self.cycles += 1;
        self.advance(CycleEvent::Check);

        let observed = match self.runtime.inspect(&self.spec.name).await {
            Ok(observed) => observed,
            Err(e) => {
                warn!(container = %self.spec.name, error = %e, "Failed to inspect container");
                self.advance(CycleEvent::Settle);
                return CycleOutcome::InspectFailed;
            }
        };

        let outcome = match assess(&self.spec, &observed) {
            HealthStatus::Healthy => {
                debug!(container = %self.spec.name, status = %observed.status, "Container healthy");
                self.advance(CycleEvent::Pass);
                CycleOutcome::Healthy
            }
            status @ HealthStatus::Unhealthy { .. } => {
                warn!(
                    container = %self.spec.name,
                    findings = %status.summary(),
                    "Container unhealthy, restarting and reattaching networks"
                );
                self.advance(CycleEvent::Fail);

                let policy = RetryPolicy::unbounded(self.timing.reconnect_interval);
                match repair(self.runtime.as_ref(), &self.spec, &policy, cancel).await {
                    RepairOutcome::Reattached => {
                        info!(container = %self.spec.name, "Container repaired");
                        CycleOutcome::Repaired
                    }
                    RepairOutcome::StartFailed(e) => {
                        warn!(container = %self.spec.name, error = %e, "Failed to start container");
                        CycleOutcome::StartFailed
                    }
                    RepairOutcome::Abandoned { network } => CycleOutcome::Abandoned { network },
                    RepairOutcome::Cancelled => CycleOutcome::Cancelled,
                }
            }
        };

        self.advance(CycleEvent::Settle);
        outcome
    }

    fn advance(&mut self, event: CycleEvent) {
        if let Err(e) = self.cycle.fire(event) {
            debug!(
                container = %self.spec.name,
                event = ?event,
                phase = ?self.cycle.phase(),
                error = ?e,
                "Ignored cycle transition"
            );
        }
    }
}
