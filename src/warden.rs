//! The Warden - Container Supervisor
//!
//! Runs one watch task per manifest container:
//! - Waits the initial grace period before the first check
//! - Keeps every container's loop independent of the others
//! - Optionally keeps a liveness file fresh alongside
//! - Stops everything when the shared cancellation token fires

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::heartbeat;
use crate::manifest::Manifest;
use crate::retry::sleep_or_cancel;
use crate::runtime::ContainerRuntime;
use crate::settings::Settings;
use crate::sickbay::{ContainerWatch, WatchTiming};

/// What a supervised task was doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Duty {
    Watch(String),
    Heartbeat,
}

/// Supervises all watch loops
pub struct Warden {
    runtime: Arc<dyn ContainerRuntime>,
    timing: WatchTiming,
    init_wait: Duration,
    heartbeat: Option<(PathBuf, Duration)>,
    cancel: CancellationToken,
}

impl Warden {
    /// Create a new Warden over the given runtime
    pub fn new(runtime: Arc<dyn ContainerRuntime>, settings: &Settings) -> Self {
        Self {
            runtime,
            timing: WatchTiming::from(settings),
            init_wait: settings.init_wait,
            heartbeat: settings
                .healthcheck_file
                .clone()
                .map(|path| (path, settings.healthcheck_interval)),
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the Warden and every task it runs
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Supervise the manifest's containers until cancelled
    ///
    /// Returns once every task has ended, which only happens after
    /// cancellation in normal operation.
    pub async fn run(&self, manifest: &Manifest) -> Vec<Duty> {
        let mut tasks: JoinSet<Duty> = JoinSet::new();

        if let Some((path, interval)) = &self.heartbeat {
            let (path, interval, cancel) = (path.clone(), *interval, self.cancel.clone());
            tasks.spawn(async move {
                heartbeat::run(path, interval, cancel).await;
                Duty::Heartbeat
            });
        }

        let skipped = manifest.containers.len() - manifest.active().count();
        if skipped > 0 {
            info!(skipped, "Skipping containers without required networks");
        }

        info!("Warden: Waiting {:?} before the first check", self.init_wait);
        if !sleep_or_cancel(self.init_wait, &self.cancel).await {
            info!("Warden: Shutdown requested during initial wait");
            return drain(tasks).await;
        }

        let mut watched = 0usize;
        for spec in manifest.active() {
            let mut watch = ContainerWatch::new(
                Arc::new(spec.clone()),
                Arc::clone(&self.runtime),
                self.timing,
            );
            let cancel = self.cancel.clone();
            tasks.spawn(async move {
                watch.run(cancel).await;
                Duty::Watch(watch.name().to_string())
            });
            watched += 1;
        }

        if watched == 0 {
            warn!("Warden: No container with required networks, nothing to watch");
        } else {
            info!(containers = watched, "Warden: Supervising containers");
        }

        // Stay up with nothing to watch so a restart policy doesn't loop us
        if tasks.is_empty() {
            self.cancel.cancelled().await;
        }

        drain(tasks).await
    }
}

/// Wait for every task, logging the ones that died
async fn drain(mut tasks: JoinSet<Duty>) -> Vec<Duty> {
    let mut finished = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(duty) => {
                if let Duty::Watch(container) = &duty {
                    debug!(container = %container, "Watch task ended");
                }
                finished.push(duty);
            }
            Err(e) if e.is_panic() => error!(error = %e, "Warden: Supervised task panicked"),
            Err(e) => warn!(error = %e, "Warden: Supervised task aborted"),
        }
    }
    finished
}

/// Resolve on SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ContainerSpec;
    use crate::runtime::fake::{self, FakeRuntime};
    use tokio::time::Instant;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        })
        .unwrap()
    }

    fn manifest(specs: Vec<ContainerSpec>) -> Manifest {
        Manifest { containers: specs }
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_wait_precedes_first_check() {
        let rt = Arc::new(FakeRuntime::new());
        rt.on_inspect("web", [fake::running(&["front"])]);
        let warden = Warden::new(rt.clone(), &settings(&[("INIT_WAIT_TIME_SECONDS", "45")]));
        let cancel = warden.cancellation();
        let t0 = Instant::now();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(50)).await;
            cancel.cancel();
        });
        let finished = warden
            .run(&manifest(vec![ContainerSpec::new("web", ["front"])]))
            .await;

        let calls = rt.timed_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0 - t0, Duration::from_secs(45));
        assert_eq!(finished, vec![Duty::Watch("web".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_containers_without_networks_are_not_watched() {
        let rt = Arc::new(FakeRuntime::new());
        rt.on_inspect("web", [fake::running(&["front"])]);
        let warden = Warden::new(rt.clone(), &settings(&[("INIT_WAIT_TIME_SECONDS", "0")]));
        let cancel = warden.cancellation();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });
        warden
            .run(&manifest(vec![
                ContainerSpec::new("web", ["front"]),
                ContainerSpec::new("cron", Vec::<String>::new()),
            ]))
            .await;

        assert!(rt.calls_for("cron").is_empty());
        assert_eq!(rt.calls_for("web").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_container_does_not_affect_another() {
        let rt = Arc::new(FakeRuntime::new());
        // "broken" has no scripted inspect reply: every inspect fails
        rt.on_inspect("web", [fake::running(&["front"])]);
        let warden = Warden::new(
            rt.clone(),
            &settings(&[("INIT_WAIT_TIME_SECONDS", "0"), ("CHECK_FREQUENCY_SECONDS", "60")]),
        );
        let cancel = warden.cancellation();
        let t0 = Instant::now();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60 * 4 + 1)).await;
            cancel.cancel();
        });
        warden
            .run(&manifest(vec![
                ContainerSpec::new("broken", ["front"]),
                ContainerSpec::new("web", ["front"]),
            ]))
            .await;

        let broken = rt.calls_for("broken");
        assert_eq!(broken.len(), 5);
        assert!(broken.iter().all(|c| !c.is_mutation()));

        let web_times: Vec<Duration> = rt
            .timed_calls()
            .into_iter()
            .filter(|(_, c)| c.container() == "web")
            .map(|(at, _)| at - t0)
            .collect();
        let expected: Vec<Duration> = (0..5).map(|i| Duration::from_secs(60 * i)).collect();
        assert_eq!(web_times, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_reconnect_does_not_block_other_container() {
        let rt = Arc::new(FakeRuntime::new());
        rt.on_inspect("stuck", [fake::stopped(&[]), fake::running(&[])]);
        rt.on_connect("front", "stuck", [Err("netns not ready")]);
        rt.on_inspect("web", [fake::running(&["front"])]);
        let warden = Warden::new(
            rt.clone(),
            &settings(&[("INIT_WAIT_TIME_SECONDS", "0"), ("CHECK_FREQUENCY_SECONDS", "30")]),
        );
        let cancel = warden.cancellation();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(121)).await;
            cancel.cancel();
        });
        warden
            .run(&manifest(vec![
                ContainerSpec::new("stuck", ["front"]),
                ContainerSpec::new("web", ["front"]),
            ]))
            .await;

        // web keeps its schedule: 0, 30, 60, 90, 120
        assert_eq!(rt.calls_for("web").len(), 5);
        // stuck never leaves its first repair
        let stuck = rt.calls_for("stuck");
        assert_eq!(stuck.iter().filter(|c| matches!(c, fake::Call::Start(_))).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_initial_wait() {
        let rt = Arc::new(FakeRuntime::new());
        let warden = Warden::new(rt.clone(), &settings(&[("INIT_WAIT_TIME_SECONDS", "600")]));
        warden.cancellation().cancel();

        let finished = warden
            .run(&manifest(vec![ContainerSpec::new("web", ["front"])]))
            .await;

        assert!(finished.is_empty());
        assert!(rt.calls().is_empty());
    }

    #[tokio::test]
    async fn test_heartbeat_runs_alongside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alive");
        let rt = Arc::new(FakeRuntime::new());
        let path_str = path.to_string_lossy().to_string();
        let warden = Warden::new(
            rt.clone(),
            &settings(&[("INIT_WAIT_TIME_SECONDS", "0"), ("HEALTHCHECK_FILE", path_str.as_str())]),
        );
        let cancel = warden.cancellation();

        let watcher = {
            let path = path.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    if path.exists() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                cancel.cancel();
            })
        };
        let finished = warden.run(&manifest(Vec::new())).await;
        watcher.await.unwrap();

        assert!(path.exists());
        assert_eq!(finished, vec![Duty::Heartbeat]);
    }
}
