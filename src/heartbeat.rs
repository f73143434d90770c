//! Liveness file for external health probes
//!
//! Overwrites a file with the current UTC timestamp on a fixed interval.
//! A probe that sees the file go stale knows the process is wedged.

use chrono::{SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Write the current timestamp to `path`
pub async fn beat(path: &Path) -> Result<()> {
    let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    tokio::fs::write(path, format!("{}\n", stamp)).await?;
    Ok(())
}

/// Write the liveness file every `interval` until cancelled
///
/// The first write happens immediately. Failed writes are logged and the
/// task keeps going.
pub async fn run(path: PathBuf, interval: Duration, cancel: CancellationToken) {
    info!(file = %path.display(), interval = ?interval, "Heartbeat started");

    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match beat(&path).await {
                    Ok(()) => debug!(file = %path.display(), "Heartbeat written"),
                    Err(e) => warn!(file = %path.display(), error = %e, "Failed to write heartbeat"),
                }
            }
        }
    }

    info!(file = %path.display(), "Heartbeat stopped");
}
