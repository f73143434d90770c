//! Tool settings read from the environment
//!
//! All keys are optional. Durations are whole seconds.

use crate::error::{Error, Result};
use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;

/// Regex applied to derived network names
pub const NETWORK_PATTERN: &str = "NETWORK_PATTERN";
/// Grace period before the first check
pub const INIT_WAIT_TIME: &str = "INIT_WAIT_TIME_SECONDS";
/// Interval between two checks of the same container
pub const CHECK_FREQUENCY: &str = "CHECK_FREQUENCY_SECONDS";
/// Delay between two attempts to connect a network
pub const NETWORK_RECONNECT_INTERVAL: &str = "NETWORK_RECONNECT_INTERVAL_SECONDS";
/// Liveness file path
pub const HEALTHCHECK_FILE: &str = "HEALTHCHECK_FILE";
/// Interval between two liveness file writes
pub const HEALTHCHECK_INTERVAL: &str = "HEALTHCHECK_INTERVAL_SECONDS";
/// Timeout applied to each runtime call
pub const RUNTIME_TIMEOUT: &str = "RUNTIME_TIMEOUT_SECONDS";
/// Number of manifest acquisition attempts at startup
pub const MANIFEST_LOAD_ATTEMPTS: &str = "MANIFEST_LOAD_ATTEMPTS";
/// Delay between manifest acquisition attempts
pub const MANIFEST_RETRY: &str = "MANIFEST_RETRY_SECONDS";
/// Docker daemon address, the local socket when unset
pub const DOCKER_HOST: &str = "DOCKER_HOST";
/// Any non-empty value turns on TLS for a TCP daemon
pub const DOCKER_TLS_VERIFY: &str = "DOCKER_TLS_VERIFY";

// Older deployments used these names
const CHECK_FREQUENCY_ALIAS: &str = "INTERVAL_TIME_SECONDS";
const NETWORK_RECONNECT_ALIAS: &str = "INTERVAL_NETWORK_RECONNECT_SECONDS";

const DEFAULT_NETWORK_PATTERN: &str = ".*";
const DEFAULT_INIT_WAIT: u64 = 60;
const DEFAULT_CHECK_FREQUENCY: u64 = 60;
const DEFAULT_RECONNECT_INTERVAL: u64 = 10;
const DEFAULT_HEALTHCHECK_INTERVAL: u64 = 30;
const DEFAULT_RUNTIME_TIMEOUT: u64 = 30;
const DEFAULT_MANIFEST_ATTEMPTS: u32 = 7;
const DEFAULT_MANIFEST_RETRY: u64 = 10;

/// Process-wide settings, immutable once loaded
#[derive(Debug, Clone)]
pub struct Settings {
    /// Filter applied to network names during compose derivation
    pub network_pattern: Regex,
    /// Wait before the first reconciliation cycle
    pub init_wait: Duration,
    /// Sleep between two reconciliation cycles of one container
    pub check_interval: Duration,
    /// Sleep between two network connect attempts
    pub reconnect_interval: Duration,
    /// Liveness file, heartbeat disabled when `None`
    pub healthcheck_file: Option<PathBuf>,
    /// Interval between liveness file writes
    pub healthcheck_interval: Duration,
    /// Upper bound for a single runtime call
    pub runtime_timeout: Duration,
    /// Attempts made to obtain the manifest at startup
    pub manifest_attempts: u32,
    /// Delay between two manifest attempts
    pub manifest_retry: Duration,
    /// Daemon address from `DOCKER_HOST`
    pub docker_host: Option<String>,
    /// Use TLS for a TCP daemon
    pub docker_tls: bool,
}

impl Settings {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| -> Option<(String, String)> {
            keys.iter().find_map(|key| {
                lookup(key)
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .map(|v| (key.to_string(), v))
            })
        };

        let pattern = get(&[NETWORK_PATTERN])
            .map(|(_, v)| v)
            .unwrap_or_else(|| DEFAULT_NETWORK_PATTERN.to_string());

        let manifest_attempts = match get(&[MANIFEST_LOAD_ATTEMPTS]) {
            Some((key, value)) => match value.parse::<u32>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    return Err(Error::InvalidSetting {
                        key,
                        value,
                        expected: "a positive integer",
                    });
                }
            },
            None => DEFAULT_MANIFEST_ATTEMPTS,
        };

        Ok(Self {
            network_pattern: Regex::new(&pattern)?,
            init_wait: seconds(get(&[INIT_WAIT_TIME]), DEFAULT_INIT_WAIT)?,
            check_interval: seconds(
                get(&[CHECK_FREQUENCY, CHECK_FREQUENCY_ALIAS]),
                DEFAULT_CHECK_FREQUENCY,
            )?,
            reconnect_interval: seconds(
                get(&[NETWORK_RECONNECT_INTERVAL, NETWORK_RECONNECT_ALIAS]),
                DEFAULT_RECONNECT_INTERVAL,
            )?,
            healthcheck_file: get(&[HEALTHCHECK_FILE]).map(|(_, v)| PathBuf::from(v)),
            healthcheck_interval: seconds(
                get(&[HEALTHCHECK_INTERVAL]),
                DEFAULT_HEALTHCHECK_INTERVAL,
            )?,
            runtime_timeout: seconds(get(&[RUNTIME_TIMEOUT]), DEFAULT_RUNTIME_TIMEOUT)?,
            manifest_attempts,
            manifest_retry: seconds(get(&[MANIFEST_RETRY]), DEFAULT_MANIFEST_RETRY)?,
            docker_host: get(&[DOCKER_HOST]).map(|(_, v)| v),
            docker_tls: get(&[DOCKER_TLS_VERIFY]).is_some(),
        })
    }
}

fn seconds(entry: Option<(String, String)>, default: u64) -> Result<Duration> {
    match entry {
        Some((key, value)) => value
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| Error::InvalidSetting {
                key,
                value,
                expected: "a non-negative number of seconds",
            }),
        None => Ok(Duration::from_secs(default)),
    }
}
