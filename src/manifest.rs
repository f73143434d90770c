//! Watch manifest parsing for Mooring
//!
//! Parses `config.yml` (or a `.toml` manifest) listing the containers to
//! watch and the networks each one must stay attached to.

use crate::compose;
use crate::error::{Error, Result};
use crate::retry::{self, RetryOutcome, RetryPolicy};
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A container and the networks it must be attached to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Container name as known by the runtime
    pub name: String,

    /// Required networks, in attach order
    #[serde(default)]
    pub networks: Vec<String>,
}

impl ContainerSpec {
    pub fn new<S: Into<String>>(name: impl Into<String>, networks: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            networks: networks.into_iter().map(Into::into).collect(),
        }
    }
}

/// Root manifest structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
}

impl Manifest {
    /// Validate the manifest
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for container in &self.containers {
            if container.name.trim().is_empty() {
                return Err(Error::ManifestValidation(
                    "Container with an empty name".into(),
                ));
            }
            if !names.insert(container.name.as_str()) {
                return Err(Error::ManifestValidation(format!(
                    "Duplicate container name: {}",
                    container.name
                )));
            }

            let mut networks = HashSet::new();
            for network in &container.networks {
                if network.trim().is_empty() {
                    return Err(Error::ManifestValidation(format!(
                        "Container '{}' lists an empty network name",
                        container.name
                    )));
                }
                if !networks.insert(network.as_str()) {
                    return Err(Error::ManifestValidation(format!(
                        "Container '{}' lists network '{}' twice",
                        container.name, network
                    )));
                }
            }
        }
        Ok(())
    }

    /// Containers that have at least one required network
    ///
    /// A container without networks is trivially healthy as far as
    /// attachment goes, so it is never watched.
    pub fn active(&self) -> impl Iterator<Item = &ContainerSpec> {
        self.containers.iter().filter(|c| !c.networks.is_empty())
    }

    /// Serialize as the YAML document read by [`load`]
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Manifest format, chosen from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Toml,
}

impl Format {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Format::Toml,
            _ => Format::Yaml,
        }
    }
}

/// Parse manifest content
pub fn parse(content: &str, path: &Path) -> Result<Manifest> {
    let parse_err = |message: String| Error::ManifestParse {
        path: path.to_path_buf(),
        message,
    };

    let manifest: Manifest = match Format::of(path) {
        Format::Toml => toml::from_str(content).map_err(|e| parse_err(e.to_string()))?,
        Format::Yaml if content.trim().is_empty() => Manifest::default(),
        Format::Yaml => serde_yaml::from_str(content).map_err(|e| parse_err(e.to_string()))?,
    };

    manifest.validate()?;
    Ok(manifest)
}

/// Load the manifest from a file
pub fn load(path: &Path) -> Result<Manifest> {
    let content = fs::read_to_string(path).map_err(|e| Error::ManifestRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse(&content, path)
}

/// Where the manifest comes from
#[derive(Debug, Clone)]
pub struct Sources {
    /// Manifest path, written by derivation and then read
    pub manifest: PathBuf,
    /// Compose file used to derive the manifest when present
    pub compose: PathBuf,
    /// Optional `.env` file used for compose interpolation
    pub env_file: PathBuf,
}

/// Derive the manifest from the compose file (when there is one) and load it
///
/// Derivation problems are logged only; the manifest on disk, if any, is
/// still used.
pub fn acquire_once(sources: &Sources, settings: &Settings) -> Result<Manifest> {
    if sources.compose.exists() {
        match compose::derive_to_file(
            &sources.compose,
            &sources.env_file,
            &settings.network_pattern,
            &sources.manifest,
        ) {
            Ok(derived) => info!(
                compose = %sources.compose.display(),
                manifest = %sources.manifest.display(),
                containers = derived.containers.len(),
                "Derived manifest from compose file"
            ),
            Err(e) => warn!(error = %e, "Failed to derive manifest from compose file"),
        }
    }

    load(&sources.manifest)
}

/// Obtain the manifest at startup, retrying a bounded number of times
pub async fn acquire(
    sources: &Sources,
    settings: &Settings,
    cancel: &CancellationToken,
) -> Result<Manifest> {
    let policy = RetryPolicy::bounded(settings.manifest_retry, settings.manifest_attempts);

    let outcome = retry::retry(
        &policy,
        cancel,
        |attempt| {
            let result = acquire_once(sources, settings);
            if let Err(e) = &result {
                warn!(
                    attempt,
                    max_attempts = settings.manifest_attempts,
                    error = %e,
                    "Manifest not available yet, retrying in {:?}",
                    settings.manifest_retry
                );
            }
            std::future::ready(result)
        },
        || std::future::ready(true),
    )
    .await;

    if !matches!(outcome, RetryOutcome::Succeeded { .. }) {
        warn!(attempts = outcome.attempts(), "Giving up on the manifest");
    }

    match outcome {
        RetryOutcome::Succeeded { value, .. } => Ok(value),
        RetryOutcome::Exhausted { last_error, .. } => Err(last_error),
        RetryOutcome::Abandoned { last_error, .. } => Err(last_error),
        RetryOutcome::Cancelled { .. } => Err(Error::Interrupted),
    }
}
