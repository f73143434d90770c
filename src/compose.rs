//! Manifest derivation from a compose file
//!
//! Reads `docker-compose.yml` (plus an optional `.env`), expands variables
//! in its values, and turns every service replica into a [`ContainerSpec`] listing the
//! real network names it must stay attached to.

pub mod dotenv;
pub mod interpolate;

use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};
use crate::manifest::{ContainerSpec, Manifest};

/// The parts of a compose file that matter for derivation
#[derive(Debug, Default, Deserialize)]
pub struct ComposeFile {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub services: BTreeMap<String, Option<Service>>,

    #[serde(default)]
    pub networks: BTreeMap<String, Option<NetworkDecl>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub container_name: Option<String>,

    #[serde(default)]
    pub deploy: Option<Deploy>,

    #[serde(default)]
    pub networks: Option<ServiceNetworks>,

    #[serde(default)]
    pub network_mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Deploy {
    #[serde(default)]
    pub replicas: Option<u32>,
}

/// `networks:` under a service, either `[a, b]` or a map keyed by alias
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ServiceNetworks {
    List(Vec<String>),
    Map(serde_yaml::Mapping),
}

impl ServiceNetworks {
    /// Aliases in declared order
    fn aliases(&self) -> Vec<String> {
        match self {
            ServiceNetworks::List(list) => list.clone(),
            ServiceNetworks::Map(map) => map
                .iter()
                .filter_map(|(k, _)| k.as_str().map(str::to_string))
                .collect(),
        }
    }
}

/// A top-level network declaration
#[derive(Debug, Default, Deserialize)]
pub struct NetworkDecl {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub external: Option<External>,
}

/// `external: true` or the legacy `external: { name: x }`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum External {
    Flag(bool),
    Legacy { name: Option<String> },
}

impl ComposeFile {
    /// Parse compose text, expanding variables in its values
    pub fn parse(
        text: &str,
        path: &Path,
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let parse_error = |e: serde_yaml::Error| Error::ComposeParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let doc: serde_yaml::Value = serde_yaml::from_str(text).map_err(parse_error)?;
        if doc.is_null() {
            return Ok(Self::default());
        }
        serde_yaml::from_value(interpolate::interpolate_value(doc, lookup)).map_err(parse_error)
    }

    /// Real network name for a service-level alias
    pub fn network_name(&self, alias: &str, project: &str) -> String {
        match self.networks.get(alias) {
            Some(Some(decl)) => {
                if let Some(name) = &decl.name {
                    return name.clone();
                }
                match &decl.external {
                    Some(External::Legacy { name: Some(name) }) => name.clone(),
                    Some(External::Legacy { name: None }) | Some(External::Flag(true)) => {
                        alias.to_string()
                    }
                    Some(External::Flag(false)) | None => format!("{}_{}", project, alias),
                }
            }
            Some(None) => format!("{}_{}", project, alias),
            None if alias == "default" => format!("{}_default", project),
            None => alias.to_string(),
        }
    }
}

impl Service {
    fn aliases(&self) -> Vec<String> {
        match (&self.networks, &self.network_mode) {
            (Some(networks), _) => networks.aliases(),
            (None, Some(_)) => Vec::new(),
            (None, None) => vec!["default".to_string()],
        }
    }

    fn replicas(&self) -> u32 {
        self.deploy.as_ref().and_then(|d| d.replicas).unwrap_or(1)
    }

    fn container_names(&self, project: &str, service: &str) -> Vec<String> {
        let replicas = self.replicas();
        if let Some(name) = &self.container_name {
            return (0..replicas).map(|_| name.clone()).collect();
        }
        match replicas {
            1 => vec![format!("{}-{}", project, service)],
            n => (1..=n).map(|i| format!("{}-{}-{}", project, service, i)).collect(),
        }
    }
}

/// Lowercase and keep only `[a-z0-9_-]`, as compose does for project names
pub fn normalize_project_name(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect::<String>()
        .trim_start_matches(['_', '-'])
        .to_string()
}

fn project_name(
    file: &ComposeFile,
    compose_path: &Path,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<String> {
    let raw = file
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .or_else(|| lookup("COMPOSE_PROJECT_NAME").filter(|n| !n.trim().is_empty()))
        .or_else(|| {
            let dir = compose_path.parent()?;
            let dir = if dir.as_os_str().is_empty() {
                std::env::current_dir().ok()?
            } else {
                dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf())
            };
            dir.file_name().map(|n| n.to_string_lossy().into_owned())
        })
        .ok_or_else(|| Error::ComposeProjectName(compose_path.to_path_buf()))?;

    let project = normalize_project_name(&raw);
    if project.is_empty() {
        return Err(Error::ComposeProjectName(compose_path.to_path_buf()));
    }
    Ok(project)
}

/// Derive a manifest from compose text
///
/// `lookup` resolves interpolation variables and `COMPOSE_PROJECT_NAME`.
pub fn derive_from_str(
    raw: &str,
    compose_path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
    pattern: &Regex,
) -> Result<Manifest> {
    let file = ComposeFile::parse(raw, compose_path, &lookup)?;
    let project = project_name(&file, compose_path, &lookup)?;

    let mut containers = Vec::new();
    for (service_name, service) in &file.services {
        let Some(service) = service else {
            continue;
        };

        let mut networks = Vec::new();
        for alias in service.aliases() {
            let name = file.network_name(&alias, &project);
            if !pattern.is_match(&name) {
                debug!(service = %service_name, network = %name, "Network filtered out by pattern");
                continue;
            }
            if !networks.contains(&name) {
                networks.push(name);
            }
        }

        if networks.is_empty() {
            debug!(service = %service_name, "Service has no matching network, skipped");
            continue;
        }

        for container in service.container_names(&project, service_name) {
            containers.push(ContainerSpec::new(container, networks.iter().cloned()));
        }
    }

    let manifest = Manifest { containers };
    manifest.validate()?;
    Ok(manifest)
}

/// Derive a manifest from a compose file and an optional `.env` file
pub fn derive(compose_path: &Path, env_file: &Path, pattern: &Regex) -> Result<Manifest> {
    let env = dotenv::load(env_file);
    let raw = fs::read_to_string(compose_path).map_err(|e| Error::ComposeRead {
        path: compose_path.to_path_buf(),
        source: e,
    })?;

    derive_from_str(
        &raw,
        compose_path,
        |key| env.get(key).cloned().or_else(|| std::env::var(key).ok()),
        pattern,
    )
}

/// Derive a manifest and write it where the watcher reads it
pub fn derive_to_file(
    compose_path: &Path,
    env_file: &Path,
    pattern: &Regex,
    manifest_path: &Path,
) -> Result<Manifest> {
    let manifest = derive(compose_path, env_file, pattern)?;
    fs::write(manifest_path, manifest.to_yaml()?)?;
    Ok(manifest)
}
