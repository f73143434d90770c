//! Docker Engine implementation of the runtime capability
//!
//! Uses bollard against the daemon named by `DOCKER_HOST` (a unix socket
//! or plain TCP), or the default local socket. Each call is bounded by a
//! timeout so a hung daemon cannot park a watch task forever.

use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, StartContainerOptions};
use bollard::models::{ContainerInspectResponse, ContainerStateStatusEnum, EndpointSettings};
use bollard::network::{ConnectNetworkOptions, DisconnectNetworkOptions};
use bollard::{Docker, API_DEFAULT_VERSION};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::runtime::{ContainerRuntime, ObservedState, RunStatus};
use crate::settings::Settings;

/// Read/write timeout of the HTTP client, bollard's own default
const CLIENT_TIMEOUT_SECS: u64 = 120;

/// Where the daemon listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// The platform's default socket
    Local,
    /// A unix socket or named pipe, scheme included
    Socket(String),
    /// Plain HTTP over TCP, scheme included
    Http(String),
}

impl Endpoint {
    /// Pick the transport for a `DOCKER_HOST` value
    pub fn resolve(host: Option<&str>, tls: bool) -> Result<Self> {
        let Some(host) = host else {
            return Ok(Endpoint::Local);
        };

        if host.starts_with("unix://") || host.starts_with("npipe://") {
            return Ok(Endpoint::Socket(host.to_string()));
        }
        if host.starts_with("https://") || (tls && host.starts_with("tcp://")) {
            return Err(Error::Runtime(format!(
                "TLS connections to the Docker daemon are not supported: {}",
                host
            )));
        }
        if host.starts_with("tcp://") || host.starts_with("http://") {
            return Ok(Endpoint::Http(host.to_string()));
        }

        Err(Error::Runtime(format!("Unsupported DOCKER_HOST scheme: {}", host)))
    }
}

/// Runtime backed by the Docker Engine API
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
    call_timeout: Duration,
}

impl DockerRuntime {
    /// Build a client for the daemon named in the settings
    ///
    /// Only a missing socket file fails here. No request is made, so an
    /// unreachable daemon shows up as failing inspections later.
    pub fn connect(settings: &Settings) -> Result<Self> {
        let endpoint = Endpoint::resolve(settings.docker_host.as_deref(), settings.docker_tls)?;
        Self::connect_to(&endpoint, settings.runtime_timeout)
    }

    pub fn connect_to(endpoint: &Endpoint, call_timeout: Duration) -> Result<Self> {
        let docker = match endpoint {
            Endpoint::Local => Docker::connect_with_socket_defaults()?,
            Endpoint::Socket(path) => {
                Docker::connect_with_socket(path, CLIENT_TIMEOUT_SECS, API_DEFAULT_VERSION)?
            }
            Endpoint::Http(addr) => {
                Docker::connect_with_http(addr, CLIENT_TIMEOUT_SECS, API_DEFAULT_VERSION)?
            }
        };
        debug!(endpoint = ?endpoint, timeout = ?call_timeout, "Docker client configured");
        Ok(Self {
            docker,
            call_timeout,
        })
    }

    async fn bounded<T, F>(&self, operation: &'static str, container: &str, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, bollard::errors::Error>>,
    {
        // Zero disables the bound
        if self.call_timeout.is_zero() {
            return call.await.map_err(Error::from);
        }

        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::RuntimeTimeout {
                operation,
                container: container.to_string(),
                seconds: self.call_timeout.as_secs(),
            }),
        }
    }
}

/// Map the daemon's status to the engine's view
fn run_status(status: Option<ContainerStateStatusEnum>) -> RunStatus {
    match status {
        Some(ContainerStateStatusEnum::RUNNING) => RunStatus::Running,
        Some(ContainerStateStatusEnum::EXITED)
        | Some(ContainerStateStatusEnum::CREATED)
        | Some(ContainerStateStatusEnum::DEAD) => RunStatus::Stopped,
        Some(other) => RunStatus::Other(other.to_string()),
        None => RunStatus::Other("unknown".to_string()),
    }
}

fn observed_state(info: ContainerInspectResponse) -> ObservedState {
    let status = run_status(info.state.and_then(|s| s.status));
    let networks = info
        .network_settings
        .and_then(|n| n.networks)
        .map(|m| m.into_keys().collect())
        .unwrap_or_default();

    ObservedState { status, networks }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn inspect(&self, container: &str) -> Result<ObservedState> {
        let info = self
            .bounded(
                "inspect",
                container,
                self.docker
                    .inspect_container(container, None::<InspectContainerOptions>),
            )
            .await?;
        Ok(observed_state(info))
    }

    async fn start(&self, container: &str) -> Result<()> {
        self.bounded(
            "start",
            container,
            self.docker
                .start_container(container, None::<StartContainerOptions<String>>),
        )
        .await
    }

    async fn disconnect_network(&self, network: &str, container: &str) -> Result<()> {
        let options = DisconnectNetworkOptions {
            container,
            force: true,
        };
        self.bounded(
            "network disconnect",
            container,
            self.docker.disconnect_network(network, options),
        )
        .await
    }

    async fn connect_network(&self, network: &str, container: &str) -> Result<()> {
        let options = ConnectNetworkOptions {
            container,
            endpoint_config: EndpointSettings::default(),
        };
        self.bounded(
            "network connect",
            container,
            self.docker.connect_network(network, options),
        )
        .await
    }
}
