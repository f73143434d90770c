//! Scripted in-memory runtime for tests
//!
//! Replies are queued per container (and per network for network calls).
//! The last queued reply sticks once the queue is down to one entry, so a
//! single scripted reply answers every call.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::runtime::{ContainerRuntime, ObservedState, RunStatus};

/// A recorded runtime call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Inspect(String),
    Start(String),
    Disconnect { network: String, container: String },
    Connect { network: String, container: String },
}

impl Call {
    pub fn container(&self) -> &str {
        match self {
            Call::Inspect(c) | Call::Start(c) => c,
            Call::Disconnect { container, .. } | Call::Connect { container, .. } => container,
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Call::Inspect(_))
    }
}

pub type Reply<T> = std::result::Result<T, &'static str>;

#[derive(Default)]
struct Script {
    inspect: HashMap<String, VecDeque<Reply<ObservedState>>>,
    start: HashMap<String, VecDeque<Reply<()>>>,
    disconnect: HashMap<(String, String), VecDeque<Reply<()>>>,
    connect: HashMap<(String, String), VecDeque<Reply<()>>>,
    calls: Vec<(Instant, Call)>,
}

fn next<T: Clone>(queue: Option<&mut VecDeque<Reply<T>>>, fallback: Reply<T>) -> Result<T> {
    let reply = match queue {
        Some(q) if q.len() > 1 => q.pop_front().unwrap_or(fallback),
        Some(q) => q.front().cloned().unwrap_or(fallback),
        None => fallback,
    };
    reply.map_err(|e| Error::Runtime(e.to_string()))
}

/// In-memory runtime that replays scripted replies and records calls
#[derive(Default)]
pub struct FakeRuntime {
    script: Mutex<Script>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_inspect(&self, container: &str, replies: impl IntoIterator<Item = Reply<ObservedState>>) {
        let mut script = self.script.lock().unwrap();
        script
            .inspect
            .entry(container.to_string())
            .or_default()
            .extend(replies);
    }

    pub fn on_start(&self, container: &str, replies: impl IntoIterator<Item = Reply<()>>) {
        let mut script = self.script.lock().unwrap();
        script
            .start
            .entry(container.to_string())
            .or_default()
            .extend(replies);
    }

    pub fn on_disconnect(
        &self,
        network: &str,
        container: &str,
        replies: impl IntoIterator<Item = Reply<()>>,
    ) {
        let mut script = self.script.lock().unwrap();
        script
            .disconnect
            .entry((network.to_string(), container.to_string()))
            .or_default()
            .extend(replies);
    }

    pub fn on_connect(
        &self,
        network: &str,
        container: &str,
        replies: impl IntoIterator<Item = Reply<()>>,
    ) {
        let mut script = self.script.lock().unwrap();
        script
            .connect
            .entry((network.to_string(), container.to_string()))
            .or_default()
            .extend(replies);
    }

    /// All calls in order
    pub fn calls(&self) -> Vec<Call> {
        self.timed_calls().into_iter().map(|(_, c)| c).collect()
    }

    /// All calls with the (virtual) time they were made
    pub fn timed_calls(&self) -> Vec<(Instant, Call)> {
        self.script.lock().unwrap().calls.clone()
    }

    /// Calls made for one container
    pub fn calls_for(&self, container: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.container() == container)
            .collect()
    }

    fn record(&self, call: Call) -> std::sync::MutexGuard<'_, Script> {
        let mut script = self.script.lock().unwrap();
        script.calls.push((Instant::now(), call));
        script
    }
}

/// Reply helpers
pub fn running(networks: &[&str]) -> Reply<ObservedState> {
    Ok(ObservedState::new(RunStatus::Running, networks.iter().copied()))
}

pub fn stopped(networks: &[&str]) -> Reply<ObservedState> {
    Ok(ObservedState::new(RunStatus::Stopped, networks.iter().copied()))
}

pub fn inspect(container: &str) -> Call {
    Call::Inspect(container.to_string())
}

pub fn start(container: &str) -> Call {
    Call::Start(container.to_string())
}

pub fn connect(network: &str, container: &str) -> Call {
    Call::Connect {
        network: network.to_string(),
        container: container.to_string(),
    }
}

pub fn disconnect(network: &str, container: &str) -> Call {
    Call::Disconnect {
        network: network.to_string(),
        container: container.to_string(),
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn inspect(&self, container: &str) -> Result<ObservedState> {
        let mut script = self.record(Call::Inspect(container.to_string()));
        next(script.inspect.get_mut(container), Err("No such container"))
    }

    async fn start(&self, container: &str) -> Result<()> {
        let mut script = self.record(Call::Start(container.to_string()));
        next(script.start.get_mut(container), Ok(()))
    }

    async fn disconnect_network(&self, network: &str, container: &str) -> Result<()> {
        let mut script = self.record(disconnect(network, container));
        let key = (network.to_string(), container.to_string());
        next(script.disconnect.get_mut(&key), Ok(()))
    }

    async fn connect_network(&self, network: &str, container: &str) -> Result<()> {
        let mut script = self.record(connect(network, container));
        let key = (network.to_string(), container.to_string());
        next(script.connect.get_mut(&key), Ok(()))
    }
}
