//! Core traits for collaborators and chain backends.

use std::{fmt, time::Duration};

use alloy::primitives::U256;
use async_trait::async_trait;
use thiserror::Error;
use tokio::{sync::oneshot, task::JoinHandle};

use crate::{AccountSet, DeployContext, ExploitContext, RunnableContext};

/// Trait for challenge deployment collaborators.
///
/// Implementations deploy contracts through `ctx.rpc_url`, record them in
/// `ctx.registry` and may register periodic runnables.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Deploy against a freshly emptied context.
    async fn deploy(
        &self,
        ctx: &mut DeployContext,
        deployers: &AccountSet,
        players: &AccountSet,
    ) -> anyhow::Result<()>;
}

/// Trait for the exploit collaborator.
#[async_trait]
pub trait Exploiter: Send + Sync {
    /// Run the exploit with the same accounts used at deploy time.
    async fn run(
        &self,
        ctx: &mut ExploitContext,
        deployers: &AccountSet,
        players: &AccountSet,
    ) -> anyhow::Result<()>;
}

/// Trait for work fired on a fixed interval after deployment.
#[async_trait]
pub trait Periodic: Send + Sync {
    async fn tick(&self, ctx: &RunnableContext) -> anyhow::Result<()>;
}

/// Role of a supervised node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    /// First node, optionally forking a remote chain.
    Upstream,
    /// Second node forking the upstream RPC; the address players use.
    PlayerFacing,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream => f.write_str("upstream"),
            Self::PlayerFacing => f.write_str("player-facing"),
        }
    }
}

/// Launch request for a local chain node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub role: NodeRole,
    pub port: u16,
    pub mnemonic: String,
    pub fork_url: Option<String>,
    pub fork_block: Option<String>,
    /// Extra command-line arguments, shell-quoted.
    pub extra_args: String,
    /// Mine one block per second instead of instantly.
    pub block_delay: bool,
}

/// Handle to the task waiting on a node's exit.
#[derive(Debug)]
pub struct ProcessWatch {
    kill_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ProcessWatch {
    /// `task` must kill the process when `kill_tx` fires and keep waiting on it
    /// when `kill_tx` is dropped.
    #[must_use]
    pub const fn new(kill_tx: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        Self { kill_tx, task }
    }
}

/// A supervised node process.
///
/// Dropping the handle leaves the process running.
#[derive(Debug)]
pub struct NodeProcess {
    role: NodeRole,
    port: u16,
    pid: Option<u32>,
    fork_url: Option<String>,
    watch: Option<ProcessWatch>,
}

impl NodeProcess {
    #[must_use]
    pub fn new(spec: &NodeSpec, pid: Option<u32>, watch: Option<ProcessWatch>) -> Self {
        Self {
            role: spec.role,
            port: spec.port,
            pid,
            fork_url: spec.fork_url.clone(),
            watch,
        }
    }

    #[must_use]
    pub const fn role(&self) -> NodeRole {
        self.role
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    #[must_use]
    pub fn fork_url(&self) -> Option<&str> {
        self.fork_url.as_deref()
    }

    /// Best-effort terminate and wait for the watcher to finish.
    pub async fn terminate(mut self) {
        let Some(watch) = self.watch.take() else {
            return;
        };
        let _ = watch.kill_tx.send(());
        if let Err(e) = watch.task.await {
            tracing::warn!(role = %self.role, port = self.port, "Node watcher failed: {e}");
        }
    }
}

/// Connection to the chain deployments run against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkHandle {
    pub rpc_url: String,
    pub chain_id: Option<u64>,
    /// Snapshot taken at connect time; reverting to it wipes session state.
    pub snapshot: Option<U256>,
}

/// Port readiness timeout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Waited too long for the port {port} on host {host} to start accepting connections ({}ms)",
    .timeout.as_millis()
)]
pub struct PortTimeoutError {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

/// Node backend error.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("No node simulator available: {0}")]
    ExecutableNotFound(String),
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),
    #[error("Command build error: {0}")]
    CommandBuild(String),
    #[error(transparent)]
    PortTimeout(#[from] PortTimeoutError),
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for launching nodes and talking to the chain they serve.
#[async_trait]
pub trait ChainBackend: Send + Sync {
    /// Launch a detached node process. Readiness is not awaited.
    async fn launch(&self, spec: &NodeSpec) -> Result<NodeProcess, NodeError>;

    /// Connect to `rpc_url`, optionally taking a state snapshot.
    async fn connect(&self, rpc_url: &str, snapshot: bool) -> Result<NetworkHandle, NodeError>;

    /// Revert the chain to the handle's snapshot.
    async fn revert(&self, handle: &NetworkHandle) -> Result<(), NodeError>;
}
