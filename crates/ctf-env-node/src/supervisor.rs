//! Node process supervision.

use std::{io, path::Path, process::Stdio};

use command_group::{AsyncCommandGroup, AsyncGroupChild};
use ctf_env_core::{NodeError, NodeProcess, NodeRole, NodeSpec, ProcessWatch};
use tokio::{process::Command, sync::oneshot};

use crate::{command::Simulator, resolve::resolve_executable_path};

/// Launches node simulators as detached process groups.
///
/// Candidates are tried in order; the first one whose executable resolves and
/// spawns wins.
#[derive(Debug, Clone)]
pub struct NodeSupervisor {
    candidates: Vec<(Simulator, String)>,
}

impl Default for NodeSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeSupervisor {
    /// anvil first, ganache as fallback.
    #[must_use]
    pub fn new() -> Self {
        Self::with_candidates(
            [Simulator::Anvil, Simulator::Ganache].map(|s| (s, s.program().to_string())),
        )
    }

    /// Use explicit `(dialect, executable)` candidates.
    #[must_use]
    pub fn with_candidates<I>(candidates: I) -> Self
    where
        I: IntoIterator<Item = (Simulator, String)>,
    {
        Self {
            candidates: candidates.into_iter().collect(),
        }
    }

    /// Launch a node for `spec`. Readiness is the caller's concern.
    ///
    /// # Errors
    /// Returns `ExecutableNotFound` when no candidate is installed, or a spawn
    /// error for any other launch failure.
    pub async fn launch(&self, spec: &NodeSpec) -> Result<NodeProcess, NodeError> {
        for (simulator, executable) in &self.candidates {
            let Some(path) = resolve_executable_path(executable).await else {
                tracing::debug!(%executable, "Simulator not installed, trying next");
                continue;
            };

            let parts = simulator
                .command(spec)
                .map_err(|e| NodeError::CommandBuild(e.to_string()))?;

            match spawn_detached(&path, &parts.args) {
                Ok(child) => {
                    let pid = child.id();
                    tracing::info!(
                        role = %spec.role,
                        port = spec.port,
                        ?pid,
                        executable = %path.display(),
                        "Node launched"
                    );
                    let watch = watch_child(child, spec.role, spec.port);
                    return Ok(NodeProcess::new(spec, pid, Some(watch)));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::warn!(%executable, "Simulator vanished before spawn: {e}");
                }
                Err(e) => {
                    return Err(NodeError::SpawnFailed(format!("{executable}: {e}")));
                }
            }
        }

        let tried: Vec<&str> = self.candidates.iter().map(|(_, e)| e.as_str()).collect();
        Err(NodeError::ExecutableNotFound(tried.join(", ")))
    }
}

fn spawn_detached(program: &Path, args: &[String]) -> io::Result<AsyncGroupChild> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null());
    cmd.group_spawn()
}

fn watch_child(child: AsyncGroupChild, role: NodeRole, port: u16) -> ProcessWatch {
    let (kill_tx, kill_rx) = oneshot::channel();
    let task = tokio::spawn(supervise(child, role, port, kill_rx));
    ProcessWatch::new(kill_tx, task)
}

async fn supervise(
    mut child: AsyncGroupChild,
    role: NodeRole,
    port: u16,
    mut kill_rx: oneshot::Receiver<()>,
) {
    tokio::select! {
        status = child.wait() => report_exit(role, port, status),
        signal = &mut kill_rx => {
            if signal.is_ok() {
                if let Err(e) = child.start_kill() {
                    tracing::warn!(%role, port, "Failed to kill node: {e}");
                }
            } else {
                tracing::debug!(%role, port, "Node handle dropped, leaving process running");
            }
            report_exit(role, port, child.wait().await);
        }
    }
}

fn report_exit(role: NodeRole, port: u16, status: io::Result<std::process::ExitStatus>) {
    match status {
        Ok(status) if status.success() => tracing::info!(%role, port, "Node exited"),
        Ok(status) => tracing::warn!(%role, port, %status, "Node exited with failure"),
        Err(e) => tracing::error!(%role, port, "Failed to wait for node: {e}"),
    }
}
