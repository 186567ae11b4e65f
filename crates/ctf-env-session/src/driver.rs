//! Deploy collaborator sequencing and runnable scheduling.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use ctf_env_core::{AccountSet, DeployContext, Deployer, Runnable, RunnableContext};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Runs deploy collaborators in a fixed order against one shared context.
///
/// The private (challenge-owned) stage runs before the public one, so the
/// public stage can read what the private stage left in the shared state.
#[derive(Clone)]
pub struct DeploymentDriver {
    stages: Vec<(&'static str, Arc<dyn Deployer>)>,
}

impl std::fmt::Debug for DeploymentDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.stages.iter().map(|(name, _)| *name).collect();
        f.debug_struct("DeploymentDriver")
            .field("stages", &names)
            .finish()
    }
}

impl DeploymentDriver {
    #[must_use]
    pub fn new(private: Arc<dyn Deployer>, public: Arc<dyn Deployer>) -> Self {
        Self {
            stages: vec![("private", private), ("public", public)],
        }
    }

    /// Run every stage in order, stopping at the first failure.
    ///
    /// # Errors
    /// Returns the failing stage's error, tagged with the stage name.
    pub async fn deploy(
        &self,
        ctx: &mut DeployContext,
        deployers: &AccountSet,
        players: &AccountSet,
    ) -> anyhow::Result<()> {
        for (name, stage) in &self.stages {
            tracing::debug!(stage = name, network = %ctx.network, "Running deploy stage");
            stage
                .deploy(ctx, deployers, players)
                .await
                .with_context(|| format!("{name} deploy stage"))?;
        }
        Ok(())
    }
}

/// Tickers for the runnables of one deployment.
///
/// Dropping the set cancels every ticker.
#[derive(Debug, Default)]
pub struct RunnableSet {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl RunnableSet {
    /// Spawn one ticker per runnable, each firing immediately and then every
    /// `runnable.every`. A tick never overlaps the previous tick of the same
    /// runnable.
    #[must_use]
    pub fn start(runnables: Vec<Runnable>, ctx: RunnableContext) -> Self {
        let token = CancellationToken::new();
        let ctx = Arc::new(ctx);
        let tasks = runnables
            .into_iter()
            .map(|runnable| {
                tokio::spawn(run_ticker(runnable, Arc::clone(&ctx), token.child_token()))
            })
            .collect();
        Self { token, tasks }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancel all tickers and wait for them to wind down.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                tracing::warn!("Runnable ticker failed: {e}");
            }
        }
    }
}

impl Drop for RunnableSet {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run_ticker(runnable: Runnable, ctx: Arc<RunnableContext>, token: CancellationToken) {
    let period = runnable.every.max(Duration::from_millis(1));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = interval.tick() => {}
        }

        tokio::select! {
            () = token.cancelled() => break,
            result = runnable.task.tick(&ctx) => {
                if let Err(e) = result {
                    tracing::warn!(runnable = %runnable.name, "Runnable tick failed: {e:#}");
                }
            }
        }
    }

    tracing::debug!(runnable = %runnable.name, "Runnable stopped");
}
