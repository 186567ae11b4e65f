//! Session controller: the start / reset / exploit / stop state machine.

use std::sync::Arc;

use ctf_env_core::{
    AccountError, AccountSet, ChainBackend, DeployContext, DeployedRegistry, ExploitContext,
    Exploiter, GasStrategy, LifecycleState, Network, NetworkHandle, NodeError, NodeProcess,
    NodeRole, NodeSpec, PortTimeoutError, RunnableContext, SessionParams, StatusLog,
    accounts::{derive_from_mnemonic, derive_from_private_keys, generate_mnemonic},
};
use ctf_env_node::wait_for_port;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    config::{ControllerConfig, NodePolicy},
    driver::{DeploymentDriver, RunnableSet},
};

pub const ALREADY_STARTED: &str =
    "Started environment already, you have to stop first to start again.";
pub const NOT_STARTED: &str = "Before reset/exploit/stop, you have to start first.";
pub const STOPPED: &str = "Stopped. You have to run start from scratch.";
pub const UNKNOWN_METHOD: &str = "Unknown method. Use start/exploit/reset or stop.";
pub const UNSUPPORTED_NETWORK: &str =
    "We are not supporting any other network than 'local' or 'goerli' currently.";

const RULE: &str = "================================";

/// Session controller error.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error(transparent)]
    PortTimeout(#[from] PortTimeoutError),
    #[error(transparent)]
    Accounts(#[from] AccountError),
    #[error("No RPC endpoint configured for network '{0}'")]
    MissingRpcUrl(Network),
    #[error("{0:#}")]
    Deploy(anyhow::Error),
    #[error("{0:#}")]
    Exploit(anyhow::Error),
}

/// A decoded control request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Start(SessionParams),
    Reset,
    Exploit,
    Stop,
}

/// Read-only view of the session, for status and tests.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: Option<Uuid>,
    pub state: LifecycleState,
    pub params: Option<SessionParams>,
    pub admin_mnemonic: String,
    pub player_mnemonic: String,
    pub registry: DeployedRegistry,
    pub nodes: usize,
    pub connected: bool,
    pub runnables: usize,
}

/// The singleton session record.
#[derive(Default)]
struct Session {
    id: Option<Uuid>,
    state: LifecycleState,
    params: Option<SessionParams>,
    admin_mnemonic: String,
    player_mnemonic: String,
    nodes: Vec<NodeProcess>,
    network: Option<NetworkHandle>,
    registry: DeployedRegistry,
    runnables: Option<RunnableSet>,
    log: StatusLog,
}

/// Owns the single session and serializes every command against it.
///
/// The session lock is held for the whole of each command, so two concurrent
/// starts can never both launch nodes.
pub struct SessionController<B: ChainBackend> {
    backend: B,
    driver: DeploymentDriver,
    exploiter: Arc<dyn Exploiter>,
    config: ControllerConfig,
    session: Mutex<Session>,
}

impl<B: ChainBackend> SessionController<B> {
    #[must_use]
    pub fn new(
        backend: B,
        driver: DeploymentDriver,
        exploiter: Arc<dyn Exploiter>,
        config: ControllerConfig,
    ) -> Self {
        let session = Session {
            admin_mnemonic: config.admin_mnemonic.clone(),
            ..Session::default()
        };
        Self {
            backend,
            driver,
            exploiter,
            config,
            session: Mutex::new(session),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Current lifecycle state. Waits for any running command to finish.
    pub async fn state(&self) -> LifecycleState {
        self.session.lock().await.state
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let session = self.session.lock().await;
        SessionSnapshot {
            id: session.id,
            state: session.state,
            params: session.params.clone(),
            admin_mnemonic: session.admin_mnemonic.clone(),
            player_mnemonic: session.player_mnemonic.clone(),
            registry: session.registry.clone(),
            nodes: session.nodes.len(),
            connected: session.network.is_some(),
            runnables: session.runnables.as_ref().map_or(0, RunnableSet::len),
        }
    }

    /// Run `command` on its own task so it finishes even if the caller's
    /// future is dropped, for example when an HTTP client disconnects.
    pub async fn execute_detached(self: &Arc<Self>, command: ControlCommand) -> String
    where
        B: 'static,
    {
        let controller = Arc::clone(self);
        match tokio::spawn(async move { controller.execute(command).await }).await {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("Control command task failed: {e}");
                format!("Internal error: {e}\n")
            }
        }
    }

    /// Run one command and return the response body: accumulated status
    /// lines followed by the outcome sentence.
    pub async fn execute(&self, command: ControlCommand) -> String {
        let mut session = self.session.lock().await;
        let span = tracing::info_span!("session", id = ?session.id);

        let sentence = match command {
            ControlCommand::Start(params) => self.handle_start(&mut session, params).await,
            ControlCommand::Reset => self.handle_reset(&mut session).instrument(span).await,
            ControlCommand::Exploit => self.handle_exploit(&mut session).instrument(span).await,
            ControlCommand::Stop => self.handle_stop(&mut session).instrument(span).await,
        };

        let mut body = session.log.drain();
        body.push_str(&sentence);
        body
    }

    async fn handle_start(&self, session: &mut Session, params: SessionParams) -> String {
        if session.state.is_started() {
            tracing::info!(state = ?session.state, "Start rejected, session already started");
            return ALREADY_STARTED.to_string();
        }

        let id = Uuid::new_v4();
        let network = params.network;
        session.id = Some(id);
        session.state = LifecycleState::Starting;
        session.params = Some(params.clone());

        let result = self
            .start(session, &params)
            .instrument(tracing::info_span!("session", %id, %network))
            .await;

        match result {
            Ok(()) => {
                session.state = LifecycleState::Ready;
                tracing::info!(%id, %network, "Session ready");
                format!("Deployed to '{network}' successfully.\n")
            }
            Err(e) => {
                tracing::error!(%id, %network, error = ?e, "Start failed");
                format!("Start failed: {e}\n")
            }
        }
    }

    async fn start(
        &self,
        session: &mut Session,
        params: &SessionParams,
    ) -> Result<(), SessionError> {
        session.admin_mnemonic = if params.change_admin_mnemonic {
            generate_mnemonic()?
        } else {
            self.config.admin_mnemonic.clone()
        };

        match params.network {
            Network::Local => self.start_local(session, params).await,
            Network::Testnet => self.deploy_remote(session, params).await,
        }
    }

    async fn handle_reset(&self, session: &mut Session) -> String {
        let ready = session.state == LifecycleState::Ready;
        let Some(params) = session.params.clone().filter(|_| ready) else {
            return NOT_STARTED.to_string();
        };

        let result = if params.network.is_local() {
            session.state = LifecycleState::Resetting;
            match self.teardown_local(session, params.change_admin_mnemonic).await {
                Ok(()) => self.start_local(session, &params).await,
                Err(e) => Err(e),
            }
        } else {
            self.deploy_remote(session, &params).await
        };

        match result {
            Ok(()) => {
                session.state = LifecycleState::Ready;
                tracing::info!(network = %params.network, "Session reset");
                "Reset successfully.\n".to_string()
            }
            Err(e) => {
                tracing::error!(network = %params.network, error = ?e, "Reset failed");
                format!("Reset failed: {e}\n")
            }
        }
    }

    async fn handle_exploit(&self, session: &mut Session) -> String {
        let ready = session.state == LifecycleState::Ready;
        let Some(params) = session.params.clone().filter(|_| ready) else {
            return NOT_STARTED.to_string();
        };

        match self.exploit(session, &params).await {
            Ok(()) => {
                tracing::info!(network = %params.network, "Exploit finished");
                "Exploited successfully.\n".to_string()
            }
            Err(e) => {
                tracing::error!(network = %params.network, error = ?e, "Exploit failed");
                format!("Exploit failed: {e}\n")
            }
        }
    }

    async fn exploit(
        &self,
        session: &mut Session,
        params: &SessionParams,
    ) -> Result<(), SessionError> {
        let (deployers, players) = self.session_accounts(session, params)?;
        let rpc_url = self.rpc_url(session, params.network)?;

        let mut ctx = ExploitContext::new(params.network, rpc_url);
        let outcome = self.exploiter.run(&mut ctx, &deployers, &players).await;
        session.log.append(&mut ctx.log);
        outcome.map_err(SessionError::Exploit)
    }

    async fn handle_stop(&self, session: &mut Session) -> String {
        if !session.state.is_started() {
            return NOT_STARTED.to_string();
        }

        let local = session.params.as_ref().is_none_or(|p| p.network.is_local());
        if local {
            // Stop never rotates the admin seed; the next start picks it.
            if let Err(e) = self.teardown_local(session, false).await {
                tracing::warn!(error = ?e, "Teardown incomplete");
            }
        } else {
            if let Some(runnables) = session.runnables.take() {
                runnables.shutdown().await;
            }
            session.network = None;
        }

        session.params = None;
        session.registry.clear();
        session.state = LifecycleState::Stopped;
        let id = session.id.take();
        tracing::info!(?id, "Session stopped");
        STOPPED.to_string()
    }

    /// Launch both local nodes, snapshot the player-facing chain and deploy.
    async fn start_local(
        &self,
        session: &mut Session,
        params: &SessionParams,
    ) -> Result<(), SessionError> {
        session.log.push("Deploying local");

        let upstream = NodeSpec {
            role: NodeRole::Upstream,
            port: self.config.upstream_port,
            mnemonic: session.admin_mnemonic.clone(),
            fork_url: self.config.fork_url.clone(),
            fork_block: self.config.fork_block.clone(),
            extra_args: self.config.upstream_extra_args.clone(),
            block_delay: params.delay_block_mine,
        };
        self.launch_and_wait(session, &upstream).await?;

        session.player_mnemonic = match &self.config.player_mnemonic {
            Some(mnemonic) => mnemonic.clone(),
            None => generate_mnemonic()?,
        };

        let player = NodeSpec {
            role: NodeRole::PlayerFacing,
            port: self.config.player_port,
            mnemonic: session.player_mnemonic.clone(),
            fork_url: Some(self.config.upstream_rpc_url()),
            fork_block: None,
            extra_args: self.config.player_extra_args.clone(),
            block_delay: params.delay_block_mine,
        };
        self.launch_and_wait(session, &player).await?;

        let rpc_url = self.config.player_rpc_url();
        session.network = Some(self.backend.connect(&rpc_url, true).await?);

        let (deployers, players) = self.session_accounts(session, params)?;
        self.deploy(session, Network::Local, rpc_url, None, deployers, players)
            .await
    }

    async fn launch_and_wait(
        &self,
        session: &mut Session,
        spec: &NodeSpec,
    ) -> Result<(), SessionError> {
        let node = self.backend.launch(spec).await?;
        // Tracked before the readiness wait so a timed-out node is still torn down.
        session.nodes.push(node);
        wait_for_port(&self.config.host, spec.port, self.config.port_timeout).await?;
        tracing::info!(role = %spec.role, port = spec.port, "Node accepting connections");
        Ok(())
    }

    /// Deploy to the remote testnet. Nothing is launched; the handle is
    /// reused across resets.
    async fn deploy_remote(
        &self,
        session: &mut Session,
        params: &SessionParams,
    ) -> Result<(), SessionError> {
        session.log.push("Deploying To Goerli Test Network");

        let rpc_url = self
            .config
            .testnet_rpc_url
            .clone()
            .ok_or(SessionError::MissingRpcUrl(Network::Testnet))?;
        if session.network.is_none() {
            session.network = Some(self.backend.connect(&rpc_url, false).await?);
        }

        let (deployers, players) = self.session_accounts(session, params)?;
        let gas = params.gas_strategy.then(GasStrategy::linear_scaling);
        self.deploy(session, Network::Testnet, rpc_url, gas, deployers, players)
            .await
    }

    async fn deploy(
        &self,
        session: &mut Session,
        network: Network,
        rpc_url: String,
        gas_strategy: Option<GasStrategy>,
        deployers: AccountSet,
        players: AccountSet,
    ) -> Result<(), SessionError> {
        if let Some(previous) = session.runnables.take() {
            previous.shutdown().await;
        }
        session.registry.clear();

        let mut ctx = DeployContext::new(network, rpc_url, gas_strategy);
        let outcome = self.driver.deploy(&mut ctx, &deployers, &players).await;
        session.log.append(&mut ctx.log);
        outcome.map_err(SessionError::Deploy)?;

        let runnables = ctx.take_runnables();
        let runnable_ctx = RunnableContext {
            network,
            rpc_url: ctx.rpc_url,
            state: Arc::new(ctx.state),
            deployers,
            players,
        };
        session.runnables = Some(RunnableSet::start(runnables, runnable_ctx));
        session.registry = ctx.registry;

        write_banner(session, network);
        Ok(())
    }

    /// Cancel runnables, revert the chain, apply the node policy and forget
    /// the player seed. Revert failures are logged, not fatal.
    async fn teardown_local(
        &self,
        session: &mut Session,
        rotate_admin: bool,
    ) -> Result<(), SessionError> {
        if let Some(runnables) = session.runnables.take() {
            runnables.shutdown().await;
        }

        if let Some(handle) = &session.network {
            if let Err(e) = self.backend.revert(handle).await {
                tracing::warn!(rpc_url = %handle.rpc_url, "Chain revert failed: {e}");
            }
        }

        match self.config.node_policy {
            NodePolicy::Terminate => {
                for node in session.nodes.drain(..) {
                    tracing::info!(
                        role = %node.role(),
                        port = node.port(),
                        pid = ?node.pid(),
                        "Terminating node"
                    );
                    node.terminate().await;
                }
            }
            NodePolicy::Keep => {
                tracing::info!(count = session.nodes.len(), "Leaving nodes running");
                session.nodes.clear();
            }
        }

        session.player_mnemonic.clear();
        if rotate_admin {
            session.admin_mnemonic = generate_mnemonic()?;
        }

        if session.network.take().is_some() {
            session.log.push("disconnecting network");
        } else {
            session.log.push("network is not connected");
        }
        session.registry.clear();
        Ok(())
    }

    /// Deployer and player accounts for the recorded parameters. Local
    /// sessions derive from the current seeds, so repeated calls agree.
    fn session_accounts(
        &self,
        session: &Session,
        params: &SessionParams,
    ) -> Result<(AccountSet, AccountSet), SessionError> {
        if params.network.is_local() {
            let count = self.config.account_count;
            let deployers = derive_from_mnemonic(&session.admin_mnemonic, count, 0)?;
            let players = derive_from_mnemonic(&session.player_mnemonic, count, 0)?;
            return Ok((deployers, players));
        }

        let (owners, attackers) = if params.has_explicit_keys() {
            (params.owner_private_keys.clone(), params.player_private_keys.clone())
        } else {
            let owner = self
                .config
                .default_owner_key
                .clone()
                .ok_or(AccountError::MissingDefaultKey("DEFAULT_OWNER_PRIVATE_KEY"))?;
            let attacker = self
                .config
                .default_attacker_key
                .clone()
                .ok_or(AccountError::MissingDefaultKey("DEFAULT_ATTACKER_PRIVATE_KEY"))?;
            (vec![owner], vec![attacker])
        };

        let accounts = derive_from_private_keys(&owners, &attackers)?;
        Ok(accounts.split_at(owners.len()))
    }

    fn rpc_url(&self, session: &Session, network: Network) -> Result<String, SessionError> {
        if let Some(handle) = &session.network {
            return Ok(handle.rpc_url.clone());
        }
        match network {
            Network::Local => Ok(self.config.player_rpc_url()),
            Network::Testnet => self
                .config
                .testnet_rpc_url
                .clone()
                .ok_or(SessionError::MissingRpcUrl(network)),
        }
    }
}

fn write_banner(session: &mut Session, network: Network) {
    let dump = session.registry.dump(network.is_local());
    let pretty = serde_json::to_string_pretty(&dump).unwrap_or_else(|_| dump.to_string());

    session.log.push(RULE);
    session.log.push("DEPLOYMENT READY");
    session.log.push("");
    session.log.push_block(&pretty);
    session.log.push("");
    if network.is_local() {
        session.log.push(format!("MNEMONIC: {}", session.player_mnemonic));
        session.log.push(RULE);
    }
    tracing::info!(%network, contracts = %dump, "Deployment ready");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_errors_render_chain() {
        let err = SessionError::Deploy(anyhow::anyhow!("revert").context("private deploy stage"));
        assert_eq!(err.to_string(), "private deploy stage: revert");
    }

    #[test]
    fn test_missing_rpc_names_network() {
        let err = SessionError::MissingRpcUrl(Network::Testnet);
        assert_eq!(err.to_string(), "No RPC endpoint configured for network 'goerli'");
    }
}
