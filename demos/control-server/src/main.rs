//! Control server for a local CTF chain environment.
//!
//! Run with: cargo run -p control-server
//!
//! Then drive the session with
//! `curl -d '{"method":"start","network":"local"}' http://localhost:8000/`.

mod script;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use ctf_env_node::LocalChain;
use ctf_env_session::{ControllerConfig, DeploymentDriver, SessionController};
use ctf_env_transport::http::create_router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::script::{ScriptConfig, ScriptDeployer, ScriptExploiter};

const DEFAULT_LISTEN: &str = "0.0.0.0:8000";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenv::dotenv() {
        eprintln!("No .env loaded: {e}");
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = ControllerConfig::from_env().context("invalid configuration")?;
    let scripts = ScriptConfig::from_env().context("invalid script configuration")?;
    tracing::info!(
        upstream_port = config.upstream_port,
        player_port = config.player_port,
        node_policy = ?config.node_policy,
        "Loaded configuration"
    );

    let driver = DeploymentDriver::new(
        Arc::new(ScriptDeployer::new("private", scripts.deploy_private)),
        Arc::new(
            ScriptDeployer::new("public", scripts.deploy_public)
                .with_runnable(scripts.watch, scripts.watch_every),
        ),
    );
    let controller = SessionController::new(
        LocalChain::default(),
        driver,
        Arc::new(ScriptExploiter::new(scripts.exploit)),
        config,
    );
    let app = create_router(Arc::new(controller));

    let listen = std::env::var("CTF_LISTEN").unwrap_or_else(|_| DEFAULT_LISTEN.to_string());
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid CTF_LISTEN address {listen}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    tracing::info!("Control server listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
