//! JSON-RPC chain handle and the local `ChainBackend`.

use std::borrow::Cow;

use alloy::{
    primitives::U256,
    providers::{Provider, ProviderBuilder},
    transports::http::reqwest::Url,
};
use async_trait::async_trait;
use ctf_env_core::{ChainBackend, NetworkHandle, NodeError, NodeProcess, NodeSpec};
use serde_json::json;

use crate::supervisor::NodeSupervisor;

/// Connect to `rpc_url` and, when asked, snapshot its current state.
///
/// # Errors
/// Returns `NodeError::Rpc` if the endpoint is unreachable or rejects the
/// snapshot request.
pub async fn connect(rpc_url: &str, snapshot: bool) -> Result<NetworkHandle, NodeError> {
    let url = Url::parse(rpc_url).map_err(|e| NodeError::Rpc(format!("{rpc_url}: {e}")))?;
    let provider = ProviderBuilder::new().on_http(url);

    let chain_id = provider
        .get_chain_id()
        .await
        .map_err(|e| NodeError::Rpc(format!("eth_chainId: {e}")))?;

    let snapshot = if snapshot {
        let id = provider
            .raw_request::<_, U256>(Cow::Borrowed("evm_snapshot"), json!([]))
            .await
            .map_err(|e| NodeError::Rpc(format!("evm_snapshot: {e}")))?;
        Some(id)
    } else {
        None
    };

    tracing::info!(%rpc_url, chain_id, ?snapshot, "Connected to chain");
    Ok(NetworkHandle {
        rpc_url: rpc_url.to_string(),
        chain_id: Some(chain_id),
        snapshot,
    })
}

/// Revert to the snapshot taken at connect time. Handles without a snapshot
/// are left alone.
///
/// # Errors
/// Returns `NodeError::Rpc` if the node refuses the revert.
pub async fn revert(handle: &NetworkHandle) -> Result<(), NodeError> {
    let Some(id) = handle.snapshot else {
        tracing::debug!(rpc_url = %handle.rpc_url, "No snapshot to revert");
        return Ok(());
    };

    let url = Url::parse(&handle.rpc_url)
        .map_err(|e| NodeError::Rpc(format!("{}: {e}", handle.rpc_url)))?;
    let provider = ProviderBuilder::new().on_http(url);

    let reverted = provider
        .raw_request::<_, bool>(Cow::Borrowed("evm_revert"), json!([id]))
        .await
        .map_err(|e| NodeError::Rpc(format!("evm_revert: {e}")))?;

    if reverted {
        tracing::info!(rpc_url = %handle.rpc_url, %id, "Chain reverted to snapshot");
        Ok(())
    } else {
        Err(NodeError::Rpc(format!("snapshot {id} was not reverted")))
    }
}

/// `ChainBackend` over locally supervised simulators.
#[derive(Debug, Clone, Default)]
pub struct LocalChain {
    supervisor: NodeSupervisor,
}

impl LocalChain {
    #[must_use]
    pub const fn new(supervisor: NodeSupervisor) -> Self {
        Self { supervisor }
    }
}

#[async_trait]
impl ChainBackend for LocalChain {
    async fn launch(&self, spec: &NodeSpec) -> Result<NodeProcess, NodeError> {
        self.supervisor.launch(spec).await
    }

    async fn connect(&self, rpc_url: &str, snapshot: bool) -> Result<NetworkHandle, NodeError> {
        connect(rpc_url, snapshot).await
    }

    async fn revert(&self, handle: &NetworkHandle) -> Result<(), NodeError> {
        revert(handle).await
    }
}
