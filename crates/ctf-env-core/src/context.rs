//! Contexts handed to deploy, exploit and periodic collaborators.

use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use alloy::primitives::Address;
use serde_json::Value;

use crate::{AccountSet, Network, StatusLog, traits::Periodic};

/// Free-form state shared between the deploy collaborators of one deployment.
pub type SharedState = serde_json::Map<String, Value>;

/// Contract name to deployed instance addresses, in deployment order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployedRegistry {
    contracts: BTreeMap<String, Vec<Address>>,
}

impl DeployedRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a deployed instance of `name`.
    pub fn record(&mut self, name: impl Into<String>, address: Address) {
        self.contracts.entry(name.into()).or_default().push(address);
    }

    /// All instances of `name`, oldest first.
    #[must_use]
    pub fn addresses(&self, name: &str) -> &[Address] {
        self.contracts
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Most recent instance of `name`.
    #[must_use]
    pub fn latest(&self, name: &str) -> Option<Address> {
        self.addresses(name).last().copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.contracts.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    pub fn clear(&mut self) {
        self.contracts.clear();
    }

    /// JSON view of the registry.
    ///
    /// With `all_instances` every address is listed, otherwise only the latest
    /// one per contract.
    #[must_use]
    pub fn dump(&self, all_instances: bool) -> Value {
        let object = self
            .contracts
            .iter()
            .map(|(name, addresses)| {
                let listed: Vec<Value> = if all_instances {
                    addresses.iter().map(|a| Value::String(a.to_string())).collect()
                } else {
                    addresses
                        .last()
                        .map(|a| Value::String(a.to_string()))
                        .into_iter()
                        .collect()
                };
                (name.clone(), Value::Array(listed))
            })
            .collect();
        Value::Object(object)
    }
}

/// Linear gas price scaling for slow public networks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasStrategy {
    pub initial_gwei: u64,
    pub max_gwei: u64,
    pub increment: f64,
}

impl GasStrategy {
    #[must_use]
    pub const fn linear_scaling() -> Self {
        Self {
            initial_gwei: 6,
            max_gwei: 70,
            increment: 1.1,
        }
    }

    /// Gas price in wei after `bumps` replacements, capped at `max_gwei`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn price_wei(&self, bumps: u32) -> u128 {
        const GWEI: f64 = 1_000_000_000.0;
        let scaled = self.increment.powi(i32::try_from(bumps).unwrap_or(i32::MAX))
            * self.initial_gwei as f64;
        let capped = scaled.min(self.max_gwei as f64);
        (capped * GWEI).round() as u128
    }
}

impl Default for GasStrategy {
    fn default() -> Self {
        Self::linear_scaling()
    }
}

/// A periodic callback registered by a deploy collaborator.
#[derive(Clone)]
pub struct Runnable {
    pub name: String,
    pub every: Duration,
    pub task: Arc<dyn Periodic>,
}

impl fmt::Debug for Runnable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runnable")
            .field("name", &self.name)
            .field("every", &self.every)
            .finish_non_exhaustive()
    }
}

/// Everything a deploy collaborator may read or extend.
///
/// A fresh context is built for every deployment; nothing carries over.
#[derive(Debug)]
pub struct DeployContext {
    pub network: Network,
    /// RPC endpoint deployments are sent to.
    pub rpc_url: String,
    pub gas_strategy: Option<GasStrategy>,
    pub state: SharedState,
    pub registry: DeployedRegistry,
    /// Lines appended to the caller's response.
    pub log: StatusLog,
    runnables: Vec<Runnable>,
}

impl DeployContext {
    #[must_use]
    pub fn new(
        network: Network,
        rpc_url: impl Into<String>,
        gas_strategy: Option<GasStrategy>,
    ) -> Self {
        Self {
            network,
            rpc_url: rpc_url.into(),
            gas_strategy,
            state: SharedState::new(),
            registry: DeployedRegistry::new(),
            log: StatusLog::new(),
            runnables: Vec::new(),
        }
    }

    /// Schedule `task` to fire right after deployment and then every `every`.
    pub fn register_runnable(
        &mut self,
        name: impl Into<String>,
        every: Duration,
        task: Arc<dyn Periodic>,
    ) {
        self.runnables.push(Runnable {
            name: name.into(),
            every,
            task,
        });
    }

    /// Runnables in registration order.
    #[must_use]
    pub fn runnables(&self) -> &[Runnable] {
        &self.runnables
    }

    #[must_use]
    pub fn take_runnables(&mut self) -> Vec<Runnable> {
        std::mem::take(&mut self.runnables)
    }
}

/// What the exploit collaborator sees besides the account lists.
#[derive(Debug)]
pub struct ExploitContext {
    pub network: Network,
    pub rpc_url: String,
    pub log: StatusLog,
}

impl ExploitContext {
    #[must_use]
    pub fn new(network: Network, rpc_url: impl Into<String>) -> Self {
        Self {
            network,
            rpc_url: rpc_url.into(),
            log: StatusLog::new(),
        }
    }
}

/// Snapshot handed to every tick of a runnable.
#[derive(Debug, Clone)]
pub struct RunnableContext {
    pub network: Network,
    pub rpc_url: String,
    pub state: Arc<SharedState>,
    pub deployers: AccountSet,
    pub players: AccountSet,
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;
    use serde_json::json;

    use super::*;

    const A: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
    const B: Address = address!("e7f1725E7734CE288F8367e1Bb143E90bb3F0512");

    #[test]
    fn test_registry_keeps_deploy_order() {
        let mut registry = DeployedRegistry::new();
        registry.record("Token", A);
        registry.record("Token", B);

        assert_eq!(registry.addresses("Token"), &[A, B]);
        assert_eq!(registry.latest("Token"), Some(B));
        assert!(registry.addresses("Missing").is_empty());
    }

    #[test]
    fn test_registry_dump_modes() {
        let mut registry = DeployedRegistry::new();
        registry.record("Token", A);
        registry.record("Token", B);
        registry.record("Market", A);

        assert_eq!(
            registry.dump(true),
            json!({ "Market": [A.to_string()], "Token": [A.to_string(), B.to_string()] })
        );
        assert_eq!(
            registry.dump(false),
            json!({ "Market": [A.to_string()], "Token": [B.to_string()] })
        );
    }

    #[test]
    fn test_gas_strategy_scales_and_caps() {
        let gas = GasStrategy::linear_scaling();
        assert_eq!(gas.price_wei(0), 6_000_000_000);
        assert_eq!(gas.price_wei(1), 6_600_000_000);
        assert_eq!(gas.price_wei(100), 70_000_000_000);
    }

    #[test]
    fn test_fresh_context_is_empty() {
        let ctx = DeployContext::new(Network::Local, "http://127.0.0.1:8545", None);
        assert!(ctx.state.is_empty());
        assert!(ctx.registry.is_empty());
        assert!(ctx.runnables().is_empty());
    }
}
