//! Controller configuration.

use std::{str::FromStr, time::Duration};

use ctf_env_core::{AccountError, accounts::generate_mnemonic};
use thiserror::Error;

/// Well-known development seed used when no admin seed is configured.
pub const DEV_MNEMONIC: &str = "test test test test test test test test test test test junk";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error(transparent)]
    Accounts(#[from] AccountError),
}

/// What happens to node processes on stop and local reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NodePolicy {
    /// Kill the node process groups.
    #[default]
    Terminate,
    /// Leave nodes running; only the chain state is reverted.
    Keep,
}

impl FromStr for NodePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "terminate" | "kill" => Ok(Self::Terminate),
            "keep" => Ok(Self::Keep),
            other => Err(format!("expected 'terminate' or 'keep', got '{other}'")),
        }
    }
}

/// Session controller configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Host nodes bind and are polled on.
    pub host: String,
    pub upstream_port: u16,
    pub player_port: u16,
    /// Per-node readiness timeout.
    pub port_timeout: Duration,
    pub node_policy: NodePolicy,
    /// Accounts derived per seed.
    pub account_count: u32,
    /// Admin seed used unless a start asks for rotation.
    pub admin_mnemonic: String,
    /// Fixed player seed; a fresh one is generated per start when unset.
    pub player_mnemonic: Option<String>,
    /// Remote chain the upstream node forks.
    pub fork_url: Option<String>,
    pub fork_block: Option<String>,
    pub upstream_extra_args: String,
    pub player_extra_args: String,
    pub testnet_rpc_url: Option<String>,
    pub default_owner_key: Option<String>,
    pub default_attacker_key: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            upstream_port: 8555,
            player_port: 8545,
            port_timeout: Duration::from_secs(5),
            node_policy: NodePolicy::Terminate,
            account_count: 10,
            admin_mnemonic: DEV_MNEMONIC.to_string(),
            player_mnemonic: None,
            fork_url: None,
            fork_block: None,
            upstream_extra_args: String::new(),
            player_extra_args: String::new(),
            testnet_rpc_url: None,
            default_owner_key: None,
            default_attacker_key: None,
        }
    }
}

impl ControllerConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    /// Returns error if a variable holds a malformed value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; unset or blank keys keep defaults.
    ///
    /// Without `ADMIN_MNEMONIC` a fresh admin seed is generated.
    ///
    /// # Errors
    /// Returns error if a variable holds a malformed value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let admin_mnemonic = match get("ADMIN_MNEMONIC") {
            Some(m) => m,
            None => generate_mnemonic()?,
        };

        Ok(Self {
            host: get("CTF_HOST").unwrap_or(defaults.host),
            upstream_port: parse(&get, "CTF_UPSTREAM_PORT")?.unwrap_or(defaults.upstream_port),
            player_port: parse(&get, "CTF_PLAYER_PORT")?.unwrap_or(defaults.player_port),
            port_timeout: parse(&get, "CTF_PORT_TIMEOUT_MS")?
                .map_or(defaults.port_timeout, Duration::from_millis),
            node_policy: parse(&get, "CTF_NODE_POLICY")?.unwrap_or(defaults.node_policy),
            account_count: parse(&get, "CTF_ACCOUNT_COUNT")?.unwrap_or(defaults.account_count),
            admin_mnemonic,
            player_mnemonic: get("PLAYER_MNEMONIC"),
            fork_url: get("FORK_RPC_URL"),
            fork_block: get("FORK_BLOCK_NUMBER"),
            upstream_extra_args: get("UPSTREAM_EXTRA_ARGS").unwrap_or_default(),
            player_extra_args: get("PLAYER_EXTRA_ARGS").unwrap_or_default(),
            testnet_rpc_url: get("TESTNET_RPC_URL"),
            default_owner_key: get("DEFAULT_OWNER_PRIVATE_KEY"),
            default_attacker_key: get("DEFAULT_ATTACKER_PRIVATE_KEY"),
        })
    }

    #[must_use]
    pub fn upstream_rpc_url(&self) -> String {
        format!("http://{}:{}", self.host, self.upstream_port)
    }

    #[must_use]
    pub fn player_rpc_url(&self) -> String {
        format!("http://{}:{}", self.host, self.player_port)
    }
}

fn parse<T, G>(get: &G, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|value| {
            value.parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_reference_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.upstream_port, 8555);
        assert_eq!(config.player_port, 8545);
        assert_eq!(config.port_timeout, Duration::from_secs(5));
        assert_eq!(config.upstream_rpc_url(), "http://127.0.0.1:8555");
        assert_eq!(config.player_rpc_url(), "http://127.0.0.1:8545");
        assert_eq!(config.node_policy, NodePolicy::Terminate);
    }

    #[test]
    fn test_lookup_overrides() {
        let config = ControllerConfig::from_lookup(lookup(&[
            ("ADMIN_MNEMONIC", DEV_MNEMONIC),
            ("CTF_UPSTREAM_PORT", "9555"),
            ("CTF_PORT_TIMEOUT_MS", "250"),
            ("CTF_NODE_POLICY", "keep"),
            ("PLAYER_EXTRA_ARGS", "--gas-limit 1"),
            ("TESTNET_RPC_URL", " https://rpc.example "),
            ("FORK_BLOCK_NUMBER", ""),
        ]))
        .unwrap();

        assert_eq!(config.admin_mnemonic, DEV_MNEMONIC);
        assert_eq!(config.upstream_port, 9555);
        assert_eq!(config.player_port, 8545);
        assert_eq!(config.port_timeout, Duration::from_millis(250));
        assert_eq!(config.node_policy, NodePolicy::Keep);
        assert_eq!(config.player_extra_args, "--gas-limit 1");
        assert_eq!(config.testnet_rpc_url.as_deref(), Some("https://rpc.example"));
        assert_eq!(config.fork_block, None);
    }

    #[test]
    fn test_missing_admin_seed_is_generated() {
        let first = ControllerConfig::from_lookup(lookup(&[])).unwrap();
        let second = ControllerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(first.admin_mnemonic.split_whitespace().count(), 12);
        assert_ne!(first.admin_mnemonic, second.admin_mnemonic);
    }

    #[test]
    fn test_malformed_port_rejected() {
        let err = ControllerConfig::from_lookup(lookup(&[
            ("ADMIN_MNEMONIC", DEV_MNEMONIC),
            ("CTF_PLAYER_PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "CTF_PLAYER_PORT", .. }));
    }

    #[test]
    fn test_malformed_policy_rejected() {
        let err = ControllerConfig::from_lookup(lookup(&[
            ("ADMIN_MNEMONIC", DEV_MNEMONIC),
            ("CTF_NODE_POLICY", "sometimes"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("CTF_NODE_POLICY"));
    }
}
