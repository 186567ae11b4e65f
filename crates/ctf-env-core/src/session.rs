//! Session parameters and lifecycle states.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Target network for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    /// Two local simulator nodes, player-facing forking upstream.
    #[default]
    Local,
    /// A public test network reached over RPC; no local processes.
    #[serde(rename = "goerli", alias = "testnet")]
    Testnet,
}

impl Network {
    /// Wire name used in requests and status sentences.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Testnet => "goerli",
        }
    }

    #[must_use]
    pub const fn is_local(self) -> bool {
        matches!(self, Self::Local)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A network name this system cannot provision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported network: {0}")]
pub struct UnsupportedNetwork(pub String);

impl FromStr for Network {
    type Err = UnsupportedNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "local" => Ok(Self::Local),
            "goerli" | "testnet" => Ok(Self::Testnet),
            other => Err(UnsupportedNetwork(other.to_string())),
        }
    }
}

/// Parameters recorded by the accepted `start` of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParams {
    pub network: Network,
    /// Raw player keys, remote networks only.
    #[serde(default)]
    pub player_private_keys: Vec<String>,
    /// Raw owner (deployer) keys, remote networks only.
    #[serde(default)]
    pub owner_private_keys: Vec<String>,
    /// Rotate the admin seed on every start and reset.
    #[serde(default)]
    pub change_admin_mnemonic: bool,
    /// Expose a linear gas price strategy to deploy collaborators.
    #[serde(default)]
    pub gas_strategy: bool,
    /// Mine blocks at a one second interval instead of instantly.
    #[serde(default)]
    pub delay_block_mine: bool,
}

impl SessionParams {
    #[must_use]
    pub fn new(network: Network) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }

    /// Whether the request supplied a complete pair of key lists.
    #[must_use]
    pub fn has_explicit_keys(&self) -> bool {
        !self.player_private_keys.is_empty() && !self.owner_private_keys.is_empty()
    }
}

/// Session lifecycle.
///
/// `Starting` and `Resetting` persist after a failed transition; there is no
/// automatic rollback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Stopped,
    Starting,
    Ready,
    Resetting,
}

impl LifecycleState {
    /// Whether a start has been accepted since the last stop.
    #[must_use]
    pub const fn is_started(self) -> bool {
        !matches!(self, Self::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_parsing() {
        assert_eq!("local".parse::<Network>().unwrap(), Network::Local);
        assert_eq!("goerli".parse::<Network>().unwrap(), Network::Testnet);
        assert_eq!("testnet".parse::<Network>().unwrap(), Network::Testnet);

        let err = "mainnet".parse::<Network>().unwrap_err();
        assert_eq!(err, UnsupportedNetwork("mainnet".to_string()));
    }

    #[test]
    fn test_network_serde_names() {
        assert_eq!(serde_json::to_string(&Network::Testnet).unwrap(), "\"goerli\"");
        let parsed: Network = serde_json::from_str("\"testnet\"").unwrap();
        assert_eq!(parsed, Network::Testnet);
    }

    #[test]
    fn test_explicit_keys_require_both_lists() {
        let mut params = SessionParams::new(Network::Testnet);
        params.player_private_keys = vec!["0x01".to_string()];
        assert!(!params.has_explicit_keys());

        params.owner_private_keys = vec!["0x02".to_string()];
        assert!(params.has_explicit_keys());
    }

    #[test]
    fn test_started_states() {
        assert!(!LifecycleState::Stopped.is_started());
        assert!(LifecycleState::Starting.is_started());
        assert!(LifecycleState::Ready.is_started());
        assert!(LifecycleState::Resetting.is_started());
    }
}
