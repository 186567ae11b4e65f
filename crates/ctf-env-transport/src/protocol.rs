//! Wire protocol for control requests.

use ctf_env_core::{Network, SessionParams};
use ctf_env_session::{
    ControlCommand,
    controller::{UNKNOWN_METHOD, UNSUPPORTED_NETWORK},
};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Request that cannot be turned into a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("unknown method '{0}'")]
    UnknownMethod(String),
    #[error("unsupported network '{0}'")]
    UnsupportedNetwork(String),
}

impl RequestError {
    /// Sentence sent back to the client.
    #[must_use]
    pub const fn reply(&self) -> &'static str {
        match self {
            Self::UnknownMethod(_) => UNKNOWN_METHOD,
            Self::UnsupportedNetwork(_) => UNSUPPORTED_NETWORK,
        }
    }
}

/// One control request body.
///
/// Key lists arrive either as a comma-separated string or as a JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    pub method: String,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default, deserialize_with = "key_list")]
    pub player_private_keys: Vec<String>,
    #[serde(default, deserialize_with = "key_list")]
    pub owner_private_keys: Vec<String>,
    #[serde(default, deserialize_with = "flag")]
    pub change_admin_mnemonic: bool,
    #[serde(default, deserialize_with = "flag")]
    pub gas_strategy: bool,
    #[serde(default, deserialize_with = "flag")]
    pub delay_block_mine: bool,
}

impl ControlRequest {
    /// Map the request onto a controller command.
    ///
    /// Only `start` reads the session fields; the other methods act on the
    /// parameters recorded at start. A missing network means `local`.
    ///
    /// # Errors
    /// Returns error for an unknown method or, on start, an unsupported network.
    pub fn into_command(self) -> Result<ControlCommand, RequestError> {
        match self.method.trim().to_ascii_lowercase().as_str() {
            "start" => {
                let network = match self.network.as_deref().map(str::trim) {
                    None | Some("") => Network::Local,
                    Some(name) => name
                        .parse::<Network>()
                        .map_err(|e| RequestError::UnsupportedNetwork(e.0))?,
                };
                Ok(ControlCommand::Start(SessionParams {
                    network,
                    player_private_keys: self.player_private_keys,
                    owner_private_keys: self.owner_private_keys,
                    change_admin_mnemonic: self.change_admin_mnemonic,
                    gas_strategy: self.gas_strategy,
                    delay_block_mine: self.delay_block_mine,
                }))
            }
            "reset" => Ok(ControlCommand::Reset),
            "exploit" => Ok(ControlCommand::Exploit),
            "stop" => Ok(ControlCommand::Stop),
            _ => Err(RequestError::UnknownMethod(self.method)),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeyList {
    Joined(String),
    Items(Vec<String>),
}

fn key_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<KeyList>::deserialize(deserializer)?;
    let items: Vec<String> = match raw {
        None => Vec::new(),
        Some(KeyList::Joined(joined)) => joined.split(',').map(str::to_string).collect(),
        Some(KeyList::Items(items)) => items,
    };
    Ok(items
        .into_iter()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .collect())
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ControlRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_comma_separated_keys() {
        let request = parse(
            r#"{"method":"start","player_private_keys":"0xaa, 0xbb,","owner_private_keys":""}"#,
        );
        assert_eq!(request.player_private_keys, vec!["0xaa", "0xbb"]);
        assert!(request.owner_private_keys.is_empty());
    }

    #[test]
    fn test_array_keys_and_nulls() {
        let request = parse(
            r#"{"method":"start","owner_private_keys":["0x01"," 0x02 "],"player_private_keys":null,"gas_strategy":null}"#,
        );
        assert_eq!(request.owner_private_keys, vec!["0x01", "0x02"]);
        assert!(request.player_private_keys.is_empty());
        assert!(!request.gas_strategy);
    }

    #[test]
    fn test_start_maps_params() {
        let command = parse(
            r#"{"method":"Start","network":"goerli","change_admin_mnemonic":true,"delay_block_mine":true}"#,
        )
        .into_command()
        .unwrap();

        let ControlCommand::Start(params) = command else {
            panic!("expected start, got {command:?}");
        };
        assert_eq!(params.network, Network::Testnet);
        assert!(params.change_admin_mnemonic);
        assert!(params.delay_block_mine);
        assert!(!params.gas_strategy);
    }

    #[test]
    fn test_missing_network_is_local() {
        let command = parse(r#"{"method":"start"}"#).into_command().unwrap();
        assert_eq!(command, ControlCommand::Start(SessionParams::new(Network::Local)));
    }

    #[test]
    fn test_unsupported_network() {
        let err = parse(r#"{"method":"start","network":"mainnet"}"#)
            .into_command()
            .unwrap_err();
        assert_eq!(err, RequestError::UnsupportedNetwork("mainnet".to_string()));
        assert_eq!(err.reply(), UNSUPPORTED_NETWORK);
    }

    #[test]
    fn test_other_methods_ignore_network() {
        let command = parse(r#"{"method":"reset","network":"mainnet"}"#)
            .into_command()
            .unwrap();
        assert_eq!(command, ControlCommand::Reset);
    }

    #[test]
    fn test_unknown_method() {
        let err = parse(r#"{"method":"restart"}"#).into_command().unwrap_err();
        assert_eq!(err.reply(), UNKNOWN_METHOD);
    }
}
