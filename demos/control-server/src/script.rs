//! Collaborators backed by external commands.
//!
//! Scripts receive the RPC endpoint and accounts through the environment.
//! Deploy scripts report contracts on stdout as `Name=0xADDRESS`; any other
//! stdout line is relayed to the client.

use std::{process::Stdio, str::FromStr, sync::Arc, time::Duration};

use alloy::primitives::Address;
use anyhow::Context;
use async_trait::async_trait;
use ctf_env_core::{
    AccountSet, DeployContext, Deployer, ExploitContext, Exploiter, Periodic, RunnableContext,
};
use ctf_env_session::ConfigError;
use serde_json::Value;
use tokio::process::Command;

const DEFAULT_WATCH_EVERY: Duration = Duration::from_secs(1);

/// Collaborator commands read from the environment.
#[derive(Debug, Clone, Default)]
pub struct ScriptConfig {
    pub deploy_private: Option<String>,
    pub deploy_public: Option<String>,
    pub exploit: Option<String>,
    pub watch: Option<String>,
    pub watch_every: Duration,
}

impl ScriptConfig {
    /// # Errors
    /// Returns error if `CTF_WATCH_EVERY_MS` is not a whole number.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read commands through `lookup`; blank values count as unset.
    ///
    /// # Errors
    /// Returns error if `CTF_WATCH_EVERY_MS` is not a whole number.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let watch_every = get("CTF_WATCH_EVERY_MS")
            .map(|value| {
                value
                    .parse::<u64>()
                    .map_err(|e| ConfigError::Invalid {
                        key: "CTF_WATCH_EVERY_MS",
                        reason: e.to_string(),
                        value,
                    })
            })
            .transpose()?
            .map_or(DEFAULT_WATCH_EVERY, Duration::from_millis);

        Ok(Self {
            deploy_private: get("CTF_DEPLOY_PRIVATE"),
            deploy_public: get("CTF_DEPLOY_PUBLIC"),
            exploit: get("CTF_EXPLOIT"),
            watch: get("CTF_WATCH"),
            watch_every,
        })
    }
}

fn account_env(deployers: &AccountSet, players: &AccountSet) -> Vec<(&'static str, String)> {
    let keys = |set: &AccountSet| {
        set.iter()
            .map(|a| a.private_key().to_string())
            .collect::<Vec<_>>()
            .join(",")
    };
    let addresses = |set: &AccountSet| {
        set.iter()
            .map(|a| a.address().to_string())
            .collect::<Vec<_>>()
            .join(",")
    };
    vec![
        ("DEPLOYER_KEYS", keys(deployers)),
        ("DEPLOYER_ADDRESSES", addresses(deployers)),
        ("PLAYER_KEYS", keys(players)),
        ("PLAYER_ADDRESSES", addresses(players)),
    ]
}

async fn run_script(command: &str, envs: Vec<(&'static str, String)>) -> anyhow::Result<String> {
    let parts = shlex::split(command).with_context(|| format!("cannot parse command: {command}"))?;
    let (program, args) = parts.split_first().context("empty command")?;

    let output = Command::new(program)
        .args(args)
        .envs(envs)
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("failed to run {program}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("{program} exited with {}: {}", output.status, stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Splits a `Name=0xADDRESS` report line.
fn contract_line(line: &str) -> Option<(&str, Address)> {
    let (name, address) = line.split_once('=')?;
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Address::from_str(address.trim()).ok().map(|a| (name, a))
}

/// Deploy stage running one command.
pub struct ScriptDeployer {
    stage: &'static str,
    command: Option<String>,
    runnable: Option<(String, Duration)>,
}

impl ScriptDeployer {
    #[must_use]
    pub const fn new(stage: &'static str, command: Option<String>) -> Self {
        Self {
            stage,
            command,
            runnable: None,
        }
    }

    /// Register `command` as a runnable after every successful deploy.
    #[must_use]
    pub fn with_runnable(mut self, command: Option<String>, every: Duration) -> Self {
        self.runnable = command.map(|c| (c, every));
        self
    }
}

#[async_trait]
impl Deployer for ScriptDeployer {
    async fn deploy(
        &self,
        ctx: &mut DeployContext,
        deployers: &AccountSet,
        players: &AccountSet,
    ) -> anyhow::Result<()> {
        if let Some(command) = &self.command {
            let mut envs = account_env(deployers, players);
            envs.push(("RPC_URL", ctx.rpc_url.clone()));
            envs.push(("NETWORK", ctx.network.to_string()));
            envs.push(("STATE", Value::Object(ctx.state.clone()).to_string()));
            if let Some(gas) = ctx.gas_strategy {
                envs.push(("GAS_INITIAL_GWEI", gas.initial_gwei.to_string()));
                envs.push(("GAS_MAX_GWEI", gas.max_gwei.to_string()));
                envs.push(("GAS_INCREMENT", gas.increment.to_string()));
            }

            let stdout = run_script(command, envs).await?;
            for line in stdout.lines() {
                if let Some((name, address)) = contract_line(line) {
                    ctx.registry.record(name, address);
                    ctx.state
                        .insert(name.to_string(), Value::String(address.to_string()));
                } else if !line.trim().is_empty() {
                    ctx.log.push(line);
                }
            }
        } else {
            tracing::debug!(stage = self.stage, "No deploy command configured");
        }

        if let Some((command, every)) = &self.runnable {
            let task = Arc::new(ScriptRunnable {
                command: command.clone(),
            });
            ctx.register_runnable(format!("{}-watch", self.stage), *every, task);
        }
        Ok(())
    }
}

/// Exploit collaborator running one command.
pub struct ScriptExploiter {
    command: Option<String>,
}

impl ScriptExploiter {
    #[must_use]
    pub const fn new(command: Option<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Exploiter for ScriptExploiter {
    async fn run(
        &self,
        ctx: &mut ExploitContext,
        deployers: &AccountSet,
        players: &AccountSet,
    ) -> anyhow::Result<()> {
        let command = self.command.as_deref().context("no exploit command configured")?;
        let mut envs = account_env(deployers, players);
        envs.push(("RPC_URL", ctx.rpc_url.clone()));
        envs.push(("NETWORK", ctx.network.to_string()));

        let stdout = run_script(command, envs).await?;
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            ctx.log.push(line);
        }
        Ok(())
    }
}

/// Periodic command; output goes to the operator log only.
struct ScriptRunnable {
    command: String,
}

#[async_trait]
impl Periodic for ScriptRunnable {
    async fn tick(&self, ctx: &RunnableContext) -> anyhow::Result<()> {
        let mut envs = account_env(&ctx.deployers, &ctx.players);
        envs.push(("RPC_URL", ctx.rpc_url.clone()));
        envs.push(("STATE", Value::Object((*ctx.state).clone()).to_string()));

        let stdout = run_script(&self.command, envs).await?;
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            tracing::info!(target: "ctf_env::watch", "{line}");
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::collections::HashMap;

    use ctf_env_core::Network;

    use super::*;

    const TOKEN: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    #[test]
    fn test_contract_line() {
        let line = format!("Token={TOKEN}");
        let (name, address) = contract_line(&line).unwrap();
        assert_eq!(name, "Token");
        assert_eq!(address, Address::from_str(TOKEN).unwrap());

        assert!(contract_line("Deploying Token").is_none());
        assert!(contract_line("gas used = 21000").is_none());
        assert!(contract_line("Token=not-an-address").is_none());
    }

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_script_config_defaults() {
        let config = ScriptConfig::from_lookup(lookup(&[
            ("CTF_EXPLOIT", "  ./exploit.sh  "),
            ("CTF_WATCH", " "),
        ]))
        .unwrap();
        assert_eq!(config.exploit.as_deref(), Some("./exploit.sh"));
        assert!(config.watch.is_none());
        assert_eq!(config.watch_every, DEFAULT_WATCH_EVERY);

        let config = ScriptConfig::from_lookup(lookup(&[("CTF_WATCH_EVERY_MS", "250")])).unwrap();
        assert_eq!(config.watch_every, Duration::from_millis(250));
    }

    #[test]
    fn test_malformed_watch_interval_rejected() {
        let err = ScriptConfig::from_lookup(lookup(&[("CTF_WATCH_EVERY_MS", "1s")])).unwrap_err();
        let ConfigError::Invalid { key, value, .. } = err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!((key, value.as_str()), ("CTF_WATCH_EVERY_MS", "1s"));
    }

    #[tokio::test]
    async fn test_deploy_records_contracts() {
        let command = format!("sh -c 'echo compiling; echo Token={TOKEN}; echo rpc $RPC_URL'");
        let deployer = ScriptDeployer::new("private", Some(command));
        let mut ctx = DeployContext::new(Network::Local, "http://127.0.0.1:8545", None);

        tokio_test::assert_ok!(
            deployer
                .deploy(&mut ctx, &AccountSet::default(), &AccountSet::default())
                .await
        );

        assert_eq!(ctx.registry.latest("Token"), Address::from_str(TOKEN).ok());
        let token = Address::from_str(TOKEN).unwrap();
        assert_eq!(ctx.state["Token"], Value::String(token.to_string()));
        let lines: Vec<&str> = ctx.log.lines().collect();
        assert_eq!(lines, vec!["compiling", "rpc http://127.0.0.1:8545"]);
        assert!(ctx.runnables().is_empty());
    }

    #[tokio::test]
    async fn test_deploy_registers_watch() {
        let deployer = ScriptDeployer::new("public", None)
            .with_runnable(Some("true".to_string()), Duration::from_millis(500));
        let mut ctx = DeployContext::new(Network::Local, "http://127.0.0.1:8545", None);

        tokio_test::assert_ok!(
            deployer
                .deploy(&mut ctx, &AccountSet::default(), &AccountSet::default())
                .await
        );
        assert_eq!(ctx.runnables().len(), 1);
        assert_eq!(ctx.runnables()[0].name, "public-watch");
    }

    #[tokio::test]
    async fn test_failing_script_reports_stderr() {
        let exploiter = ScriptExploiter::new(Some("sh -c 'echo reverted >&2; exit 3'".to_string()));
        let mut ctx = ExploitContext::new(Network::Local, "http://127.0.0.1:8545");

        let err = exploiter
            .run(&mut ctx, &AccountSet::default(), &AccountSet::default())
            .await
            .unwrap_err();
        assert!(err.to_string().ends_with(": reverted"), "{err}");
    }

    #[tokio::test]
    async fn test_missing_exploit_command() {
        let exploiter = ScriptExploiter::new(None);
        let mut ctx = ExploitContext::new(Network::Local, "http://127.0.0.1:8545");

        let err = exploiter
            .run(&mut ctx, &AccountSet::default(), &AccountSet::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "no exploit command configured");
    }
}
