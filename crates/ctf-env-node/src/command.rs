//! Node simulator command lines.

use ctf_env_core::NodeSpec;
use thiserror::Error;

/// Command build error.
#[derive(Debug, Error)]
pub enum CommandBuildError {
    #[error("Base command cannot be parsed: {0}")]
    InvalidBase(String),
    #[error("Base command is empty after parsing")]
    EmptyCommand,
    #[error("Extra arguments cannot be parsed: {0}")]
    InvalidExtraArgs(String),
}

/// Parsed command parts (program + args).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandParts {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandParts {
    #[must_use]
    pub const fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }
}

/// Supported node simulators and their flag dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Simulator {
    Anvil,
    Ganache,
}

impl Simulator {
    /// Default executable name.
    #[must_use]
    pub const fn program(self) -> &'static str {
        match self {
            Self::Anvil => "anvil",
            Self::Ganache => "ganache-cli",
        }
    }

    fn base(self, port: u16) -> String {
        match self {
            Self::Anvil => format!(
                "anvil --accounts 10 --port {port} --block-base-fee-per-gas 0 --chain-id 1337"
            ),
            Self::Ganache => format!(
                "ganache-cli --chain.vmErrorsOnRPCResponse true --wallet.totalAccounts 10 \
                 --hardfork istanbul --miner.blockGasLimit 12000000 -p {port}"
            ),
        }
    }

    const fn mnemonic_flag(self) -> &'static str {
        match self {
            Self::Anvil => "--mnemonic",
            Self::Ganache => "--wallet.mnemonic",
        }
    }

    const fn fork_url_flag(self) -> &'static str {
        match self {
            Self::Anvil => "--fork-url",
            Self::Ganache => "--fork.url",
        }
    }

    const fn fork_block_flag(self) -> &'static str {
        match self {
            Self::Anvil => "--fork-block-number",
            Self::Ganache => "--fork.blockNumber",
        }
    }

    /// Build the full command line for `spec`.
    ///
    /// # Errors
    /// Returns error if the extra arguments are not valid shell words.
    pub fn command(self, spec: &NodeSpec) -> Result<CommandParts, CommandBuildError> {
        let mut builder = CommandBuilder::new(self.base(spec.port))
            .param(self.mnemonic_flag())
            .param(&spec.mnemonic);

        if let Some(url) = non_empty(spec.fork_url.as_deref()) {
            builder = builder.param(self.fork_url_flag()).param(url);
        }
        if let Some(block) = non_empty(spec.fork_block.as_deref()) {
            builder = builder.param(self.fork_block_flag()).param(block);
        }
        if !spec.extra_args.trim().is_empty() {
            let extra = shlex::split(&spec.extra_args)
                .ok_or_else(|| CommandBuildError::InvalidExtraArgs(spec.extra_args.clone()))?;
            builder = builder.extend_params(extra);
        }
        if spec.block_delay {
            builder = builder.param("--blockTime").param("1");
        }

        builder.build()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Builder for constructing commands.
#[derive(Debug, Clone)]
struct CommandBuilder {
    base: String,
    params: Vec<String>,
}

impl CommandBuilder {
    fn new<S: Into<String>>(base: S) -> Self {
        Self {
            base: base.into(),
            params: Vec::new(),
        }
    }

    fn param<S: Into<String>>(mut self, param: S) -> Self {
        self.params.push(param.into());
        self
    }

    fn extend_params<I>(mut self, more: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.params.extend(more.into_iter().map(Into::into));
        self
    }

    fn build(self) -> Result<CommandParts, CommandBuildError> {
        let mut parts = shlex::split(&self.base)
            .ok_or_else(|| CommandBuildError::InvalidBase(self.base.clone()))?;
        parts.extend(self.params);

        if parts.is_empty() {
            return Err(CommandBuildError::EmptyCommand);
        }

        let program = parts.remove(0);
        Ok(CommandParts::new(program, parts))
    }
}
