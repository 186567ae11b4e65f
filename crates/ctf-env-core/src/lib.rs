//! Core abstractions for ephemeral chain test sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `SessionParams` / `LifecycleState` - Session vocabulary
//! - `AccountSet` - Deterministic accounts from seeds or raw keys
//! - `DeployContext` / `DeployedRegistry` - What deploy collaborators see and produce
//! - `StatusLog` - Text accumulated for the next control response
//! - Collaborator and chain backend traits

pub mod accounts;
pub mod context;
pub mod session;
pub mod status_log;
pub mod traits;

pub use accounts::{Account, AccountError, AccountSet};
pub use context::{
    DeployContext, DeployedRegistry, ExploitContext, GasStrategy, Runnable, RunnableContext,
    SharedState,
};
pub use session::{LifecycleState, Network, SessionParams, UnsupportedNetwork};
pub use status_log::StatusLog;
pub use traits::{
    ChainBackend, Deployer, Exploiter, NetworkHandle, NodeError, NodeProcess, NodeRole, NodeSpec,
    Periodic, PortTimeoutError, ProcessWatch,
};
