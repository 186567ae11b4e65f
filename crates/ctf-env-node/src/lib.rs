//! Local chain node supervision.
//!
//! Provides:
//! - `wait_for_port` - Readiness barrier between launch and deploy
//! - `NodeSupervisor` - Launch anvil, falling back to ganache
//! - `LocalChain` - `ChainBackend` over the supervisor and JSON-RPC snapshots

pub mod chain;
pub mod command;
pub mod port;
pub mod resolve;
pub mod supervisor;

pub use chain::LocalChain;
pub use command::{CommandBuildError, CommandParts, Simulator};
pub use port::wait_for_port;
pub use resolve::resolve_executable_path;
pub use supervisor::NodeSupervisor;
