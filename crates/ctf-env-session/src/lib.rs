//! Session lifecycle orchestration for ephemeral chain environments.
//!
//! Provides:
//! - `SessionController` - Start / reset / exploit / stop state machine
//! - `DeploymentDriver` - Ordered deploy collaborators and runnable tickers
//! - `ControllerConfig` - Ports, seeds and credentials

pub mod config;
pub mod controller;
pub mod driver;

pub use config::{ConfigError, ControllerConfig, NodePolicy};
pub use controller::{ControlCommand, SessionController, SessionError, SessionSnapshot};
pub use driver::{DeploymentDriver, RunnableSet};
