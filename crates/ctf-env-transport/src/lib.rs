//! Control endpoint for the session controller.
//!
//! Provides:
//! - Wire protocol (JSON request, plain-text reply)
//! - HTTP transport (feature: http)

pub mod protocol;

#[cfg(feature = "http")]
pub mod http;

pub use protocol::{ControlRequest, RequestError};
