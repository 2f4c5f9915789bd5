//! Typed error definitions for TokenGuard.
//!
//! - [`GatewayError`]: what a caller of the gateway can observe
//! - [`ConfigError`]: configuration loading and validation failures
//!
//! Both are serializable so they can travel in API responses unchanged.

mod config;
mod gateway;

pub use config::ConfigError;
pub use gateway::{DeniedGate, GatewayError};
