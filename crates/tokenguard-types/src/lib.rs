//! # TokenGuard Types
//!
//! Serializable domain types shared by the gateway core and the server:
//!
//! - [`models`]: limit profiles, usage snapshots, status reports, configuration
//! - [`error`]: the caller-visible error taxonomy
//!
//! Nothing in this crate performs I/O.

pub mod error;
pub mod models;

pub use error::{ConfigError, GatewayError};
pub use models::{
    CostEstimate, GatewayConfig, IdentityStatus, LimitProfile, Severity, TopEntry, UsagePeriod,
    UsageSnapshot, UsageStatistics,
};
