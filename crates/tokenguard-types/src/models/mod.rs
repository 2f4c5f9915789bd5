//! Core domain models for TokenGuard.
//!
//! This module contains all shared data structures used across the gateway.

pub mod config;
mod cost;
mod limits;
mod status;
mod usage;

// Re-export all models
pub use config::GatewayConfig;
pub use cost::{CostEstimate, Pricing};
pub use limits::LimitProfile;
pub use status::{
    CooldownState, IdentityStatus, RemainingQuota, Severity, Utilization,
};
pub use usage::{TopEntry, UsageEntry, UsagePeriod, UsageSnapshot, UsageStatistics};
