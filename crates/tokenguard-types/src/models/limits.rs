//! Per-identity quota ceilings.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Four-ceiling quota configuration plus cooldown duration.
///
/// Profiles are immutable once built; reconfiguration replaces them wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
pub struct LimitProfile {
    /// Requests per minute
    pub rpm: u64,
    /// Tokens per minute
    pub tpm: u64,
    /// Tokens per hour
    pub tph: u64,
    /// Tokens per rolling 24 hours
    pub daily: u64,
    /// Cooldown applied after a violation, in minutes (doubled for the daily gate)
    #[validate(range(max = 10080_u64))]
    pub cooldown_minutes: u64,
    /// Free-form operator note
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Default for LimitProfile {
    fn default() -> Self {
        Self {
            rpm: 30,
            tpm: 5000,
            tph: 300_000,
            daily: 500_000,
            cooldown_minutes: 3,
            description: String::new(),
        }
    }
}

impl LimitProfile {
    /// Cooldown for the per-minute and per-hour gates, in seconds.
    pub fn cooldown_secs(&self) -> u64 {
        self.cooldown_minutes.saturating_mul(60)
    }

    /// Cooldown for the daily gate: twice the regular duration.
    pub fn daily_cooldown_secs(&self) -> u64 {
        self.cooldown_secs().saturating_mul(2)
    }
}
