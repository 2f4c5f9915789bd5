//! Per-identity status report.

use super::{LimitProfile, UsageSnapshot};
use serde::{Deserialize, Serialize};

/// Coarse severity derived from the highest utilization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Cooldown active; overrides every utilization bucket
    InCooldown,
    /// At least 90% of some ceiling used
    Critical,
    /// At least 70%
    Warning,
    /// At least 50%
    Moderate,
    /// Below 50%
    Nominal,
}

impl Severity {
    /// Classify a maximum utilization percentage.
    pub fn from_utilization(max_percent: f64, in_cooldown: bool) -> Self {
        if in_cooldown {
            Self::InCooldown
        } else if max_percent >= 90.0 {
            Self::Critical
        } else if max_percent >= 70.0 {
            Self::Warning
        } else if max_percent >= 50.0 {
            Self::Moderate
        } else {
            Self::Nominal
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::InCooldown => "in cooldown",
            Self::Critical => "critical (90%+ used)",
            Self::Warning => "warning (70%+ used)",
            Self::Moderate => "moderate (50%+ used)",
            Self::Nominal => "nominal (under 50% used)",
        }
    }
}

/// Quota left per metric.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RemainingQuota {
    pub requests_this_minute: u64,
    pub tokens_this_minute: u64,
    pub tokens_this_hour: u64,
    pub tokens_today: u64,
}

/// `used / limit * 100` per metric, rounded to one decimal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Utilization {
    pub rpm_percent: f64,
    pub tpm_percent: f64,
    pub tph_percent: f64,
    pub daily_percent: f64,
}

impl Utilization {
    pub fn max(&self) -> f64 {
        self.rpm_percent.max(self.tpm_percent).max(self.tph_percent).max(self.daily_percent)
    }
}

/// Cooldown state at report time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CooldownState {
    pub is_active: bool,
    pub remaining_seconds: u64,
}

/// Snapshot returned by the status query surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityStatus {
    pub identity: String,
    pub limits: LimitProfile,
    pub usage: UsageSnapshot,
    pub remaining: RemainingQuota,
    pub cooldown: CooldownState,
    pub utilization: Utilization,
    pub severity: Severity,
    /// Human-readable form of `severity`
    pub status_summary: String,
}
