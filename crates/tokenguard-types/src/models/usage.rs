//! Usage window models.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Live aggregates for one identity at one instant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct UsageSnapshot {
    /// Requests recorded in the trailing minute
    pub requests_this_minute: u64,
    /// Tokens recorded in the trailing minute
    pub tokens_this_minute: u64,
    /// Tokens recorded in the trailing hour
    pub tokens_this_hour: u64,
    /// Tokens recorded in the trailing 24 hours
    pub tokens_today: u64,
    /// Cooldown deadline (Unix ms); 0 when none was ever set
    pub cooldown_until_ms: i64,
}

/// One recorded admission in an identity's sliding log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageEntry {
    /// Entry id (the ticket handed out at record time)
    pub id: u64,
    /// When the entry was recorded (Unix ms)
    pub timestamp_ms: i64,
    /// Tokens currently attributed (estimate, or actual once reconciled)
    pub tokens: u64,
    /// Tokens charged at admission time
    pub estimated_tokens: u64,
    /// Requests counted by this entry
    pub requests: u64,
    /// Whether actual usage has replaced the estimate
    pub reconciled: bool,
}

/// Reporting period for top-N queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UsagePeriod {
    /// Trailing minute
    Minute,
    /// Trailing hour
    Hour,
    /// Trailing 24 hours
    #[default]
    Today,
    /// Lifetime totals
    AllTime,
}

impl UsagePeriod {
    /// Window horizon in milliseconds, `None` for lifetime totals.
    pub fn horizon_ms(&self) -> Option<i64> {
        match self {
            Self::Minute => Some(60_000),
            Self::Hour => Some(3_600_000),
            Self::Today => Some(86_400_000),
            Self::AllTime => None,
        }
    }
}

impl fmt::Display for UsagePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Minute => write!(f, "minute"),
            Self::Hour => write!(f, "hour"),
            Self::Today => write!(f, "today"),
            Self::AllTime => write!(f, "all_time"),
        }
    }
}

impl FromStr for UsagePeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minute" => Ok(Self::Minute),
            "hour" => Ok(Self::Hour),
            "today" | "day" => Ok(Self::Today),
            "all_time" | "all-time" | "all" => Ok(Self::AllTime),
            other => Err(format!("unknown usage period '{other}'")),
        }
    }
}

/// Row in a top-N ranking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopEntry {
    pub identity: String,
    pub tokens: u64,
    pub requests: u64,
}

/// Global aggregate snapshot across all identities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UsageStatistics {
    /// Identities the store has ever seen
    pub total_identities: u64,
    /// Identities with at least one entry in the trailing 24 hours
    pub active_identities_today: u64,
    /// Tokens recorded in the trailing 24 hours
    pub total_tokens_today: u64,
    /// Requests recorded in the trailing 24 hours
    pub total_requests_today: u64,
    /// `total_tokens_today / active_identities_today`
    pub average_tokens_per_identity: f64,
    /// Admissions decided in degraded (fail-open) mode since start
    #[serde(default)]
    pub degraded_admissions: u64,
}
