use tokenguard_types::error::DeniedGate;
use tokenguard_types::{GatewayError, LimitProfile, UsageSnapshot};

use crate::clock::ms_to_secs_ceil;

pub type Gate = DeniedGate;

/// Why a request was refused and for how long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub gate: Gate,
    /// Ceiling of the failed gate (0 for the cooldown gate)
    pub limit: u64,
    /// Value observed before this request
    pub current: u64,
    /// Estimate of the refused request
    pub requested: u64,
    pub retry_after_secs: u64,
    pub reason: String,
}

impl Denial {
    /// Whether this denial starts a new cooldown.
    pub fn applies_cooldown(&self) -> bool {
        self.gate != Gate::Cooldown
    }
}

impl From<Denial> for GatewayError {
    fn from(denial: Denial) -> Self {
        GatewayError::AdmissionDenied {
            gate: denial.gate,
            reason: denial.reason,
            retry_after_secs: denial.retry_after_secs,
        }
    }
}

fn exceeds(current: u64, estimate: u64, limit: u64) -> bool {
    current.saturating_add(estimate) > limit
}

/// Run the gates against a usage snapshot. Pure; applying the cooldown is the
/// caller's job.
pub fn evaluate(
    profile: &LimitProfile,
    usage: &UsageSnapshot,
    estimate: u64,
    now_ms: i64,
) -> Option<Denial> {
    if usage.cooldown_until_ms > now_ms {
        let remaining = ms_to_secs_ceil(usage.cooldown_until_ms - now_ms);
        return Some(Denial {
            gate: Gate::Cooldown,
            limit: 0,
            current: 0,
            requested: estimate,
            retry_after_secs: remaining,
            reason: format!("Cooldown active. Retry in {remaining} seconds."),
        });
    }

    let cooldown = profile.cooldown_secs();
    let minutes = profile.cooldown_minutes;

    if usage.requests_this_minute >= profile.rpm {
        return Some(Denial {
            gate: Gate::RequestsPerMinute,
            limit: profile.rpm,
            current: usage.requests_this_minute,
            requested: estimate,
            retry_after_secs: cooldown,
            reason: format!(
                "Requests per minute limit exceeded ({}). Retry in {minutes} minutes.",
                profile.rpm
            ),
        });
    }

    let token_gates = [
        (Gate::TokensPerMinute, "Tokens per minute", usage.tokens_this_minute, profile.tpm, cooldown),
        (Gate::TokensPerHour, "Tokens per hour", usage.tokens_this_hour, profile.tph, cooldown),
        (
            Gate::TokensPerDay,
            "Daily token",
            usage.tokens_today,
            profile.daily,
            profile.daily_cooldown_secs(),
        ),
    ];

    token_gates.into_iter().find(|(_, _, current, limit, _)| exceeds(*current, estimate, *limit)).map(
        |(gate, label, current, limit, retry_after_secs)| Denial {
            gate,
            limit,
            current,
            requested: estimate,
            retry_after_secs,
            reason: format!(
                "{label} limit exceeded ({limit}). Current: {current}, requested: {estimate}."
            ),
        },
    )
}
