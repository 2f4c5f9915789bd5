use tokenguard_types::models::{CooldownState, RemainingQuota, Utilization};
use tokenguard_types::{IdentityStatus, LimitProfile, Severity, UsageSnapshot};

use crate::clock::ms_to_secs_ceil;

/// `used / limit * 100`; a zero ceiling reports 0.
fn percent(used: u64, limit: u64) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    used as f64 * 100.0 / limit as f64
}

fn one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Assemble the status report for one identity.
pub fn build_status(
    identity: &str,
    profile: &LimitProfile,
    usage: &UsageSnapshot,
    now_ms: i64,
) -> IdentityStatus {
    let remaining_seconds = ms_to_secs_ceil(usage.cooldown_until_ms - now_ms);
    let cooldown = CooldownState { is_active: remaining_seconds > 0, remaining_seconds };

    let raw = Utilization {
        rpm_percent: percent(usage.requests_this_minute, profile.rpm),
        tpm_percent: percent(usage.tokens_this_minute, profile.tpm),
        tph_percent: percent(usage.tokens_this_hour, profile.tph),
        daily_percent: percent(usage.tokens_today, profile.daily),
    };
    // buckets use the exact ratio; rounding is for display only
    let severity = Severity::from_utilization(raw.max(), cooldown.is_active);
    let utilization = Utilization {
        rpm_percent: one_decimal(raw.rpm_percent),
        tpm_percent: one_decimal(raw.tpm_percent),
        tph_percent: one_decimal(raw.tph_percent),
        daily_percent: one_decimal(raw.daily_percent),
    };

    let status_summary = if cooldown.is_active {
        format!("in cooldown ({remaining_seconds}s remaining)")
    } else {
        severity.label().to_string()
    };

    IdentityStatus {
        identity: identity.to_string(),
        limits: profile.clone(),
        usage: *usage,
        remaining: RemainingQuota {
            requests_this_minute: profile.rpm.saturating_sub(usage.requests_this_minute),
            tokens_this_minute: profile.tpm.saturating_sub(usage.tokens_this_minute),
            tokens_this_hour: profile.tph.saturating_sub(usage.tokens_this_hour),
            tokens_today: profile.daily.saturating_sub(usage.tokens_today),
        },
        cooldown,
        utilization,
        severity,
        status_summary,
    }
}
