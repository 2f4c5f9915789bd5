use super::*;
use crate::clock::{Clock, ManualClock, MINUTE_MS};
use crate::store::{MemoryUsageStore, ReconcileOutcome, StoreError, StoreResult, UsageStore, UsageTicket};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokenguard_types::models::UsageEntry;
use tokenguard_types::{
    GatewayError, LimitProfile, Severity, TopEntry, UsagePeriod, UsageSnapshot, UsageStatistics,
};

const START_MS: i64 = 1_700_000_000_000;

fn controller_with(profile: LimitProfile) -> (AdmissionController, ManualClock) {
    let clock = ManualClock::new(START_MS);
    let store = Arc::new(MemoryUsageStore::new(Arc::new(clock.clone())));
    let controller =
        AdmissionController::new(store, LimitRegistry::new(profile), Arc::new(clock.clone()));
    (controller, clock)
}

fn denial(admission: &Admission) -> &Denial {
    match admission {
        Admission::Denied(denial) => denial,
        Admission::Allowed { .. } => panic!("expected denial, got {admission:?}"),
    }
}

/// Store whose every call fails.
struct FailingStore;

fn down<T>() -> StoreResult<T> {
    Err(StoreError::Unavailable("connection refused".to_string()))
}

#[async_trait]
impl UsageStore for FailingStore {
    fn backend_name(&self) -> &'static str {
        "failing"
    }
    async fn get_usage(&self, _: &str) -> StoreResult<UsageSnapshot> {
        down()
    }
    async fn record_usage(&self, _: &str, _: u64, _: u64) -> StoreResult<UsageTicket> {
        down()
    }
    async fn set_cooldown(&self, _: &str, _: i64) -> StoreResult<()> {
        down()
    }
    async fn update_actual(
        &self,
        _: &str,
        _: Option<UsageTicket>,
        _: u64,
        _: u64,
    ) -> StoreResult<ReconcileOutcome> {
        down()
    }
    async fn reset(&self, _: &str) -> StoreResult<()> {
        down()
    }
    async fn list_identities(&self) -> StoreResult<Vec<String>> {
        down()
    }
    async fn top(&self, _: usize, _: UsagePeriod) -> StoreResult<Vec<TopEntry>> {
        down()
    }
    async fn aggregate_statistics(&self) -> StoreResult<UsageStatistics> {
        down()
    }
    async fn history(&self, _: &str, _: usize) -> StoreResult<Vec<UsageEntry>> {
        down()
    }
    async fn cleanup_expired(&self) -> StoreResult<u64> {
        down()
    }
}

#[tokio::test]
async fn test_rpm_plus_one_is_denied_with_cooldown() {
    let profile = LimitProfile { rpm: 5, ..Default::default() };
    let (controller, clock) = controller_with(profile);

    for _ in 0..5 {
        assert!(controller.admit("u1", 0).await.unwrap().is_allowed());
    }
    let sixth = controller.admit("u1", 0).await.unwrap();
    let denial = denial(&sixth);
    assert_eq!(denial.gate, Gate::RequestsPerMinute);
    assert_eq!(denial.limit, 5);
    assert_eq!(denial.retry_after_secs, 180);

    let usage = controller.store().get_usage("u1").await.unwrap();
    assert!(usage.cooldown_until_ms > clock.now_ms());
    assert_eq!(usage.requests_this_minute, 5);
}

#[tokio::test]
async fn test_tpm_scenario_then_cooldown() {
    let (controller, clock) = controller_with(LimitProfile::default());

    let first = controller.admit("u1", 4000).await.unwrap();
    assert!(first.is_allowed());
    assert_eq!(controller.store().get_usage("u1").await.unwrap().tokens_this_minute, 4000);

    let second = controller.admit("u1", 1200).await.unwrap();
    let second = denial(&second);
    assert_eq!(second.gate, Gate::TokensPerMinute);
    assert_eq!((second.current, second.requested, second.limit), (4000, 1200, 5000));
    assert!(second.reason.contains("Tokens per minute"));

    clock.advance_ms(1);
    let third = controller.admit("u1", 1).await.unwrap();
    let third = denial(&third);
    assert_eq!(third.gate, Gate::Cooldown);
    assert!(third.retry_after_secs <= 3 * 60);
    assert!(third.retry_after_secs > 0);

    // denied requests never add tokens
    assert_eq!(controller.store().get_usage("u1").await.unwrap().tokens_this_minute, 4000);
}

#[tokio::test]
async fn test_cooldown_expires() {
    let profile = LimitProfile { tpm: 100, cooldown_minutes: 1, ..Default::default() };
    let (controller, clock) = controller_with(profile);

    assert!(!controller.admit("u1", 500).await.unwrap().is_allowed());
    clock.advance_ms(MINUTE_MS - 1);
    assert_eq!(denial(&controller.admit("u1", 1).await.unwrap()).gate, Gate::Cooldown);

    clock.advance_ms(1);
    assert!(controller.admit("u1", 1).await.unwrap().is_allowed());
}

#[tokio::test]
async fn test_hour_gate() {
    let profile = LimitProfile { tpm: 1000, tph: 1500, ..Default::default() };
    let (controller, clock) = controller_with(profile);

    assert!(controller.admit("u1", 900).await.unwrap().is_allowed());
    clock.advance_ms(MINUTE_MS);
    let denied = controller.admit("u1", 900).await.unwrap();
    let denied = denial(&denied);
    assert_eq!(denied.gate, Gate::TokensPerHour);
    assert_eq!(denied.retry_after_secs, 180);
}

#[tokio::test]
async fn test_daily_gate_doubles_cooldown() {
    let profile = LimitProfile { tpm: 10_000, tph: 10_000, daily: 100, ..Default::default() };
    let (controller, clock) = controller_with(profile);

    let denied = controller.admit("u1", 101).await.unwrap();
    let denied = denial(&denied);
    assert_eq!(denied.gate, Gate::TokensPerDay);
    assert_eq!(denied.retry_after_secs, 360);

    let usage = controller.store().get_usage("u1").await.unwrap();
    assert_eq!(usage.cooldown_until_ms, clock.now_ms() + 360_000);
}

#[tokio::test]
async fn test_first_failing_gate_wins() {
    // Both rpm and tpm fail; rpm is checked first.
    let profile = LimitProfile { rpm: 0, tpm: 0, ..Default::default() };
    let (controller, _clock) = controller_with(profile);
    assert_eq!(denial(&controller.admit("u1", 10).await.unwrap()).gate, Gate::RequestsPerMinute);
}

#[tokio::test]
async fn test_fail_open_allows_when_store_errors() {
    let clock = ManualClock::new(START_MS);
    let controller = AdmissionController::new(
        Arc::new(FailingStore),
        LimitRegistry::new(LimitProfile { rpm: 0, ..Default::default() }),
        Arc::new(clock),
    );

    for _ in 0..3 {
        let admission = controller.check("u1", 1_000_000).await.unwrap();
        assert_eq!(admission, Admission::Allowed { ticket: None, degraded: true });
        assert!(controller.admit("u1", 1_000_000).await.unwrap().is_allowed());
    }
    assert_eq!(controller.degraded_admissions(), 6);
}

#[tokio::test]
async fn test_fail_closed_is_opt_in() {
    let controller = AdmissionController::new(
        Arc::new(FailingStore),
        LimitRegistry::default(),
        Arc::new(ManualClock::new(START_MS)),
    )
    .with_fail_open(false);

    let err = controller.admit("u1", 1).await.unwrap_err();
    assert!(matches!(err, GatewayError::StoreUnavailable { .. }));
    assert_eq!(err.http_status_code(), 503);
}

#[tokio::test]
async fn test_check_does_not_record() {
    let (controller, _clock) = controller_with(LimitProfile::default());
    let admission = controller.check("u1", 100).await.unwrap();
    assert_eq!(admission.reason(), None);
    assert_eq!(controller.store().get_usage("u1").await.unwrap(), UsageSnapshot::default());
}

#[tokio::test]
async fn test_record_and_reconcile_are_idempotent() {
    let (controller, _clock) = controller_with(LimitProfile::default());
    let Admission::Allowed { ticket, .. } = controller.admit("u1", 600).await.unwrap() else {
        panic!("expected allow");
    };

    let first = controller.reconcile("u1", ticket, 100, 150).await.unwrap();
    assert_eq!(first, ReconcileOutcome::Applied { delta: -350 });
    let second = controller.reconcile("u1", ticket, 100, 150).await.unwrap();
    assert_eq!(second, ReconcileOutcome::Unchanged);
    assert_eq!(controller.store().get_usage("u1").await.unwrap().tokens_this_minute, 250);

    controller.record("u1", 10, 20, 2).await.unwrap();
    let usage = controller.store().get_usage("u1").await.unwrap();
    assert_eq!(usage.tokens_this_minute, 280);
    assert_eq!(usage.requests_this_minute, 3);
}

#[tokio::test]
async fn test_concurrent_admissions_respect_rpm() {
    let profile = LimitProfile { rpm: 10, ..Default::default() };
    let (controller, _clock) = controller_with(profile);
    let controller = Arc::new(controller);

    let mut handles = Vec::new();
    for _ in 0..25 {
        let controller = Arc::clone(&controller);
        handles.push(tokio::spawn(async move { controller.admit("u1", 0).await.unwrap() }));
    }
    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap().is_allowed() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 10);
}

#[tokio::test]
async fn test_explicit_profile_and_default_fallback() {
    let (controller, _clock) = controller_with(LimitProfile::default());
    controller.limits().set_profile("vip", LimitProfile { tpm: 50_000, ..Default::default() });

    assert!(controller.admit("vip", 20_000).await.unwrap().is_allowed());
    assert!(!controller.admit("anonymous", 20_000).await.unwrap().is_allowed());

    controller.limits().set_profile("anonymous", LimitProfile { tpm: 50_000, ..Default::default() });
    assert_eq!(controller.limits().resolve("anonymous").tpm, 50_000);
}

#[test]
fn test_replace_profiles_swaps_snapshot() {
    let registry = LimitRegistry::new(LimitProfile::default());
    registry.set_profile("old", LimitProfile::default());
    let before = registry.snapshot();

    let mut profiles = HashMap::new();
    profiles.insert("a".to_string(), LimitProfile { rpm: 1, ..Default::default() });
    profiles.insert("b".to_string(), LimitProfile { rpm: 2, ..Default::default() });
    let count = registry.replace_profiles(profiles, Some(LimitProfile { rpm: 99, ..Default::default() }));

    assert_eq!(count, 2);
    assert_eq!(registry.resolve("old").rpm, 99);
    assert_eq!(registry.resolve("b").rpm, 2);
    // earlier readers keep their snapshot
    assert!(before.profiles.contains_key("old"));
}

#[tokio::test]
async fn test_status_report() {
    let profile = LimitProfile { rpm: 10, tpm: 1000, tph: 10_000, daily: 100_000, ..Default::default() };
    let (controller, _clock) = controller_with(profile);
    controller.admit("u1", 750).await.unwrap();

    let status = controller.status("u1").await.unwrap();
    assert_eq!(status.utilization.tpm_percent, 75.0);
    assert_eq!(status.utilization.rpm_percent, 10.0);
    assert_eq!(status.remaining.tokens_this_minute, 250);
    assert_eq!(status.severity, Severity::Warning);
    assert!(!status.cooldown.is_active);

    controller.admit("u1", 500).await.unwrap();
    let status = controller.status("u1").await.unwrap();
    assert_eq!(status.severity, Severity::InCooldown);
    assert_eq!(status.cooldown.remaining_seconds, 180);
}

#[test]
fn test_status_zero_limit_reports_zero_percent() {
    let profile = LimitProfile { rpm: 0, ..Default::default() };
    let usage = UsageSnapshot { requests_this_minute: 3, ..Default::default() };
    let status = build_status("u1", &profile, &usage, START_MS);
    assert_eq!(status.utilization.rpm_percent, 0.0);
    assert_eq!(status.remaining.requests_this_minute, 0);
}

#[test]
fn test_severity_buckets_use_unrounded_utilization() {
    let profile = LimitProfile { tpm: 100_000, ..Default::default() };
    let cases = [
        (89_960, 90.0, Severity::Warning),
        (90_000, 90.0, Severity::Critical),
        (69_960, 70.0, Severity::Moderate),
        (70_000, 70.0, Severity::Warning),
        (49_960, 50.0, Severity::Nominal),
        (50_000, 50.0, Severity::Moderate),
    ];
    for (tokens, shown, expected) in cases {
        let usage = UsageSnapshot { tokens_this_minute: tokens, ..Default::default() };
        let status = build_status("u1", &profile, &usage, START_MS);
        assert_eq!(status.utilization.tpm_percent, shown, "tokens={tokens}");
        assert_eq!(status.severity, expected, "tokens={tokens}");
    }
}

#[tokio::test]
async fn test_reset_and_statistics() {
    let (controller, _clock) = controller_with(LimitProfile { tpm: 10, ..Default::default() });
    controller.admit("u1", 5).await.unwrap();
    assert!(!controller.admit("u1", 10).await.unwrap().is_allowed());

    controller.reset("u1").await.unwrap();
    assert!(controller.admit("u1", 1).await.unwrap().is_allowed());

    let stats = controller.statistics().await.unwrap();
    assert_eq!(stats.total_identities, 1);
    assert_eq!(stats.total_tokens_today, 1);
    assert_eq!(stats.degraded_admissions, 0);
    assert_eq!(controller.sweep().await.unwrap(), 0);
}
