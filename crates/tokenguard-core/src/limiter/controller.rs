use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use tokenguard_types::models::UsageEntry;
use tokenguard_types::{GatewayError, IdentityStatus, TopEntry, UsagePeriod, UsageStatistics};

use super::gates::{evaluate, Denial};
use super::profiles::LimitRegistry;
use super::status::build_status;
use crate::clock::Clock;
use crate::metrics;
use crate::store::{ReconcileOutcome, StoreError, StoreResult, UsageStore, UsageTicket};

/// Outcome of an admission decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Allowed {
        /// Entry charged for this request; `None` when nothing was recorded
        ticket: Option<UsageTicket>,
        /// Decided without the usage store (fail-open)
        degraded: bool,
    },
    Denied(Denial),
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Human-readable denial reason.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Allowed { .. } => None,
            Self::Denied(denial) => Some(&denial.reason),
        }
    }
}

/// Decides allow/deny per identity and keeps the store's counters current.
///
/// Check-and-record (or check-and-cooldown) for one identity runs under that
/// identity's async lock; distinct identities never share a lock.
pub struct AdmissionController {
    store: Arc<dyn UsageStore>,
    limits: LimitRegistry,
    clock: Arc<dyn Clock>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    fail_open: bool,
    degraded_admissions: AtomicU64,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn UsageStore>, limits: LimitRegistry, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            limits,
            clock,
            locks: DashMap::new(),
            fail_open: true,
            degraded_admissions: AtomicU64::new(0),
        }
    }

    /// Deny with `StoreUnavailable` instead of failing open.
    pub fn with_fail_open(mut self, fail_open: bool) -> Self {
        self.fail_open = fail_open;
        self
    }

    pub fn limits(&self) -> &LimitRegistry {
        &self.limits
    }

    pub fn store(&self) -> &Arc<dyn UsageStore> {
        &self.store
    }

    pub fn fail_open(&self) -> bool {
        self.fail_open
    }

    pub fn degraded_admissions(&self) -> u64 {
        self.degraded_admissions.load(Ordering::Relaxed)
    }

    fn identity_lock(&self, identity: &str) -> Arc<Mutex<()>> {
        self.locks.entry(identity.to_string()).or_default().value().clone()
    }

    /// Gates plus recording of one request and `estimate` tokens on pass.
    pub async fn admit(&self, identity: &str, estimate: u64) -> Result<Admission, GatewayError> {
        self.decide(identity, estimate, true).await
    }

    /// Gates only. A failing gate still applies its cooldown.
    pub async fn check(&self, identity: &str, estimate: u64) -> Result<Admission, GatewayError> {
        self.decide(identity, estimate, false).await
    }

    async fn decide(
        &self,
        identity: &str,
        estimate: u64,
        record: bool,
    ) -> Result<Admission, GatewayError> {
        let lock = self.identity_lock(identity);
        let _guard = lock.lock().await;

        let usage = match self.store.get_usage(identity).await {
            Ok(usage) => usage,
            Err(err) => return self.degraded(identity, estimate, record, &err).await,
        };

        let now = self.clock.now_ms();
        let profile = self.limits.resolve(identity);

        if let Some(denial) = evaluate(&profile, &usage, estimate, now) {
            if denial.applies_cooldown() {
                let until = now.saturating_add((denial.retry_after_secs as i64).saturating_mul(1000));
                match self.store.set_cooldown(identity, until).await {
                    Ok(()) => warn!(
                        identity,
                        gate = %denial.gate,
                        cooldown_secs = denial.retry_after_secs,
                        "Cooldown applied"
                    ),
                    Err(err) => error!(identity, error = %err, "Failed to persist cooldown"),
                }
            }
            warn!(
                identity,
                gate = %denial.gate,
                current = denial.current,
                limit = denial.limit,
                requested = estimate,
                "Admission denied"
            );
            metrics::record_denial(denial.gate.as_str());
            return Ok(Admission::Denied(denial));
        }

        if !record {
            return Ok(Admission::Allowed { ticket: None, degraded: false });
        }

        match self.store.record_usage(identity, estimate, 1).await {
            Ok(ticket) => {
                debug!(identity, tokens = estimate, ticket = ticket.0, "Usage recorded");
                Ok(Admission::Allowed { ticket: Some(ticket), degraded: false })
            },
            Err(err) => {
                self.note_degraded(identity, &err);
                Ok(Admission::Allowed { ticket: None, degraded: true })
            },
        }
    }

    fn note_degraded(&self, identity: &str, err: &StoreError) {
        self.degraded_admissions.fetch_add(1, Ordering::Relaxed);
        metrics::record_degraded();
        warn!(
            target: "tokenguard::degraded",
            identity,
            error = %err,
            "Usage store unavailable, admitting without enforcement"
        );
    }

    async fn degraded(
        &self,
        identity: &str,
        estimate: u64,
        record: bool,
        err: &StoreError,
    ) -> Result<Admission, GatewayError> {
        if !self.fail_open {
            error!(identity, error = %err, "Usage store unavailable, rejecting (fail-open disabled)");
            return Err(GatewayError::StoreUnavailable { message: err.to_string() });
        }

        self.note_degraded(identity, err);
        let ticket = if record {
            self.store.record_usage(identity, estimate, 1).await.ok()
        } else {
            None
        };
        Ok(Admission::Allowed { ticket, degraded: true })
    }

    /// Record usage outside the admission path.
    pub async fn record(
        &self,
        identity: &str,
        input_tokens: u64,
        output_tokens: u64,
        request_count: u64,
    ) -> StoreResult<UsageTicket> {
        let lock = self.identity_lock(identity);
        let _guard = lock.lock().await;
        let tokens = input_tokens.saturating_add(output_tokens);
        let ticket = self.store.record_usage(identity, tokens, request_count).await?;
        debug!(identity, input_tokens, output_tokens, request_count, "Usage recorded");
        Ok(ticket)
    }

    /// Replace an estimate with actual usage. Duplicates are no-ops.
    pub async fn reconcile(
        &self,
        identity: &str,
        ticket: Option<UsageTicket>,
        actual_input: u64,
        actual_output: u64,
    ) -> StoreResult<ReconcileOutcome> {
        let lock = self.identity_lock(identity);
        let _guard = lock.lock().await;

        let result = self.store.update_actual(identity, ticket, actual_input, actual_output).await;
        match &result {
            Ok(outcome) => {
                metrics::record_reconciliation(outcome.as_str());
                debug!(
                    identity,
                    actual_input,
                    actual_output,
                    outcome = outcome.as_str(),
                    "Usage reconciled"
                );
            },
            Err(err) => {
                metrics::record_reconciliation("error");
                error!(identity, error = %err, "Usage reconciliation failed");
            },
        }
        result
    }

    pub async fn status(&self, identity: &str) -> StoreResult<IdentityStatus> {
        let usage = self.store.get_usage(identity).await?;
        let profile = self.limits.resolve(identity);
        Ok(build_status(identity, &profile, &usage, self.clock.now_ms()))
    }

    pub async fn reset(&self, identity: &str) -> StoreResult<()> {
        let lock = self.identity_lock(identity);
        let _guard = lock.lock().await;
        self.store.reset(identity).await?;
        tracing::info!(identity, "Usage reset");
        Ok(())
    }

    pub async fn list_identities(&self) -> StoreResult<Vec<String>> {
        self.store.list_identities().await
    }

    pub async fn top(&self, limit: usize, period: UsagePeriod) -> StoreResult<Vec<TopEntry>> {
        self.store.top(limit, period).await
    }

    pub async fn history(
        &self,
        identity: &str,
        limit: usize,
    ) -> StoreResult<Vec<UsageEntry>> {
        self.store.history(identity, limit).await
    }

    pub async fn statistics(&self) -> StoreResult<UsageStatistics> {
        let mut stats = self.store.aggregate_statistics().await?;
        stats.degraded_admissions = self.degraded_admissions();
        Ok(stats)
    }

    /// Reclaim expired store data and idle identity locks.
    pub async fn sweep(&self) -> StoreResult<u64> {
        let removed = self.store.cleanup_expired().await?;
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        debug!(removed, locks = self.locks.len(), "Expired usage swept");
        Ok(removed)
    }
}
