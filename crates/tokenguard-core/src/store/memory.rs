//! In-process, volatile usage store.

use super::window::IdentityWindow;
use super::{ReconcileOutcome, StoreResult, UsageStore, UsageTicket};
use crate::clock::{Clock, DAY_MS};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokenguard_types::models::UsageEntry;
use tokenguard_types::{TopEntry, UsagePeriod, UsageSnapshot, UsageStatistics};

/// Sliding logs keyed by identity. Each identity's log is mutated under its
/// map entry lock, so writers for one identity are serialized while other
/// shards stay available.
pub struct MemoryUsageStore {
    windows: DashMap<String, IdentityWindow>,
    next_id: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl MemoryUsageStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { windows: DashMap::new(), next_id: AtomicU64::new(1), clock }
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get_usage(&self, identity: &str) -> StoreResult<UsageSnapshot> {
        let now = self.clock.now_ms();
        Ok(self.windows.get(identity).map(|w| w.snapshot(now)).unwrap_or_default())
    }

    async fn record_usage(
        &self,
        identity: &str,
        tokens: u64,
        request_count: u64,
    ) -> StoreResult<UsageTicket> {
        let mut window = self.windows.entry(identity.to_string()).or_default();
        // read under the entry lock so each log stays sorted by timestamp
        let now = self.clock.now_ms();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        window.prune(now);
        window.push(id, now, tokens, request_count);
        Ok(UsageTicket(id))
    }

    async fn set_cooldown(&self, identity: &str, until_ms: i64) -> StoreResult<()> {
        self.windows.entry(identity.to_string()).or_default().cooldown_until_ms = until_ms;
        Ok(())
    }

    async fn update_actual(
        &self,
        identity: &str,
        ticket: Option<UsageTicket>,
        actual_input: u64,
        actual_output: u64,
    ) -> StoreResult<ReconcileOutcome> {
        let now = self.clock.now_ms();
        let actual = actual_input.saturating_add(actual_output);
        Ok(match self.windows.get_mut(identity) {
            Some(mut window) => window.reconcile(now, ticket, actual),
            None => ReconcileOutcome::NotFound,
        })
    }

    async fn reset(&self, identity: &str) -> StoreResult<()> {
        self.windows.remove(identity);
        Ok(())
    }

    async fn list_identities(&self) -> StoreResult<Vec<String>> {
        let mut identities: Vec<String> = self.windows.iter().map(|e| e.key().clone()).collect();
        identities.sort();
        Ok(identities)
    }

    async fn top(&self, limit: usize, period: UsagePeriod) -> StoreResult<Vec<TopEntry>> {
        let now = self.clock.now_ms();
        let mut ranked: Vec<TopEntry> = self
            .windows
            .iter()
            .filter_map(|entry| {
                let (tokens, requests) = match period.horizon_ms() {
                    Some(horizon) => entry.totals_within(now, horizon),
                    None => (entry.lifetime_tokens, entry.lifetime_requests),
                };
                (requests > 0 || tokens > 0).then(|| TopEntry {
                    identity: entry.key().clone(),
                    tokens,
                    requests,
                })
            })
            .collect();

        ranked.sort_by(|a, b| b.tokens.cmp(&a.tokens).then_with(|| a.identity.cmp(&b.identity)));
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn aggregate_statistics(&self) -> StoreResult<UsageStatistics> {
        let now = self.clock.now_ms();
        let mut stats = UsageStatistics::default();

        for entry in self.windows.iter() {
            stats.total_identities += 1;
            if entry.has_live_entries(now) {
                let (tokens, requests) = entry.totals_within(now, DAY_MS);
                stats.active_identities_today += 1;
                stats.total_tokens_today += tokens;
                stats.total_requests_today += requests;
            }
        }
        if stats.active_identities_today > 0 {
            stats.average_tokens_per_identity =
                stats.total_tokens_today as f64 / stats.active_identities_today as f64;
        }
        Ok(stats)
    }

    async fn history(&self, identity: &str, limit: usize) -> StoreResult<Vec<UsageEntry>> {
        let now = self.clock.now_ms();
        Ok(self.windows.get(identity).map(|w| w.recent(now, limit)).unwrap_or_default())
    }

    async fn cleanup_expired(&self) -> StoreResult<u64> {
        let now = self.clock.now_ms();
        let mut removed = 0;
        for mut entry in self.windows.iter_mut() {
            removed += entry.prune(now);
        }
        Ok(removed)
    }
}
