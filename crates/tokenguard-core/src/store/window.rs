//! Sliding log of one identity's admissions (memory backend).

use super::{ReconcileOutcome, UsageTicket};
use crate::clock::{DAY_MS, HOUR_MS, MINUTE_MS};
use std::collections::VecDeque;
use tokenguard_types::models::UsageEntry;
use tokenguard_types::UsageSnapshot;

/// Live when strictly younger than the horizon.
pub(super) fn is_live(timestamp_ms: i64, now_ms: i64, horizon_ms: i64) -> bool {
    timestamp_ms > now_ms.saturating_sub(horizon_ms)
}

#[derive(Debug, Default)]
pub(super) struct IdentityWindow {
    /// Oldest first
    entries: VecDeque<UsageEntry>,
    pub cooldown_until_ms: i64,
    pub lifetime_tokens: u64,
    pub lifetime_requests: u64,
}

impl IdentityWindow {
    pub fn snapshot(&self, now_ms: i64) -> UsageSnapshot {
        let mut snapshot = UsageSnapshot { cooldown_until_ms: self.cooldown_until_ms, ..Default::default() };

        for entry in self.entries.iter().rev() {
            if !is_live(entry.timestamp_ms, now_ms, DAY_MS) {
                break;
            }
            snapshot.tokens_today += entry.tokens;
            if is_live(entry.timestamp_ms, now_ms, HOUR_MS) {
                snapshot.tokens_this_hour += entry.tokens;
            }
            if is_live(entry.timestamp_ms, now_ms, MINUTE_MS) {
                snapshot.tokens_this_minute += entry.tokens;
                snapshot.requests_this_minute += entry.requests;
            }
        }
        snapshot
    }

    /// `(tokens, requests)` within `horizon_ms`.
    pub fn totals_within(&self, now_ms: i64, horizon_ms: i64) -> (u64, u64) {
        self.entries
            .iter()
            .rev()
            .take_while(|e| is_live(e.timestamp_ms, now_ms, horizon_ms))
            .fold((0, 0), |(t, r), e| (t + e.tokens, r + e.requests))
    }

    pub fn has_live_entries(&self, now_ms: i64) -> bool {
        self.entries.back().is_some_and(|e| is_live(e.timestamp_ms, now_ms, DAY_MS))
    }

    pub fn push(&mut self, id: u64, now_ms: i64, tokens: u64, requests: u64) {
        self.entries.push_back(UsageEntry {
            id,
            timestamp_ms: now_ms,
            tokens,
            estimated_tokens: tokens,
            requests,
            reconciled: false,
        });
        self.lifetime_tokens = self.lifetime_tokens.saturating_add(tokens);
        self.lifetime_requests = self.lifetime_requests.saturating_add(requests);
    }

    pub fn reconcile(
        &mut self,
        now_ms: i64,
        ticket: Option<UsageTicket>,
        actual: u64,
    ) -> ReconcileOutcome {
        let entry = match ticket {
            Some(UsageTicket(id)) => self.entries.iter_mut().rev().find(|e| e.id == id),
            None => self.entries.back_mut(),
        };
        let Some(entry) = entry.filter(|e| is_live(e.timestamp_ms, now_ms, DAY_MS)) else {
            return ReconcileOutcome::NotFound;
        };

        entry.reconciled = true;
        if entry.tokens == actual {
            return ReconcileOutcome::Unchanged;
        }

        let delta = actual as i64 - entry.tokens as i64;
        entry.tokens = actual;
        self.lifetime_tokens = self.lifetime_tokens.saturating_add_signed(delta);
        ReconcileOutcome::Applied { delta }
    }

    /// Entries newest first.
    pub fn recent(&self, now_ms: i64, limit: usize) -> Vec<UsageEntry> {
        self.entries
            .iter()
            .rev()
            .take_while(|e| is_live(e.timestamp_ms, now_ms, DAY_MS))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Drop day-expired entries and a lapsed cooldown; returns entries removed.
    pub fn prune(&mut self, now_ms: i64) -> u64 {
        let before = self.entries.len();
        while self.entries.front().is_some_and(|e| !is_live(e.timestamp_ms, now_ms, DAY_MS)) {
            self.entries.pop_front();
        }
        if self.cooldown_until_ms != 0 && self.cooldown_until_ms <= now_ms {
            self.cooldown_until_ms = 0;
        }
        (before - self.entries.len()) as u64
    }
}
