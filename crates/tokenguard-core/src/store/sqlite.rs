//! Durable usage store on SQLite.
//!
//! A fixed set of connections share one WAL database. Every identity hashes
//! onto one connection, so its read-modify-write transactions are serialized
//! there while other identities usually proceed on other connections.

use super::window::is_live;
use super::{ReconcileOutcome, StoreError, StoreResult, UsageStore, UsageTicket};
use crate::clock::{Clock, DAY_MS, HOUR_MS, MINUTE_MS};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokenguard_types::models::UsageEntry;
use tokenguard_types::{TopEntry, UsagePeriod, UsageSnapshot, UsageStatistics};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS usage_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identity TEXT NOT NULL,
    timestamp_ms INTEGER NOT NULL,
    tokens INTEGER NOT NULL,
    estimated_tokens INTEGER NOT NULL,
    requests INTEGER NOT NULL,
    reconciled INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_usage_identity_ts ON usage_entries (identity, timestamp_ms);
CREATE INDEX IF NOT EXISTS idx_usage_ts ON usage_entries (timestamp_ms);
CREATE TABLE IF NOT EXISTS cooldowns (
    identity TEXT PRIMARY KEY,
    until_ms INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS identity_totals (
    identity TEXT PRIMARY KEY,
    tokens INTEGER NOT NULL DEFAULT 0,
    requests INTEGER NOT NULL DEFAULT 0,
    first_seen_ms INTEGER NOT NULL,
    last_seen_ms INTEGER NOT NULL
);
";

type Shard = Arc<Mutex<Connection>>;

pub struct SqliteUsageStore {
    shards: Vec<Shard>,
    clock: Arc<dyn Clock>,
}

fn open_connection(path: &Path) -> StoreResult<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}

impl SqliteUsageStore {
    /// Open (or create) the database at `path` with `connections` shards.
    pub fn open(path: &Path, connections: usize, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }

        let first = open_connection(path)?;
        first.execute_batch(SCHEMA)?;

        let mut shards = vec![Arc::new(Mutex::new(first))];
        for _ in 1..connections.max(1) {
            shards.push(Arc::new(Mutex::new(open_connection(path)?)));
        }

        tracing::info!(path = %path.display(), connections = shards.len(), "SQLite usage store opened");
        Ok(Self { shards, clock })
    }

    fn shard_for(&self, identity: &str) -> Shard {
        let mut hasher = DefaultHasher::new();
        identity.hash(&mut hasher);
        let index = (hasher.finish() % self.shards.len() as u64) as usize;
        Arc::clone(&self.shards[index])
    }

    fn any_shard(&self) -> Shard {
        Arc::clone(&self.shards[0])
    }

    /// Run `f` on a blocking thread with the shard's connection locked.
    async fn with_conn<T, F>(&self, shard: Shard, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, i64) -> StoreResult<T> + Send + 'static,
    {
        let now = self.clock.now_ms();
        tokio::task::spawn_blocking(move || {
            let mut conn = shard.lock();
            f(&mut conn, now)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn to_u64(value: i64) -> u64 {
    value.max(0) as u64
}

fn cutoff(now: i64, horizon: i64) -> i64 {
    now.saturating_sub(horizon)
}

#[async_trait]
impl UsageStore for SqliteUsageStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn get_usage(&self, identity: &str) -> StoreResult<UsageSnapshot> {
        let identity = identity.to_string();
        self.with_conn(self.shard_for(&identity), move |conn, now| {
            let (requests_minute, tokens_minute, tokens_hour, tokens_day): (i64, i64, i64, i64) =
                conn.query_row(
                    "SELECT
                        COALESCE(SUM(CASE WHEN timestamp_ms > ?2 THEN requests END), 0),
                        COALESCE(SUM(CASE WHEN timestamp_ms > ?2 THEN tokens END), 0),
                        COALESCE(SUM(CASE WHEN timestamp_ms > ?3 THEN tokens END), 0),
                        COALESCE(SUM(tokens), 0)
                     FROM usage_entries WHERE identity = ?1 AND timestamp_ms > ?4",
                    params![
                        identity,
                        cutoff(now, MINUTE_MS),
                        cutoff(now, HOUR_MS),
                        cutoff(now, DAY_MS)
                    ],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )?;

            let cooldown_until_ms: i64 = conn
                .query_row(
                    "SELECT until_ms FROM cooldowns WHERE identity = ?1",
                    params![identity],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or(0);

            Ok(UsageSnapshot {
                requests_this_minute: to_u64(requests_minute),
                tokens_this_minute: to_u64(tokens_minute),
                tokens_this_hour: to_u64(tokens_hour),
                tokens_today: to_u64(tokens_day),
                cooldown_until_ms,
            })
        })
        .await
    }

    async fn record_usage(
        &self,
        identity: &str,
        tokens: u64,
        request_count: u64,
    ) -> StoreResult<UsageTicket> {
        let identity = identity.to_string();
        self.with_conn(self.shard_for(&identity), move |conn, now| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO usage_entries (identity, timestamp_ms, tokens, estimated_tokens, requests)
                 VALUES (?1, ?2, ?3, ?3, ?4)",
                params![identity, now, tokens as i64, request_count as i64],
            )?;
            let id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO identity_totals (identity, tokens, requests, first_seen_ms, last_seen_ms)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(identity) DO UPDATE SET
                    tokens = tokens + excluded.tokens,
                    requests = requests + excluded.requests,
                    last_seen_ms = excluded.last_seen_ms",
                params![identity, tokens as i64, request_count as i64, now],
            )?;
            tx.commit()?;
            Ok(UsageTicket(to_u64(id)))
        })
        .await
    }

    async fn set_cooldown(&self, identity: &str, until_ms: i64) -> StoreResult<()> {
        let identity = identity.to_string();
        self.with_conn(self.shard_for(&identity), move |conn, _now| {
            conn.execute(
                "INSERT INTO cooldowns (identity, until_ms) VALUES (?1, ?2)
                 ON CONFLICT(identity) DO UPDATE SET until_ms = excluded.until_ms",
                params![identity, until_ms],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_actual(
        &self,
        identity: &str,
        ticket: Option<UsageTicket>,
        actual_input: u64,
        actual_output: u64,
    ) -> StoreResult<ReconcileOutcome> {
        let identity = identity.to_string();
        let actual = actual_input.saturating_add(actual_output) as i64;
        self.with_conn(self.shard_for(&identity), move |conn, now| {
            let tx = conn.transaction()?;
            let found: Option<(i64, i64, i64)> = match ticket {
                Some(UsageTicket(id)) => tx
                    .query_row(
                        "SELECT id, timestamp_ms, tokens FROM usage_entries
                         WHERE identity = ?1 AND id = ?2",
                        params![identity, id as i64],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                    )
                    .optional()?,
                None => tx
                    .query_row(
                        "SELECT id, timestamp_ms, tokens FROM usage_entries
                         WHERE identity = ?1 ORDER BY id DESC LIMIT 1",
                        params![identity],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                    )
                    .optional()?,
            };

            let Some((id, timestamp_ms, tokens)) =
                found.filter(|(_, ts, _)| is_live(*ts, now, DAY_MS))
            else {
                return Ok(ReconcileOutcome::NotFound);
            };

            tx.execute(
                "UPDATE usage_entries SET tokens = ?2, reconciled = 1 WHERE id = ?1",
                params![id, actual],
            )?;

            let outcome = if tokens == actual {
                ReconcileOutcome::Unchanged
            } else {
                let delta = actual - tokens;
                tx.execute(
                    "UPDATE identity_totals SET tokens = MAX(0, tokens + ?2) WHERE identity = ?1",
                    params![identity, delta],
                )?;
                ReconcileOutcome::Applied { delta }
            };
            tx.commit()?;

            tracing::trace!(entry = id, timestamp_ms, "usage entry reconciled");
            Ok(outcome)
        })
        .await
    }

    async fn reset(&self, identity: &str) -> StoreResult<()> {
        let identity = identity.to_string();
        self.with_conn(self.shard_for(&identity), move |conn, _now| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM usage_entries WHERE identity = ?1", params![identity])?;
            tx.execute("DELETE FROM cooldowns WHERE identity = ?1", params![identity])?;
            tx.execute("DELETE FROM identity_totals WHERE identity = ?1", params![identity])?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn list_identities(&self) -> StoreResult<Vec<String>> {
        self.with_conn(self.any_shard(), |conn, _now| {
            let mut stmt = conn.prepare(
                "SELECT identity FROM identity_totals
                 UNION SELECT identity FROM cooldowns
                 ORDER BY identity",
            )?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let identities = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(identities)
        })
        .await
    }

    async fn top(&self, limit: usize, period: UsagePeriod) -> StoreResult<Vec<TopEntry>> {
        let limit = limit as i64;
        self.with_conn(self.any_shard(), move |conn, now| {
            let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<TopEntry> {
                Ok(TopEntry {
                    identity: row.get(0)?,
                    tokens: to_u64(row.get(1)?),
                    requests: to_u64(row.get(2)?),
                })
            };

            let entries = match period.horizon_ms() {
                Some(horizon) => {
                    let mut stmt = conn.prepare(
                        "SELECT identity, SUM(tokens) AS t, SUM(requests) FROM usage_entries
                         WHERE timestamp_ms > ?1
                         GROUP BY identity
                         ORDER BY t DESC, identity ASC
                         LIMIT ?2",
                    )?;
                    let rows = stmt.query_map(params![cutoff(now, horizon), limit], map_row)?;
                    let ranked = rows.collect::<Result<Vec<_>, _>>()?;
                    ranked
                },
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT identity, tokens, requests FROM identity_totals
                         WHERE tokens > 0 OR requests > 0
                         ORDER BY tokens DESC, identity ASC
                         LIMIT ?1",
                    )?;
                    let rows = stmt.query_map(params![limit], map_row)?;
                    let ranked = rows.collect::<Result<Vec<_>, _>>()?;
                    ranked
                },
            };
            Ok(entries)
        })
        .await
    }

    async fn aggregate_statistics(&self) -> StoreResult<UsageStatistics> {
        self.with_conn(self.any_shard(), |conn, now| {
            let total_identities: i64 = conn.query_row(
                "SELECT COUNT(*) FROM (
                    SELECT identity FROM identity_totals UNION SELECT identity FROM cooldowns
                 )",
                [],
                |row| row.get(0),
            )?;

            let (active, tokens, requests): (i64, i64, i64) = conn.query_row(
                "SELECT COUNT(DISTINCT identity), COALESCE(SUM(tokens), 0), COALESCE(SUM(requests), 0)
                 FROM usage_entries WHERE timestamp_ms > ?1",
                params![cutoff(now, DAY_MS)],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

            let average_tokens_per_identity =
                if active > 0 { tokens as f64 / active as f64 } else { 0.0 };

            Ok(UsageStatistics {
                total_identities: to_u64(total_identities),
                active_identities_today: to_u64(active),
                total_tokens_today: to_u64(tokens),
                total_requests_today: to_u64(requests),
                average_tokens_per_identity,
                degraded_admissions: 0,
            })
        })
        .await
    }

    async fn history(&self, identity: &str, limit: usize) -> StoreResult<Vec<UsageEntry>> {
        let identity = identity.to_string();
        let limit = limit as i64;
        self.with_conn(self.shard_for(&identity), move |conn, now| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp_ms, tokens, estimated_tokens, requests, reconciled
                 FROM usage_entries
                 WHERE identity = ?1 AND timestamp_ms > ?2
                 ORDER BY id DESC
                 LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![identity, cutoff(now, DAY_MS), limit], |row| {
                Ok(UsageEntry {
                    id: to_u64(row.get(0)?),
                    timestamp_ms: row.get(1)?,
                    tokens: to_u64(row.get(2)?),
                    estimated_tokens: to_u64(row.get(3)?),
                    requests: to_u64(row.get(4)?),
                    reconciled: row.get::<_, i64>(5)? != 0,
                })
            })?;
            let entries = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
    }

    async fn cleanup_expired(&self) -> StoreResult<u64> {
        self.with_conn(self.any_shard(), |conn, now| {
            let removed = conn.execute(
                "DELETE FROM usage_entries WHERE timestamp_ms <= ?1",
                params![cutoff(now, DAY_MS)],
            )?;
            conn.execute("DELETE FROM cooldowns WHERE until_ms <= ?1", params![now])?;
            Ok(removed as u64)
        })
        .await
    }
}
