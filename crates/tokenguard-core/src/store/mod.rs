//! Usage store abstraction.
//!
//! The admission controller only sees [`UsageStore`]; the concrete backend
//! (volatile [`MemoryUsageStore`] or durable [`SqliteUsageStore`]) is chosen
//! once at startup by [`open_store`].

mod memory;
mod sqlite;
mod window;

#[cfg(test)]
mod tests;

pub use memory::MemoryUsageStore;
pub use sqlite::SqliteUsageStore;

use crate::clock::Clock;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokenguard_types::models::config::{StorageBackend, StorageConfig};
use tokenguard_types::models::UsageEntry;
use tokenguard_types::{TopEntry, UsagePeriod, UsageSnapshot, UsageStatistics};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Usage store unavailable: {0}")]
    Unavailable(String),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Store task failed: {0}")]
    Task(String),
}

/// Handle to one recorded admission, used to target reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct UsageTicket(pub u64);

/// Result of replacing an estimate with actual usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Entry tokens changed by `delta` (positive: deficit added, negative: excess released)
    Applied { delta: i64 },
    /// Entry already carried the actual value
    Unchanged,
    /// No live entry for the identity/ticket
    NotFound,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::Unchanged => "unchanged",
            Self::NotFound => "not_found",
        }
    }
}

/// Counter backend used by the admission controller.
///
/// Writes for one identity are atomic with respect to each other; different
/// identities never wait on each other beyond the backend's own sharding.
/// An entry contributes to a window while its age is below the window horizon.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Short backend name for status reports.
    fn backend_name(&self) -> &'static str;

    async fn get_usage(&self, identity: &str) -> StoreResult<UsageSnapshot>;

    /// Append one entry of `tokens` and `request_count` requests.
    async fn record_usage(
        &self,
        identity: &str,
        tokens: u64,
        request_count: u64,
    ) -> StoreResult<UsageTicket>;

    /// Overwrite the cooldown deadline (Unix ms).
    async fn set_cooldown(&self, identity: &str, until_ms: i64) -> StoreResult<()>;

    /// Replace the tokens of `ticket` (or of the most recent entry when `None`)
    /// with `actual_input + actual_output`.
    async fn update_actual(
        &self,
        identity: &str,
        ticket: Option<UsageTicket>,
        actual_input: u64,
        actual_output: u64,
    ) -> StoreResult<ReconcileOutcome>;

    /// Drop every counter, total and cooldown of an identity.
    async fn reset(&self, identity: &str) -> StoreResult<()>;

    /// Identities with recorded usage or a cooldown, sorted.
    async fn list_identities(&self) -> StoreResult<Vec<String>>;

    /// Identities ranked by tokens over `period`, ties by name.
    async fn top(&self, limit: usize, period: UsagePeriod) -> StoreResult<Vec<TopEntry>>;

    async fn aggregate_statistics(&self) -> StoreResult<UsageStatistics>;

    /// Most recent live entries of an identity, newest first.
    async fn history(&self, identity: &str, limit: usize) -> StoreResult<Vec<UsageEntry>>;

    /// Physically remove day-expired entries and lapsed cooldowns.
    /// Returns the number of entries removed.
    async fn cleanup_expired(&self) -> StoreResult<u64>;
}

/// Default SQLite location: `<data dir>/tokenguard/usage.db`.
pub fn default_sqlite_path() -> StoreResult<PathBuf> {
    let base = dirs::data_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| StoreError::Unavailable("cannot determine data directory".to_string()))?;
    Ok(base.join("tokenguard").join("usage.db"))
}

/// Build the backend selected by configuration.
pub fn open_store(config: &StorageConfig, clock: Arc<dyn Clock>) -> StoreResult<Arc<dyn UsageStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryUsageStore::new(clock))),
        StorageBackend::Sqlite => {
            let path = match &config.sqlite_path {
                Some(path) => path.clone(),
                None => default_sqlite_path()?,
            };
            let store = SqliteUsageStore::open(&path, config.sqlite_connections, clock)?;
            Ok(Arc::new(store))
        },
    }
}
