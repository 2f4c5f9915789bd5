use super::*;
use crate::clock::{ManualClock, DAY_MS, HOUR_MS, MINUTE_MS};
use tempfile::TempDir;

const START_MS: i64 = 1_700_000_000_000;

struct Fixture {
    store: Arc<dyn UsageStore>,
    clock: ManualClock,
    _dir: Option<TempDir>,
}

fn memory() -> Fixture {
    let clock = ManualClock::new(START_MS);
    let store: Arc<dyn UsageStore> = Arc::new(MemoryUsageStore::new(Arc::new(clock.clone())));
    Fixture { store, clock, _dir: None }
}

fn sqlite() -> Fixture {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new(START_MS);
    let store = SqliteUsageStore::open(&dir.path().join("usage.db"), 2, Arc::new(clock.clone()))
        .unwrap();
    Fixture { store: Arc::new(store), clock, _dir: Some(dir) }
}

fn both() -> Vec<Fixture> {
    vec![memory(), sqlite()]
}

#[tokio::test]
async fn test_record_updates_all_windows() {
    for f in both() {
        f.store.record_usage("u1", 400, 1).await.unwrap();
        f.store.record_usage("u1", 100, 1).await.unwrap();

        let usage = f.store.get_usage("u1").await.unwrap();
        let name = f.store.backend_name();
        assert_eq!(usage.requests_this_minute, 2, "{name}");
        assert_eq!(usage.tokens_this_minute, 500, "{name}");
        assert_eq!(usage.tokens_this_hour, 500, "{name}");
        assert_eq!(usage.tokens_today, 500, "{name}");
        assert_eq!(usage.cooldown_until_ms, 0, "{name}");

        assert_eq!(f.store.get_usage("other").await.unwrap(), UsageSnapshot::default());
    }
}

#[tokio::test]
async fn test_entries_expire_per_horizon() {
    for f in both() {
        let name = f.store.backend_name();
        f.store.record_usage("u1", 50, 1).await.unwrap();

        f.clock.advance_ms(MINUTE_MS - 1);
        assert_eq!(f.store.get_usage("u1").await.unwrap().tokens_this_minute, 50, "{name}");

        f.clock.advance_ms(1);
        let usage = f.store.get_usage("u1").await.unwrap();
        assert_eq!(usage.requests_this_minute, 0, "{name}");
        assert_eq!(usage.tokens_this_minute, 0, "{name}");
        assert_eq!(usage.tokens_this_hour, 50, "{name}");

        f.clock.set_ms(START_MS + HOUR_MS);
        let usage = f.store.get_usage("u1").await.unwrap();
        assert_eq!(usage.tokens_this_hour, 0, "{name}");
        assert_eq!(usage.tokens_today, 50, "{name}");

        f.clock.set_ms(START_MS + DAY_MS);
        assert_eq!(f.store.get_usage("u1").await.unwrap().tokens_today, 0, "{name}");
    }
}

#[tokio::test]
async fn test_cooldown_is_overwritten() {
    for f in both() {
        f.store.set_cooldown("u1", START_MS + 5_000).await.unwrap();
        f.store.set_cooldown("u1", START_MS + 9_000).await.unwrap();
        assert_eq!(f.store.get_usage("u1").await.unwrap().cooldown_until_ms, START_MS + 9_000);
    }
}

#[tokio::test]
async fn test_reconcile_replaces_estimate_once() {
    for f in both() {
        let name = f.store.backend_name();
        let ticket = f.store.record_usage("u1", 1000, 1).await.unwrap();

        let first = f.store.update_actual("u1", Some(ticket), 200, 300).await.unwrap();
        assert_eq!(first, ReconcileOutcome::Applied { delta: -500 }, "{name}");
        let after_first = f.store.get_usage("u1").await.unwrap();

        let second = f.store.update_actual("u1", Some(ticket), 200, 300).await.unwrap();
        assert_eq!(second, ReconcileOutcome::Unchanged, "{name}");
        assert_eq!(f.store.get_usage("u1").await.unwrap(), after_first, "{name}");
        assert_eq!(after_first.tokens_this_minute, 500, "{name}");
        assert_eq!(after_first.requests_this_minute, 1, "{name}");

        let history = f.store.history("u1", 10).await.unwrap();
        assert!(history[0].reconciled, "{name}");
        assert_eq!(history[0].estimated_tokens, 1000, "{name}");
        assert_eq!(history[0].tokens, 500, "{name}");
    }
}

#[tokio::test]
async fn test_reconcile_adds_deficit_to_most_recent_entry() {
    for f in both() {
        let name = f.store.backend_name();
        f.store.record_usage("u1", 100, 1).await.unwrap();
        f.store.record_usage("u1", 100, 1).await.unwrap();

        let outcome = f.store.update_actual("u1", None, 150, 100).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Applied { delta: 150 }, "{name}");
        assert_eq!(f.store.get_usage("u1").await.unwrap().tokens_this_minute, 350, "{name}");

        let top = f.store.top(5, UsagePeriod::AllTime).await.unwrap();
        assert_eq!(top[0].tokens, 350, "{name}");
    }
}

#[tokio::test]
async fn test_reconcile_only_touches_live_windows() {
    for f in both() {
        let name = f.store.backend_name();
        let ticket = f.store.record_usage("u1", 800, 1).await.unwrap();
        f.clock.advance_ms(2 * MINUTE_MS);

        f.store.update_actual("u1", Some(ticket), 100, 0).await.unwrap();
        let usage = f.store.get_usage("u1").await.unwrap();
        assert_eq!(usage.tokens_this_minute, 0, "{name}");
        assert_eq!(usage.tokens_this_hour, 100, "{name}");
    }
}

#[tokio::test]
async fn test_reconcile_unknown_identity_or_expired_entry() {
    for f in both() {
        let name = f.store.backend_name();
        assert_eq!(
            f.store.update_actual("ghost", None, 1, 1).await.unwrap(),
            ReconcileOutcome::NotFound,
            "{name}"
        );

        let ticket = f.store.record_usage("u1", 10, 1).await.unwrap();
        f.clock.advance_ms(DAY_MS);
        assert_eq!(
            f.store.update_actual("u1", Some(ticket), 1, 1).await.unwrap(),
            ReconcileOutcome::NotFound,
            "{name}"
        );
    }
}

#[tokio::test]
async fn test_reset_clears_counters_and_cooldown() {
    for f in both() {
        let name = f.store.backend_name();
        f.store.record_usage("u1", 10, 1).await.unwrap();
        f.store.set_cooldown("u1", START_MS + 60_000).await.unwrap();
        f.store.record_usage("u2", 10, 1).await.unwrap();

        f.store.reset("u1").await.unwrap();
        assert_eq!(f.store.get_usage("u1").await.unwrap(), UsageSnapshot::default(), "{name}");
        assert_eq!(f.store.list_identities().await.unwrap(), vec!["u2".to_string()], "{name}");
    }
}

#[tokio::test]
async fn test_top_ranks_by_tokens_then_name() {
    for f in both() {
        let name = f.store.backend_name();
        f.store.record_usage("carol", 300, 1).await.unwrap();
        f.store.record_usage("bob", 500, 2).await.unwrap();
        f.store.record_usage("alice", 500, 1).await.unwrap();

        let top = f.store.top(2, UsagePeriod::Today).await.unwrap();
        let names: Vec<&str> = top.iter().map(|e| e.identity.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"], "{name}");
        assert_eq!(top[1].requests, 2, "{name}");

        f.clock.advance_ms(MINUTE_MS);
        assert!(f.store.top(10, UsagePeriod::Minute).await.unwrap().is_empty(), "{name}");
        assert_eq!(f.store.top(10, UsagePeriod::Hour).await.unwrap().len(), 3, "{name}");
    }
}

#[tokio::test]
async fn test_aggregate_statistics() {
    for f in both() {
        let name = f.store.backend_name();
        f.store.record_usage("u1", 100, 1).await.unwrap();
        f.store.record_usage("u2", 300, 1).await.unwrap();
        f.clock.advance_ms(DAY_MS - HOUR_MS);
        f.store.record_usage("u3", 0, 1).await.unwrap();
        f.clock.advance_ms(HOUR_MS);

        let stats = f.store.aggregate_statistics().await.unwrap();
        assert_eq!(stats.total_identities, 3, "{name}");
        assert_eq!(stats.active_identities_today, 1, "{name}");
        assert_eq!(stats.total_requests_today, 1, "{name}");
        assert_eq!(stats.total_tokens_today, 0, "{name}");
    }
}

#[tokio::test]
async fn test_cleanup_removes_day_expired_entries() {
    for f in both() {
        let name = f.store.backend_name();
        f.store.record_usage("u1", 10, 1).await.unwrap();
        f.store.set_cooldown("u1", START_MS + 1_000).await.unwrap();
        f.clock.advance_ms(DAY_MS - 1);
        f.store.record_usage("u1", 20, 1).await.unwrap();
        f.clock.advance_ms(1);

        assert_eq!(f.store.cleanup_expired().await.unwrap(), 1, "{name}");
        let history = f.store.history("u1", 10).await.unwrap();
        assert_eq!(history.len(), 1, "{name}");
        assert_eq!(history[0].tokens, 20, "{name}");
        assert_eq!(f.store.get_usage("u1").await.unwrap().cooldown_until_ms, 0, "{name}");
    }
}

#[tokio::test]
async fn test_history_newest_first_with_limit() {
    for f in both() {
        for tokens in [1, 2, 3] {
            f.store.record_usage("u1", tokens, 1).await.unwrap();
            f.clock.advance_ms(10);
        }
        let history = f.store.history("u1", 2).await.unwrap();
        let tokens: Vec<u64> = history.iter().map(|e| e.tokens).collect();
        assert_eq!(tokens, vec![3, 2]);
    }
}

#[tokio::test]
async fn test_concurrent_records_are_not_lost() {
    for f in both() {
        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = Arc::clone(&f.store);
            handles.push(tokio::spawn(async move {
                store.record_usage("shared", 5, 1).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let usage = f.store.get_usage("shared").await.unwrap();
        assert_eq!(usage.requests_this_minute, 20);
        assert_eq!(usage.tokens_this_minute, 100);
    }
}

/// Advances one millisecond on every read.
struct TickingClock(std::sync::atomic::AtomicI64);

impl Clock for TickingClock {
    fn now_ms(&self) -> i64 {
        self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_log_stays_ordered_under_concurrent_records() {
    let store: Arc<dyn UsageStore> =
        Arc::new(MemoryUsageStore::new(Arc::new(TickingClock(START_MS.into()))));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            for _ in 0..50 {
                store.record_usage("shared", 1, 1).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let history = store.history("shared", 1000).await.unwrap();
    assert_eq!(history.len(), 400);
    for pair in history.windows(2) {
        assert!(pair[0].timestamp_ms > pair[1].timestamp_ms);
        assert!(pair[0].id > pair[1].id);
    }
}

#[tokio::test]
async fn test_sqlite_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("usage.db");
    let clock = ManualClock::new(START_MS);

    {
        let store = SqliteUsageStore::open(&path, 1, Arc::new(clock.clone())).unwrap();
        store.record_usage("u1", 42, 1).await.unwrap();
        store.set_cooldown("u1", START_MS + 30_000).await.unwrap();
    }

    let reopened = SqliteUsageStore::open(&path, 3, Arc::new(clock.clone())).unwrap();
    let usage = reopened.get_usage("u1").await.unwrap();
    assert_eq!(usage.tokens_today, 42);
    assert_eq!(usage.cooldown_until_ms, START_MS + 30_000);
}

#[test]
fn test_open_store_selects_backend() {
    let dir = TempDir::new().unwrap();
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(START_MS));

    let memory = StorageConfig { backend: StorageBackend::Memory, ..Default::default() };
    assert_eq!(open_store(&memory, Arc::clone(&clock)).unwrap().backend_name(), "memory");

    let sqlite = StorageConfig {
        backend: StorageBackend::Sqlite,
        sqlite_path: Some(dir.path().join("usage.db")),
        ..Default::default()
    };
    assert_eq!(open_store(&sqlite, clock).unwrap().backend_name(), "sqlite");
}
