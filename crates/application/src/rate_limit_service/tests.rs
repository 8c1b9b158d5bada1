use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rategate_core::{AppError, AppResult};
use tokio::sync::Mutex;

use super::{RateLimitRule, RateLimitService, RateLimitStore};

#[derive(Default)]
struct FakeState {
    counters: HashMap<String, i64>,
    expiries: HashMap<String, Instant>,
}

/// In-file store double with lazy expiry and per-operation failure toggles.
#[derive(Default)]
struct FakeStore {
    state: Mutex<FakeState>,
    fail_exists: AtomicBool,
    fail_increment: AtomicBool,
    fail_set_expiring: AtomicBool,
}

impl FakeStore {
    fn new() -> Self {
        Self::default()
    }

    fn failure() -> AppError {
        AppError::Internal("simulated store failure".to_owned())
    }

    /// Clears all records, standing in for backend-enforced expiry of state
    /// whose TTL has not yet elapsed in the test.
    async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.counters.clear();
        state.expiries.clear();
    }
}

#[async_trait]
impl RateLimitStore for FakeStore {
    async fn increment(&self, key: &str, expiry: Duration) -> AppResult<i64> {
        if self.fail_increment.load(Ordering::SeqCst) {
            return Err(Self::failure());
        }

        let mut state = self.state.lock().await;
        let now = Instant::now();
        if state
            .expiries
            .get(key)
            .is_some_and(|expires_at| *expires_at <= now)
        {
            state.counters.remove(key);
        }

        let count = *state
            .counters
            .entry(key.to_owned())
            .and_modify(|count| *count += 1)
            .or_insert(1);
        state.expiries.insert(key.to_owned(), now + expiry);
        Ok(count)
    }

    async fn get_count(&self, key: &str) -> AppResult<i64> {
        let state = self.state.lock().await;
        if state
            .expiries
            .get(key)
            .is_none_or(|expires_at| *expires_at <= Instant::now())
        {
            return Ok(0);
        }

        Ok(state.counters.get(key).copied().unwrap_or(0))
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        if self.fail_exists.load(Ordering::SeqCst) {
            return Err(Self::failure());
        }

        let state = self.state.lock().await;
        Ok(state
            .expiries
            .get(key)
            .is_some_and(|expires_at| *expires_at > Instant::now()))
    }

    async fn set_expiring(&self, key: &str, _value: &str, expiry: Duration) -> AppResult<()> {
        if self.fail_set_expiring.load(Ordering::SeqCst) {
            return Err(Self::failure());
        }

        let mut state = self.state.lock().await;
        state.expiries.insert(key.to_owned(), Instant::now() + expiry);
        Ok(())
    }

    async fn close(&self) -> AppResult<()> {
        Ok(())
    }
}

fn service_over(store: &Arc<FakeStore>) -> RateLimitService {
    RateLimitService::new(Arc::clone(store) as Arc<dyn RateLimitStore>)
}

#[tokio::test]
async fn admits_up_to_the_limit_with_increasing_counts() {
    let store = Arc::new(FakeStore::new());
    let service = service_over(&store);
    let rule = RateLimitRule::new(5, Duration::from_secs(10));

    for expected in 1..=5 {
        let (decision, error) = service.check("ip:192.168.1.1", &rule).await;
        assert!(error.is_none());
        assert!(decision.admitted, "request {expected} should be admitted");
        assert_eq!(decision.observed_count, expected);
        assert_eq!(decision.limit, 5);
    }
}

#[tokio::test]
async fn rejects_the_request_that_overflows_the_limit() {
    let store = Arc::new(FakeStore::new());
    let service = service_over(&store);
    let rule = RateLimitRule::new(5, Duration::from_secs(10));

    for _ in 0..5 {
        let (decision, _) = service.check("ip:192.168.1.2", &rule).await;
        assert!(decision.admitted);
    }

    let (decision, error) = service.check("ip:192.168.1.2", &rule).await;
    assert!(error.is_none());
    assert!(!decision.admitted);
    assert_eq!(decision.observed_count, 6);
}

#[tokio::test]
async fn short_circuits_on_an_active_block_without_counting() {
    let store = Arc::new(FakeStore::new());
    let service = service_over(&store);
    let rule = RateLimitRule::new(5, Duration::from_secs(10));

    for _ in 0..6 {
        service.check("ip:192.168.1.3", &rule).await;
    }

    let (decision, error) = service.check("ip:192.168.1.3", &rule).await;
    assert!(error.is_none());
    assert!(!decision.admitted);
    assert_eq!(decision.observed_count, 0);

    // The blocked request must not have touched the counter.
    let counter = store.get_count("rl:cnt:ip:192.168.1.3").await;
    assert!(counter.is_ok());
    assert_eq!(counter.unwrap_or_default(), 6);
}

#[tokio::test]
async fn distinct_keys_do_not_interfere() {
    let store = Arc::new(FakeStore::new());
    let service = service_over(&store);
    let rule = RateLimitRule::new(3, Duration::from_secs(10));

    for _ in 0..4 {
        service.check("ip:192.168.1.4", &rule).await;
    }

    let (blocked, _) = service.check("ip:192.168.1.4", &rule).await;
    assert!(!blocked.admitted);

    let (fresh, error) = service.check("ip:192.168.1.5", &rule).await;
    assert!(error.is_none());
    assert!(fresh.admitted);
    assert_eq!(fresh.observed_count, 1);
}

#[tokio::test]
async fn fails_open_when_the_block_lookup_errors() {
    let store = Arc::new(FakeStore::new());
    store.fail_exists.store(true, Ordering::SeqCst);
    let service = service_over(&store);
    let rule = RateLimitRule::new(5, Duration::from_secs(10));

    let (decision, error) = service.check("ip:192.168.1.6", &rule).await;
    assert!(error.is_some());
    assert!(decision.admitted);
    assert_eq!(decision.observed_count, 0);
}

#[tokio::test]
async fn fails_open_when_the_increment_errors() {
    let store = Arc::new(FakeStore::new());
    store.fail_increment.store(true, Ordering::SeqCst);
    let service = service_over(&store);
    let rule = RateLimitRule::new(5, Duration::from_secs(10));

    let (decision, error) = service.check("ip:192.168.1.7", &rule).await;
    assert!(error.is_some());
    assert!(decision.admitted);
    assert_eq!(decision.observed_count, 0);
}

#[tokio::test]
async fn fails_open_when_setting_the_block_errors() {
    let store = Arc::new(FakeStore::new());
    let service = service_over(&store);
    let rule = RateLimitRule::new(1, Duration::from_secs(10));

    let (first, _) = service.check("ip:192.168.1.8", &rule).await;
    assert!(first.admitted);

    store.fail_set_expiring.store(true, Ordering::SeqCst);
    let (decision, error) = service.check("ip:192.168.1.8", &rule).await;
    assert!(error.is_some());
    assert!(decision.admitted);
    assert_eq!(decision.observed_count, 2);
}

#[tokio::test]
async fn block_outlives_the_counting_window() {
    let store = Arc::new(FakeStore::new());
    let service = service_over(&store);
    let rule = RateLimitRule::new(2, Duration::from_secs(30));

    for _ in 0..3 {
        service.check("ip:192.168.1.9", &rule).await;
    }

    // Past the one-second counter window, well within the block duration.
    tokio::time::sleep(Duration::from_millis(1200)).await;

    let (decision, error) = service.check("ip:192.168.1.9", &rule).await;
    assert!(error.is_none());
    assert!(!decision.admitted);
    assert_eq!(decision.observed_count, 0);
}

#[tokio::test]
async fn treats_the_key_as_fresh_once_the_block_expires() {
    let store = Arc::new(FakeStore::new());
    let service = service_over(&store);
    let rule = RateLimitRule::new(3, Duration::from_millis(100));

    for _ in 0..4 {
        service.check("ip:192.168.1.10", &rule).await;
    }

    let (blocked, _) = service.check("ip:192.168.1.10", &rule).await;
    assert!(!blocked.admitted);

    tokio::time::sleep(Duration::from_millis(150)).await;
    store.reset().await;

    let (decision, error) = service.check("ip:192.168.1.10", &rule).await;
    assert!(error.is_none());
    assert!(decision.admitted);
    assert_eq!(decision.observed_count, 1);
}

#[tokio::test]
async fn concurrent_checks_on_one_key_observe_distinct_counts() {
    let store = Arc::new(FakeStore::new());
    let service = service_over(&store);
    let rule = RateLimitRule::new(20, Duration::from_secs(10));

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let service = service.clone();
        let rule = rule.clone();
        tasks.spawn(async move {
            let (decision, _) = service.check("ip:burst", &rule).await;
            decision.observed_count
        });
    }

    let mut counts = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        counts.push(joined.unwrap_or_default());
    }
    counts.sort_unstable();

    assert_eq!(counts, (1..=8).collect::<Vec<i64>>());
}

#[tokio::test]
async fn close_releases_the_store() {
    let store = Arc::new(FakeStore::new());
    let service = service_over(&store);

    let closed = service.close().await;
    assert!(closed.is_ok());
}
