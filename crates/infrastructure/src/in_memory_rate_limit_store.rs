//! In-memory rate limit store implementation.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rategate_application::RateLimitStore;
use rategate_core::AppResult;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct StoreState {
    counters: HashMap<String, i64>,
    expiries: HashMap<String, Instant>,
}

/// In-memory implementation of the rate limit store port.
///
/// State is scoped to the instance, so parallel test suites or multiple
/// service instances never share records. A single lock covers counters and
/// expiries together, keeping increment-and-expire indivisible. Expiry is
/// lazy: records are checked against the clock on access and purged on the
/// next write to the key.
#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    state: RwLock<StoreState>,
}

impl InMemoryRateLimitStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn increment(&self, key: &str, expiry: Duration) -> AppResult<i64> {
        let mut state = self.state.write().await;
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
        let state = self.state.read().await;

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
        let state = self.state.read().await;

        Ok(state
            .expiries
            .get(key)
            .is_some_and(|expires_at| *expires_at > Instant::now()))
    }

    async fn set_expiring(&self, key: &str, _value: &str, expiry: Duration) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.expiries.insert(key.to_owned(), Instant::now() + expiry);
        Ok(())
    }

    async fn close(&self) -> AppResult<()> {
        Ok(())
    }
}
