//! Admission control ports and application service.
//!
//! Implements a fixed one-second counting window with an independent block
//! marker per identity key. The window re-arms in full on every hit; once a
//! key exceeds its limit it stays rejected for the rule's block duration,
//! even after the counting window has reset.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use rategate_core::{AppError, AppResult};

/// Prefix for per-key admission counters.
const COUNTER_PREFIX: &str = "rl:cnt:";

/// Prefix for per-key block markers. Disjoint from [`COUNTER_PREFIX`] so the
/// two record kinds never collide over the same identity.
const BLOCK_PREFIX: &str = "rl:blk:";

/// Length of the counting window, re-armed on every increment.
const COUNT_WINDOW: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Storage port for admission counters and block markers.
///
/// Conforming backends must make [`increment`](RateLimitStore::increment)
/// indivisible: the counter update and the TTL refresh happen as one
/// operation, and concurrent increments on the same key each observe a
/// distinct, monotonically assigned count. Expiry is enforced by the backend
/// itself, lazily or actively; an expired record is never reported present.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically increments the counter at `key`, creating it at 1 if
    /// absent, and resets its time-to-live to exactly `expiry` from now.
    /// Returns the post-increment count.
    async fn increment(&self, key: &str, expiry: Duration) -> AppResult<i64>;

    /// Returns the current count at `key`, or 0 if absent or expired.
    /// Absence is not an error.
    async fn get_count(&self, key: &str) -> AppResult<i64>;

    /// Returns true if a record is present and unexpired at `key`.
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// Creates or overwrites `key` with the given value and time-to-live.
    /// Callers rely only on presence; the value content is opaque.
    async fn set_expiring(&self, key: &str, value: &str, expiry: Duration) -> AppResult<()>;

    /// Releases backend resources. Idempotent.
    async fn close(&self) -> AppResult<()>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Admission rule applied to one identity key.
#[derive(Debug, Clone)]
pub struct RateLimitRule {
    /// Maximum admitted requests per one-second window. At least 1,
    /// validated at configuration-parse time.
    pub limit: i64,
    /// How long the key stays rejected after exceeding the limit.
    pub block_duration: Duration,
}

impl RateLimitRule {
    /// Creates a new admission rule.
    #[must_use]
    pub fn new(limit: i64, block_duration: Duration) -> Self {
        Self {
            limit,
            block_duration,
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Result of a single admission check.
#[derive(Debug, Clone)]
pub struct Decision {
    /// Whether the request may proceed.
    pub admitted: bool,
    /// Post-increment count observed for this request, or 0 when the check
    /// short-circuited on an active block or failed open without a read.
    pub observed_count: i64,
    /// The limit the key was checked against.
    pub limit: i64,
    /// The block duration that applies once the key overflows.
    pub block_duration: Duration,
}

/// Application service deciding, per identity key, whether a request is
/// admitted or rejected.
///
/// The service holds no cross-call state of its own; all coordination lives
/// in the store, so any number of service instances may share one backend.
#[derive(Clone)]
pub struct RateLimitService {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimitService {
    /// Creates a new admission service on top of a store implementation.
    #[must_use]
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    /// Checks whether a request under `key` is admitted by `rule`.
    ///
    /// Every store failure fails open: the returned decision admits the
    /// request and the error is surfaced alongside it for the caller to log.
    /// A store failure is never turned into a rejection.
    ///
    /// Expects `key` non-empty and `rule` validated upstream; numeric ranges
    /// are not re-checked here.
    pub async fn check(&self, key: &str, rule: &RateLimitRule) -> (Decision, Option<AppError>) {
        let block_key = format!("{BLOCK_PREFIX}{key}");
        let counter_key = format!("{COUNTER_PREFIX}{key}");

        // An unexpired block marker rejects before any counting; a blocked
        // caller does not consume quota.
        match self.store.exists(&block_key).await {
            Err(error) => return (decision(true, 0, rule), Some(error)),
            Ok(true) => return (decision(false, 0, rule), None),
            Ok(false) => {}
        }

        let count = match self.store.increment(&counter_key, COUNT_WINDOW).await {
            Err(error) => return (decision(true, 0, rule), Some(error)),
            Ok(count) => count,
        };

        if count > rule.limit {
            // Strict comparison on the post-increment value: the request
            // that overflows the limit is itself the first one rejected.
            if let Err(error) = self
                .store
                .set_expiring(&block_key, "1", rule.block_duration)
                .await
            {
                return (decision(true, count, rule), Some(error));
            }
            return (decision(false, count, rule), None);
        }

        (decision(true, count, rule), None)
    }

    /// Releases the underlying store.
    pub async fn close(&self) -> AppResult<()> {
        self.store.close().await
    }
}

fn decision(admitted: bool, observed_count: i64, rule: &RateLimitRule) -> Decision {
    Decision {
        admitted,
        observed_count,
        limit: rule.limit,
        block_duration: rule.block_duration,
    }
}

#[cfg(test)]
mod tests;
