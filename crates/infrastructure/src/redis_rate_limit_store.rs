//! Redis-backed rate limit store.

use std::time::Duration;

use async_trait::async_trait;
use rategate_application::RateLimitStore;
use rategate_core::{AppError, AppResult};
use redis::Script;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Increments the counter and re-arms its time-to-live in one script
/// invocation, so no reader observes the new count with a stale TTL.
const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
redis.call('PEXPIRE', KEYS[1], ARGV[1])
return count
"#;

/// Redis implementation of the rate limit store port.
#[derive(Clone)]
pub struct RedisRateLimitStore {
    client: redis::Client,
}

impl RedisRateLimitStore {
    /// Creates a store over a configured Redis client.
    #[must_use]
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    /// Startup connectivity probe. Fails if Redis does not answer a PING
    /// within [`CONNECT_TIMEOUT`].
    pub async fn ping(&self) -> AppResult<()> {
        let mut connection =
            tokio::time::timeout(CONNECT_TIMEOUT, self.client.get_multiplexed_async_connection())
                .await
                .map_err(|_| AppError::Internal("timed out connecting to redis".to_owned()))?
                .map_err(|error| {
                    AppError::Internal(format!("failed to connect to redis: {error}"))
                })?;

        let _: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(|error| AppError::Internal(format!("redis ping failed: {error}")))?;

        Ok(())
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn increment(&self, key: &str, expiry: Duration) -> AppResult<i64> {
        let mut connection = self.connection().await?;

        let script = Script::new(INCREMENT_SCRIPT);
        let count: i64 = script
            .key(key)
            .arg(expiry_millis(expiry))
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to increment redis counter: {error}"))
            })?;

        Ok(count)
    }

    async fn get_count(&self, key: &str) -> AppResult<i64> {
        let mut connection = self.connection().await?;

        let count: Option<i64> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to read redis counter: {error}"))
            })?;

        Ok(count.unwrap_or(0))
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let mut connection = self.connection().await?;

        let present: bool = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to check redis key existence: {error}"))
            })?;

        Ok(present)
    }

    async fn set_expiring(&self, key: &str, value: &str, expiry: Duration) -> AppResult<()> {
        // Redis rejects SET with a zero expiry; a zero time-to-live means
        // the record is already expired, so there is nothing to write.
        let millis = expiry_millis(expiry);
        if millis == 0 {
            return Ok(());
        }

        let mut connection = self.connection().await?;

        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis)
            .query_async(&mut connection)
            .await
            .map_err(|error| AppError::Internal(format!("failed to set redis key: {error}")))?;

        Ok(())
    }

    async fn close(&self) -> AppResult<()> {
        // Dropping the client releases its connections; nothing to do, and
        // repeated calls stay harmless.
        Ok(())
    }
}

fn expiry_millis(expiry: Duration) -> u64 {
    u64::try_from(expiry.as_millis()).unwrap_or(u64::MAX)
}
