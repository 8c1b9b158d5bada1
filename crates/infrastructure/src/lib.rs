//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_rate_limit_store;
mod redis_rate_limit_store;

pub use in_memory_rate_limit_store::InMemoryRateLimitStore;
pub use redis_rate_limit_store::RedisRateLimitStore;
