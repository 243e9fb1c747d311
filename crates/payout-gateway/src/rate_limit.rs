//! Cache-backed token buckets (spec §4.9). `governor` would work for a
//! single process, but rate-limit state here must be visible across
//! every gateway instance, so the bucket is a Redis counter with a
//! window TTL rather than in-process state.

use async_trait::async_trait;
use payout_core::{Error, Result};
use redis::aio::ConnectionManager;
use std::time::Duration;

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Increments the counter for `key`, returning `true` if the
    /// request is admitted. The first increment in a window sets the
    /// expiry; later ones in the same window leave it untouched.
    async fn check(&self, key: &str, window: Duration, max_requests: u32) -> Result<bool>;
}

pub struct RedisRateLimiter {
    conn: ConnectionManager,
}

impl RedisRateLimiter {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Cache(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_tokio_connection_manager()
            .await
            .map_err(|e| Error::Cache(format!("failed to connect to redis: {e}")))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, key: &str, window: Duration, max_requests: u32) -> Result<bool> {
        let mut conn = self.conn.clone();
        let count: u32 = redis::cmd("INCR")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Cache(format!("rate limit incr failed: {e}")))?;

        if count == 1 {
            redis::cmd("PEXPIRE")
                .arg(key)
                .arg(window.as_millis() as u64)
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(|e| Error::Cache(format!("rate limit expire failed: {e}")))?;
        }

        Ok(count <= max_requests)
    }
}
