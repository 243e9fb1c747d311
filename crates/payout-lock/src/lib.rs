//! Distributed per-resource mutual exclusion over the cache (spec §4.1).
//!
//! A narrow `#[async_trait]` capability trait, so the Gateway and Worker
//! depend on `Lock`, never on Redis directly.

mod redis_lock;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use redis_lock::RedisLock;

use async_trait::async_trait;
use payout_core::Result;
use std::time::Duration;

/// Fencing token returned on successful acquisition. Only the holder of
/// the matching token may release or extend (spec §4.1, §9: unconditional
/// `DEL` loses fencing, so every implementation must compare tokens).
pub type Token = String;

#[async_trait]
pub trait Lock: Send + Sync {
    /// Installs `lock:{resource}=token` only if absent, with millisecond
    /// expiry `ttl`. Returns `None` on contention.
    async fn acquire(&self, resource: &str, ttl: Duration) -> Result<Option<Token>>;

    /// Deletes the lock only if its value equals `token`. Never deletes
    /// another holder's lock.
    async fn release(&self, resource: &str, token: &str) -> Result<bool>;

    /// Refreshes the TTL only if `token` still matches the holder.
    async fn extend(&self, resource: &str, token: &str, ttl: Duration) -> Result<bool>;

    /// Linear backoff: `delay = base_delay * attempt`, up to `attempts`
    /// tries. Returns `None` on exhaustion; callers treat that as
    /// `CONCURRENT_REQUEST` (spec §4.1).
    async fn acquire_with_retry(
        &self,
        resource: &str,
        ttl: Duration,
        attempts: u32,
        base_delay: Duration,
    ) -> Result<Option<Token>> {
        for attempt in 1..=attempts.max(1) {
            if let Some(token) = self.acquire(resource, ttl).await? {
                return Ok(Some(token));
            }
            if attempt < attempts {
                tokio::time::sleep(base_delay * attempt).await;
            }
        }
        Ok(None)
    }
}

/// Generates a cryptographically random 128-bit fencing token, hex-encoded.
pub fn generate_token() -> Token {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryLock;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn only_one_concurrent_acquirer_wins() {
        let lock = Arc::new(InMemoryLock::new());
        let wins = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = lock.clone();
            let wins = wins.clone();
            handles.push(tokio::spawn(async move {
                if lock
                    .acquire("user_1", Duration::from_millis(500))
                    .await
                    .unwrap()
                    .is_some()
                {
                    wins.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn release_requires_matching_token() {
        let lock = InMemoryLock::new();
        let token = lock
            .acquire("user_2", Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();

        assert!(!lock.release("user_2", "wrong-token").await.unwrap());
        assert!(lock.release("user_2", &token).await.unwrap());

        // Now a fresh acquisition should succeed.
        assert!(lock
            .acquire("user_2", Duration::from_secs(5))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn acquire_with_retry_exhausts_to_none() {
        let lock = InMemoryLock::new();
        let _held = lock
            .acquire("user_3", Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();

        let result = lock
            .acquire_with_retry("user_3", Duration::from_secs(5), 3, Duration::from_millis(1))
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
