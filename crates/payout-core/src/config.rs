//! Environment-driven configuration shared by the gateway and worker
//! binaries (spec §6): a typed struct with a sane `Default`, overridden
//! field-by-field from `std::env`.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutConfig {
    pub lock_ttl_ms: u64,
    pub lock_retry_count: u32,
    pub lock_retry_delay_ms: u64,

    pub worker_concurrency: usize,
    pub max_retry_attempts: u32,
    pub retry_delay_ms: u64,

    pub min_payout_amount: Decimal,
    pub max_payout_amount: Decimal,

    pub rate_limit_window_ms: u64,
    pub rate_limit_max_requests: u32,
    pub user_rate_limit_max_requests: u32,

    pub redis_url: String,
    pub database_url: String,
    pub amqp_url: String,
    pub api_bind_address: String,
    pub allowed_origin: Option<String>,

    /// Grace period for in-flight settlements on shutdown (spec §5).
    pub shutdown_grace: Duration,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            lock_ttl_ms: 30_000,
            lock_retry_count: 3,
            lock_retry_delay_ms: 100,

            worker_concurrency: 5,
            max_retry_attempts: 3,
            retry_delay_ms: 2_000,

            min_payout_amount: dec!(0.01),
            max_payout_amount: dec!(50000.00),

            rate_limit_window_ms: 60_000,
            rate_limit_max_requests: 100,
            user_rate_limit_max_requests: 10,

            redis_url: "redis://127.0.0.1:6379".to_string(),
            database_url: "postgres://localhost/payouts".to_string(),
            amqp_url: "amqp://127.0.0.1:5672/%2f".to_string(),
            api_bind_address: "0.0.0.0:8080".to_string(),
            allowed_origin: None,

            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl PayoutConfig {
    /// Loads configuration from environment variables, falling back to
    /// [`PayoutConfig::default`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            lock_ttl_ms: env_u64("LOCK_TTL_MS", default.lock_ttl_ms),
            lock_retry_count: env_u32("LOCK_RETRY_COUNT", default.lock_retry_count),
            lock_retry_delay_ms: env_u64("LOCK_RETRY_DELAY_MS", default.lock_retry_delay_ms),

            worker_concurrency: env_usize("WORKER_CONCURRENCY", default.worker_concurrency),
            max_retry_attempts: env_u32("MAX_RETRY_ATTEMPTS", default.max_retry_attempts),
            retry_delay_ms: env_u64("RETRY_DELAY_MS", default.retry_delay_ms),

            min_payout_amount: env_decimal("MIN_PAYOUT_AMOUNT", default.min_payout_amount),
            max_payout_amount: env_decimal("MAX_PAYOUT_AMOUNT", default.max_payout_amount),

            rate_limit_window_ms: env_u64("RATE_LIMIT_WINDOW_MS", default.rate_limit_window_ms),
            rate_limit_max_requests: env_u32(
                "RATE_LIMIT_MAX_REQUESTS",
                default.rate_limit_max_requests,
            ),
            user_rate_limit_max_requests: env_u32(
                "USER_RATE_LIMIT_MAX_REQUESTS",
                default.user_rate_limit_max_requests,
            ),

            redis_url: std::env::var("REDIS_URL").unwrap_or(default.redis_url),
            database_url: std::env::var("DATABASE_URL").unwrap_or(default.database_url),
            amqp_url: std::env::var("AMQP_URL").unwrap_or(default.amqp_url),
            api_bind_address: std::env::var("API_BIND_ADDRESS").unwrap_or(default.api_bind_address),
            allowed_origin: std::env::var("ALLOWED_ORIGIN")
                .ok()
                .filter(|s| !s.is_empty()),

            shutdown_grace: default.shutdown_grace,
        }
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    pub fn lock_retry_delay(&self) -> Duration {
        Duration::from_millis(self.lock_retry_delay_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_decimal(key: &str, default: Decimal) -> Decimal {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<Decimal>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = PayoutConfig::default();
        assert_eq!(config.worker_concurrency, 5);
        assert_eq!(config.user_rate_limit_max_requests, 10);
        assert!(config.min_payout_amount < config.max_payout_amount);
    }
}
