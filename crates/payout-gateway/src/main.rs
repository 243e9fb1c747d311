//! Gateway binary: HTTP intake for the instant payout pipeline.

use std::sync::Arc;

use payout_broker::RabbitPublisher;
use payout_cache::RedisBalanceCache;
use payout_core::PayoutConfig;
use payout_events::RedisEventBridge;
use payout_gateway::{routes::AppState, start_api_server, GatewayIntake, RedisRateLimiter};
use payout_lock::RedisLock;
use payout_store::{PgAuditLog, PgPool, PgTransactionStore, PgUserStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = PayoutConfig::from_env();
    tracing::info!(bind = %config.api_bind_address, "starting payout gateway");

    let pg_pool = PgPool::connect(&config.database_url, 16).await?;
    pg_pool.migrate().await?;

    let lock = Arc::new(RedisLock::connect(&config.redis_url).await?);
    let balance_cache = Arc::new(RedisBalanceCache::connect(&config.redis_url).await?);
    let rate_limiter = Arc::new(RedisRateLimiter::connect(&config.redis_url).await?);
    let transaction_store = Arc::new(PgTransactionStore::new(pg_pool.clone()));
    let user_store = Arc::new(PgUserStore::new(pg_pool.clone()));
    let audit_log = Arc::new(PgAuditLog::new(pg_pool.clone()));
    let publisher = Arc::new(RabbitPublisher::connect(&config.amqp_url).await?);
    let event_bridge = Arc::new(RedisEventBridge::connect(&config.redis_url).await?);

    let intake = Arc::new(GatewayIntake::new(
        lock,
        balance_cache,
        transaction_store,
        user_store,
        audit_log,
        publisher,
        event_bridge,
        config.clone(),
    ));

    let state = Arc::new(AppState {
        intake,
        rate_limiter,
        config,
        start_time: std::time::Instant::now(),
    });

    tokio::select! {
        result = start_api_server(state) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received, stopping intake");
        }
    }

    Ok(())
}
