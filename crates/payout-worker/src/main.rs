//! Worker binary: drains the settlement queue and applies Worker
//! Settlement to each delivery.

use std::sync::Arc;

use payout_broker::{Consumer, RabbitConsumer};
use payout_cache::RedisBalanceCache;
use payout_core::PayoutConfig;
use payout_events::RedisEventBridge;
use payout_lock::RedisLock;
use payout_store::{PgAuditLog, PgPool, PgTransactionStore, PgUserStore};
use payout_worker::WorkerSettlement;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = PayoutConfig::from_env();
    tracing::info!(concurrency = config.worker_concurrency, "starting payout worker");

    let pg_pool = PgPool::connect(&config.database_url, 8).await?;
    pg_pool.migrate().await?;

    let lock = Arc::new(RedisLock::connect(&config.redis_url).await?);
    let balance_cache = Arc::new(RedisBalanceCache::connect(&config.redis_url).await?);
    let transaction_store = Arc::new(PgTransactionStore::new(pg_pool.clone()));
    let user_store = Arc::new(PgUserStore::new(pg_pool.clone()));
    let audit_log = Arc::new(PgAuditLog::new(pg_pool.clone()));
    let event_bridge = Arc::new(RedisEventBridge::connect(&config.redis_url).await?);

    let settlement = Arc::new(WorkerSettlement::new(
        lock,
        balance_cache,
        transaction_store,
        user_store,
        audit_log,
        event_bridge,
    ));

    let consumer = RabbitConsumer::connect(
        &config.amqp_url,
        config.worker_concurrency as u16,
        config.max_retry_attempts,
        config.retry_delay_ms,
    )
    .await?;

    tokio::select! {
        result = consumer.run(move |envelope| {
            let settlement = settlement.clone();
            async move { settlement.process(envelope).await }
        }) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(
                grace_secs = config.shutdown_grace.as_secs(),
                "shutdown signal received, draining in-flight settlements"
            );
            tokio::time::sleep(config.shutdown_grace).await;
        }
    }

    Ok(())
}
