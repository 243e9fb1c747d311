//! Pooled Postgres connection: a `deadpool_postgres::Pool` built from a
//! parsed `tokio_postgres::Config`, with fast recycling and a
//! connectivity check on startup.

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use payout_core::{Error, Result};
use tokio_postgres::NoTls;
use tracing::info;

mod embedded {
    refinery::embed_migrations!("migrations");
}

#[derive(Clone)]
pub struct PgPool {
    pub(crate) pool: Pool,
}

impl PgPool {
    pub async fn connect(database_url: &str, max_connections: usize) -> Result<Self> {
        info!("connecting to payout store at {}", database_url);

        let config = database_url
            .parse::<tokio_postgres::Config>()
            .map_err(|e| Error::Database(format!("invalid database url: {e}")))?;

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let manager = Manager::from_config(config, NoTls, mgr_config);

        let pool = Pool::builder(manager)
            .max_size(max_connections)
            .build()
            .map_err(|e| Error::Database(format!("failed to build connection pool: {e}")))?;

        let client = pool
            .get()
            .await
            .map_err(|e| Error::Database(format!("failed to acquire connection: {e}")))?;
        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| Error::Database(format!("startup connectivity check failed: {e}")))?;

        info!("payout store connection pool ready");
        Ok(Self { pool })
    }

    /// Runs the embedded migration set. Idempotent: safe to call on
    /// every startup.
    pub async fn migrate(&self) -> Result<()> {
        let mut client = self
            .pool
            .get()
            .await
            .map_err(|e| Error::Database(format!("failed to acquire connection: {e}")))?;
        embedded::migrations::runner()
            .run_async(&mut *client)
            .await
            .map_err(|e| Error::Database(format!("migration failed: {e}")))?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<bool> {
        match self.pool.get().await {
            Ok(client) => Ok(client.query_one("SELECT 1", &[]).await.is_ok()),
            Err(_) => Ok(false),
        }
    }
}
