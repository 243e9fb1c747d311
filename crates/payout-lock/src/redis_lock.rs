//! Redis-backed `Lock`. Acquisition is a single `SET NX PX`; release and
//! extend are Lua scripts so the compare-and-act pair is atomic against
//! concurrent callers, the same idiom `interledger-store-redis` uses
//! for its `PROCESS_PREPARE`/`PROCESS_FULFILL` balance scripts.

use crate::{Lock, Token};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use payout_core::{Error, Result};
use redis::aio::ConnectionManager;
use redis::Script;
use std::time::Duration;

static RELEASE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        if redis.call('get', KEYS[1]) == ARGV[1] then
            return redis.call('del', KEYS[1])
        else
            return 0
        end
        ",
    )
});

static EXTEND_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
        if redis.call('get', KEYS[1]) == ARGV[1] then
            return redis.call('pexpire', KEYS[1], ARGV[2])
        else
            return 0
        end
        ",
    )
});

fn lock_key(resource: &str) -> String {
    format!("lock:{resource}")
}

pub struct RedisLock {
    conn: ConnectionManager,
}

impl RedisLock {
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
impl Lock for RedisLock {
    async fn acquire(&self, resource: &str, ttl: Duration) -> Result<Option<Token>> {
        let token = crate::generate_token();
        let mut conn = self.conn.clone();
        let result: Option<String> = redis::cmd("SET")
            .arg(lock_key(resource))
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Cache(format!("lock acquire failed: {e}")))?;

        Ok(result.map(|_| token))
    }

    async fn release(&self, resource: &str, token: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = RELEASE_SCRIPT
            .key(lock_key(resource))
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Error::Cache(format!("lock release failed: {e}")))?;
        Ok(deleted == 1)
    }

    async fn extend(&self, resource: &str, token: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let extended: i64 = EXTEND_SCRIPT
            .key(lock_key(resource))
            .arg(token)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Error::Cache(format!("lock extend failed: {e}")))?;
        Ok(extended == 1)
    }
}
