//! Redis-backed `BalanceCache`. The cache stores balances as integer
//! minor units (cents), never as a decimal string, so `deduct`/`add`
//! can mutate them with plain Lua integer arithmetic instead of
//! floating point, the same reason `interledger-store-redis` keeps its
//! balances in integer minor units and mutates them with `HINCRBY`
//! rather than read-parse-reformat-write. `deduct`/`add` are Lua
//! scripts so the compare-and-write is a single atomic step regardless
//! of concurrent callers.

use crate::DeductOutcome;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use payout_core::{Error, Result};
use redis::aio::ConnectionManager;
use redis::Script;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

// Returns {"ok", new_balance_cents} | {"not_found"} | {"insufficient"}.
// All arithmetic is over Lua integers (cents); no float ever touches a balance.
static DEDUCT_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local current = redis.call('get', KEYS[1])
        if current == false then
            return {'not_found'}
        end
        local balance = tonumber(current)
        local amount = tonumber(ARGV[1])
        if balance < amount then
            return {'insufficient'}
        end
        local new_balance = balance - amount
        redis.call('set', KEYS[1], new_balance)
        return {'ok', tostring(new_balance)}
        "#,
    )
});

static ADD_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local current = redis.call('get', KEYS[1])
        if current == false then
            return {'not_found'}
        end
        local balance = tonumber(current)
        local amount = tonumber(ARGV[1])
        local new_balance = balance + amount
        redis.call('set', KEYS[1], new_balance)
        return {'ok', tostring(new_balance)}
        "#,
    )
});

fn balance_key(user_id: &str) -> String {
    format!("balance:{user_id}")
}

/// Converts a validated (at most 2dp) amount to integer cents. Never
/// rounds away real value: `validate_amount` already rejects anything
/// with more than 2 fractional digits before this is called.
fn to_cents(amount: Decimal) -> Result<i64> {
    (amount * Decimal::from(100))
        .to_i64()
        .ok_or_else(|| Error::Cache(format!("amount {amount} overflows cents representation")))
}

fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

fn decode_outcome(raw: Vec<String>) -> Result<DeductOutcome> {
    match raw.first().map(String::as_str) {
        Some("ok") => {
            let value = raw
                .get(1)
                .ok_or_else(|| Error::Cache("deduct script returned no value".into()))?;
            let cents: i64 = value
                .parse()
                .map_err(|e| Error::Cache(format!("invalid balance from script: {e}")))?;
            Ok(DeductOutcome::Ok(from_cents(cents)))
        }
        Some("not_found") => Ok(DeductOutcome::NotFound),
        Some("insufficient") => Ok(DeductOutcome::Insufficient),
        other => Err(Error::Cache(format!("unexpected script outcome: {other:?}"))),
    }
}

pub struct RedisBalanceCache {
    conn: ConnectionManager,
}

impl RedisBalanceCache {
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
impl crate::BalanceCache for RedisBalanceCache {
    async fn get(&self, user_id: &str) -> Result<Option<Decimal>> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = redis::cmd("GET")
            .arg(balance_key(user_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Cache(format!("balance get failed: {e}")))?;

        Ok(value.map(from_cents))
    }

    async fn set(&self, user_id: &str, value: Decimal) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(balance_key(user_id))
            .arg(to_cents(value)?)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Cache(format!("balance set failed: {e}")))
    }

    async fn deduct(&self, user_id: &str, amount: Decimal) -> Result<DeductOutcome> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = DEDUCT_SCRIPT
            .key(balance_key(user_id))
            .arg(to_cents(amount)?)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Error::Cache(format!("deduct script failed: {e}")))?;
        decode_outcome(raw)
    }

    async fn add(&self, user_id: &str, amount: Decimal) -> Result<DeductOutcome> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = ADD_SCRIPT
            .key(balance_key(user_id))
            .arg(to_cents(amount)?)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| Error::Cache(format!("add script failed: {e}")))?;
        decode_outcome(raw)
    }
}
