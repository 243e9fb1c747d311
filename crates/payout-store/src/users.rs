//! Durable user accounts. `update_balance` is the only write path, and
//! it is only ever called from Worker Settlement after the cache and
//! queue have already agreed on the outcome (spec §4.7 step 7).

use async_trait::async_trait;
use payout_core::{Error, Result, User, UserId, UserStatus};
use rust_decimal::Decimal;
use tokio_postgres::Row;

use crate::PgPool;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: &User) -> Result<()>;
    async fn get_by_id(&self, user_id: &UserId) -> Result<Option<User>>;
    async fn update_balance(&self, user_id: &UserId, new_balance: Decimal, payout_amount: Decimal) -> Result<()>;
}

fn status_str(status: UserStatus) -> &'static str {
    match status {
        UserStatus::Active => "active",
        UserStatus::Suspended => "suspended",
        UserStatus::Closed => "closed",
    }
}

fn status_from_str(s: &str) -> Result<UserStatus> {
    match s {
        "active" => Ok(UserStatus::Active),
        "suspended" => Ok(UserStatus::Suspended),
        "closed" => Ok(UserStatus::Closed),
        other => Err(Error::Database(format!("unknown user status: {other}"))),
    }
}

fn from_row(row: &Row) -> Result<User> {
    Ok(User {
        user_id: UserId::from(
            row.try_get::<_, String>("user_id")
                .map_err(|e| Error::Database(e.to_string()))?,
        ),
        display_name: row
            .try_get("display_name")
            .map_err(|e| Error::Database(e.to_string()))?,
        balance: row.try_get("balance").map_err(|e| Error::Database(e.to_string()))?,
        currency: row
            .try_get::<_, String>("currency")
            .map_err(|e| Error::Database(e.to_string()))?
            .parse()?,
        status: status_from_str(&row.try_get::<_, String>("status").map_err(|e| Error::Database(e.to_string()))?)?,
        total_payouts: row
            .try_get::<_, i64>("total_payouts")
            .map_err(|e| Error::Database(e.to_string()))? as u64,
        total_payout_amount: row
            .try_get("total_payout_amount")
            .map_err(|e| Error::Database(e.to_string()))?,
        last_payout_at: row
            .try_get("last_payout_at")
            .map_err(|e| Error::Database(e.to_string()))?,
    })
}

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: &User) -> Result<()> {
        let client = self
            .pool
            .pool
            .get()
            .await
            .map_err(|e| Error::Database(format!("pool exhausted: {e}")))?;

        let stmt = client
            .prepare(
                "INSERT INTO users
                (user_id, display_name, balance, currency, status, total_payouts,
                 total_payout_amount, last_payout_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (user_id) DO NOTHING",
            )
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        client
            .execute(
                &stmt,
                &[
                    &user.user_id.as_str(),
                    &user.display_name,
                    &user.balance,
                    &user.currency.to_string(),
                    &status_str(user.status),
                    &(user.total_payouts as i64),
                    &user.total_payout_amount,
                    &user.last_payout_at,
                ],
            )
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn get_by_id(&self, user_id: &UserId) -> Result<Option<User>> {
        let client = self
            .pool
            .pool
            .get()
            .await
            .map_err(|e| Error::Database(format!("pool exhausted: {e}")))?;

        let row = client
            .query_opt("SELECT * FROM users WHERE user_id = $1", &[&user_id.as_str()])
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        row.map(|r| from_row(&r)).transpose()
    }

    async fn update_balance(&self, user_id: &UserId, new_balance: Decimal, payout_amount: Decimal) -> Result<()> {
        let client = self
            .pool
            .pool
            .get()
            .await
            .map_err(|e| Error::Database(format!("pool exhausted: {e}")))?;

        let stmt = client
            .prepare(
                "UPDATE users SET
                    balance = $2,
                    total_payouts = total_payouts + 1,
                    total_payout_amount = total_payout_amount + $3,
                    last_payout_at = now()
                 WHERE user_id = $1",
            )
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let updated = client
            .execute(&stmt, &[&user_id.as_str(), &new_balance, &payout_amount])
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        if updated == 0 {
            return Err(Error::UserNotFound);
        }
        Ok(())
    }
}
