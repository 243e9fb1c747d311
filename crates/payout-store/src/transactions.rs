//! Durable transaction ledger. Writes are `ON CONFLICT DO NOTHING` on
//! `transaction_id` so redelivered inserts are harmless; status
//! transitions are applied with an explicit `WHERE status = ...` guard
//! so a stale writer can never regress a terminal row.

use async_trait::async_trait;
use payout_core::{
    Error, Result, Transaction, TransactionId, TransactionStatus, TransactionType, UserId,
};
use rust_decimal::Decimal;
use tokio_postgres::Row;

use crate::PgPool;

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, txn: &Transaction) -> Result<()>;
    async fn get_by_id(&self, id: &TransactionId) -> Result<Option<Transaction>>;
    async fn get_by_user(
        &self,
        user_id: &UserId,
        status: Option<TransactionStatus>,
        limit: i64,
    ) -> Result<Vec<Transaction>>;
    async fn mark_processing(&self, id: &TransactionId) -> Result<()>;
    async fn mark_completed(&self, id: &TransactionId, balance_after: Decimal) -> Result<()>;
    async fn mark_failed(&self, id: &TransactionId, code: &str, message: &str) -> Result<()>;
}

fn status_str(status: TransactionStatus) -> &'static str {
    match status {
        TransactionStatus::Initiated => "initiated",
        TransactionStatus::Processing => "processing",
        TransactionStatus::Completed => "completed",
        TransactionStatus::Failed => "failed",
        TransactionStatus::RolledBack => "rolled_back",
    }
}

fn status_from_str(s: &str) -> Result<TransactionStatus> {
    match s {
        "initiated" => Ok(TransactionStatus::Initiated),
        "processing" => Ok(TransactionStatus::Processing),
        "completed" => Ok(TransactionStatus::Completed),
        "failed" => Ok(TransactionStatus::Failed),
        "rolled_back" => Ok(TransactionStatus::RolledBack),
        other => Err(Error::Database(format!("unknown transaction status: {other}"))),
    }
}

fn type_str(t: TransactionType) -> &'static str {
    match t {
        TransactionType::Payout => "payout",
        TransactionType::Refund => "refund",
        TransactionType::Adjustment => "adjustment",
    }
}

fn type_from_str(s: &str) -> Result<TransactionType> {
    match s {
        "payout" => Ok(TransactionType::Payout),
        "refund" => Ok(TransactionType::Refund),
        "adjustment" => Ok(TransactionType::Adjustment),
        other => Err(Error::Database(format!("unknown transaction type: {other}"))),
    }
}

fn from_row(row: &Row) -> Result<Transaction> {
    let metadata_json: serde_json::Value = row
        .try_get("metadata")
        .map_err(|e| Error::Database(e.to_string()))?;
    let metadata = serde_json::from_value(metadata_json).map_err(|e| Error::Database(e.to_string()))?;

    Ok(Transaction {
        transaction_id: TransactionId::from(
            row.try_get::<_, String>("transaction_id")
                .map_err(|e| Error::Database(e.to_string()))?,
        ),
        user_id: UserId::from(
            row.try_get::<_, String>("user_id")
                .map_err(|e| Error::Database(e.to_string()))?,
        ),
        amount: row.try_get("amount").map_err(|e| Error::Database(e.to_string()))?,
        currency: row
            .try_get::<_, String>("currency")
            .map_err(|e| Error::Database(e.to_string()))?
            .parse()?,
        status: status_from_str(&row.try_get::<_, String>("status").map_err(|e| Error::Database(e.to_string()))?)?,
        transaction_type: type_from_str(
            &row.try_get::<_, String>("transaction_type")
                .map_err(|e| Error::Database(e.to_string()))?,
        )?,
        balance_before: row
            .try_get("balance_before")
            .map_err(|e| Error::Database(e.to_string()))?,
        balance_after: row
            .try_get("balance_after")
            .map_err(|e| Error::Database(e.to_string()))?,
        metadata,
        lock_acquired: row
            .try_get("lock_acquired")
            .map_err(|e| Error::Database(e.to_string()))?,
        created_at: row.try_get("created_at").map_err(|e| Error::Database(e.to_string()))?,
        processing_at: row
            .try_get("processing_at")
            .map_err(|e| Error::Database(e.to_string()))?,
        completed_at: row
            .try_get("completed_at")
            .map_err(|e| Error::Database(e.to_string()))?,
        failed_at: row.try_get("failed_at").map_err(|e| Error::Database(e.to_string()))?,
        processing_duration_ms: row
            .try_get("processing_duration_ms")
            .map_err(|e| Error::Database(e.to_string()))?,
        error_code: row.try_get("error_code").map_err(|e| Error::Database(e.to_string()))?,
        error_message: row
            .try_get("error_message")
            .map_err(|e| Error::Database(e.to_string()))?,
    })
}

pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn insert(&self, txn: &Transaction) -> Result<()> {
        let client = self
            .pool
            .pool
            .get()
            .await
            .map_err(|e| Error::Database(format!("pool exhausted: {e}")))?;

        let metadata = serde_json::to_value(&txn.metadata).map_err(|e| Error::Database(e.to_string()))?;

        let stmt = client
            .prepare(
                "INSERT INTO transactions
                (transaction_id, user_id, amount, currency, status, transaction_type,
                 balance_before, balance_after, metadata, lock_acquired, created_at,
                 processing_at, completed_at, failed_at, processing_duration_ms,
                 error_code, error_message)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
                ON CONFLICT (transaction_id) DO NOTHING",
            )
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        client
            .execute(
                &stmt,
                &[
                    &txn.transaction_id.as_str(),
                    &txn.user_id.as_str(),
                    &txn.amount,
                    &txn.currency.to_string(),
                    &status_str(txn.status),
                    &type_str(txn.transaction_type),
                    &txn.balance_before,
                    &txn.balance_after,
                    &metadata,
                    &txn.lock_acquired,
                    &txn.created_at,
                    &txn.processing_at,
                    &txn.completed_at,
                    &txn.failed_at,
                    &txn.processing_duration_ms,
                    &txn.error_code,
                    &txn.error_message,
                ],
            )
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn get_by_id(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        let client = self
            .pool
            .pool
            .get()
            .await
            .map_err(|e| Error::Database(format!("pool exhausted: {e}")))?;

        let row = client
            .query_opt(
                "SELECT * FROM transactions WHERE transaction_id = $1",
                &[&id.as_str()],
            )
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        row.map(|r| from_row(&r)).transpose()
    }

    async fn get_by_user(
        &self,
        user_id: &UserId,
        status: Option<TransactionStatus>,
        limit: i64,
    ) -> Result<Vec<Transaction>> {
        let client = self
            .pool
            .pool
            .get()
            .await
            .map_err(|e| Error::Database(format!("pool exhausted: {e}")))?;

        let rows = match status {
            Some(s) => {
                client
                    .query(
                        "SELECT * FROM transactions
                         WHERE user_id = $1 AND status = $2
                         ORDER BY created_at DESC
                         LIMIT $3",
                        &[&user_id.as_str(), &status_str(s), &limit],
                    )
                    .await
            }
            None => {
                client
                    .query(
                        "SELECT * FROM transactions
                         WHERE user_id = $1
                         ORDER BY created_at DESC
                         LIMIT $2",
                        &[&user_id.as_str(), &limit],
                    )
                    .await
            }
        }
        .map_err(|e| Error::Database(e.to_string()))?;

        rows.iter().map(from_row).collect()
    }

    async fn mark_processing(&self, id: &TransactionId) -> Result<()> {
        let client = self
            .pool
            .pool
            .get()
            .await
            .map_err(|e| Error::Database(format!("pool exhausted: {e}")))?;

        client
            .execute(
                "UPDATE transactions SET status = 'processing', processing_at = COALESCE(processing_at, now())
                 WHERE transaction_id = $1 AND status = 'initiated'",
                &[&id.as_str()],
            )
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn mark_completed(&self, id: &TransactionId, balance_after: Decimal) -> Result<()> {
        let client = self
            .pool
            .pool
            .get()
            .await
            .map_err(|e| Error::Database(format!("pool exhausted: {e}")))?;

        client
            .execute(
                "UPDATE transactions SET
                    status = 'completed',
                    balance_after = $2,
                    completed_at = COALESCE(completed_at, now()),
                    processing_duration_ms = COALESCE(
                        processing_duration_ms,
                        (EXTRACT(EPOCH FROM (now() - processing_at)) * 1000)::BIGINT
                    )
                 WHERE transaction_id = $1 AND status IN ('processing', 'completed')",
                &[&id.as_str(), &balance_after],
            )
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn mark_failed(&self, id: &TransactionId, code: &str, message: &str) -> Result<()> {
        let client = self
            .pool
            .pool
            .get()
            .await
            .map_err(|e| Error::Database(format!("pool exhausted: {e}")))?;

        client
            .execute(
                "UPDATE transactions SET
                    status = 'failed',
                    failed_at = COALESCE(failed_at, now()),
                    error_code = COALESCE(error_code, $2),
                    error_message = COALESCE(error_message, $3)
                 WHERE transaction_id = $1 AND status IN ('initiated', 'processing', 'failed')",
                &[&id.as_str(), &code, &message],
            )
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}
