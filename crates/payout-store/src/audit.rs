//! Append-only audit trail. A write failure here must never abort the
//! operation it documents (spec §3); callers should log and continue,
//! never propagate.

use async_trait::async_trait;
use payout_core::{AuditAction, AuditLogEntry, Error, Result};

use crate::PgPool;

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: &AuditLogEntry) -> Result<()>;
}

fn action_str(action: AuditAction) -> &'static str {
    match action {
        AuditAction::PayoutInitiated => "PAYOUT_INITIATED",
        AuditAction::PayoutProcessing => "PAYOUT_PROCESSING",
        AuditAction::PayoutCompleted => "PAYOUT_COMPLETED",
        AuditAction::PayoutFailed => "PAYOUT_FAILED",
        AuditAction::LockAcquired => "LOCK_ACQUIRED",
        AuditAction::LockReleased => "LOCK_RELEASED",
        AuditAction::BalanceDeducted => "BALANCE_DEDUCTED",
        AuditAction::BalanceRestored => "BALANCE_RESTORED",
        AuditAction::MessagePublished => "MESSAGE_PUBLISHED",
        AuditAction::MessageConsumed => "MESSAGE_CONSUMED",
        AuditAction::MessageAcked => "MESSAGE_ACKED",
        AuditAction::MessageNacked => "MESSAGE_NACKED",
    }
}

pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for PgAuditLog {
    async fn append(&self, entry: &AuditLogEntry) -> Result<()> {
        let client = self
            .pool
            .pool
            .get()
            .await
            .map_err(|e| Error::Database(format!("pool exhausted: {e}")))?;

        let stmt = client
            .prepare(
                "INSERT INTO audit_log (transaction_id, user_id, action, details, timestamp)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        client
            .execute(
                &stmt,
                &[
                    &entry.transaction_id.as_str(),
                    &entry.user_id.as_str(),
                    &action_str(entry.action),
                    &entry.details,
                    &entry.timestamp,
                ],
            )
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }
}
