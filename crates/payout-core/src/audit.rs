//! Append-only audit trail (spec §3). Writing an entry must never abort
//! the operation it documents; callers log-and-continue on failure.

use crate::ids::{TransactionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    PayoutInitiated,
    PayoutProcessing,
    PayoutCompleted,
    PayoutFailed,
    LockAcquired,
    LockReleased,
    BalanceDeducted,
    BalanceRestored,
    MessagePublished,
    MessageConsumed,
    MessageAcked,
    MessageNacked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub transaction_id: TransactionId,
    pub user_id: UserId,
    pub action: AuditAction,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        transaction_id: TransactionId,
        user_id: UserId,
        action: AuditAction,
        details: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id,
            user_id,
            action,
            details: details.into(),
            timestamp: Utc::now(),
        }
    }
}
