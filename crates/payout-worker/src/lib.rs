//! Worker Settlement protocol (spec §4.7). Invoked once per delivery by
//! the Consumer; turns a `PayoutEnvelope` into a `completed`/`failed`
//! transaction, the durable user balance write, and the matching
//! lifecycle events, then releases the per-user lock handed off by
//! Gateway Intake.

use std::sync::Arc;

use payout_broker::{Outcome, PayoutEnvelope};
use payout_cache::{BalanceCache, DeductOutcome};
use payout_core::{AuditAction, AuditLogEntry, TransactionId, TransactionStatus, UserId};
use payout_events::{EventBridge, EventEnvelope, PayoutEvent};
use payout_lock::Lock;
use payout_store::{AuditLog, TransactionStore, UserStore};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub struct WorkerSettlement {
    lock: Arc<dyn Lock>,
    balance_cache: Arc<dyn BalanceCache>,
    transaction_store: Arc<dyn TransactionStore>,
    user_store: Arc<dyn UserStore>,
    audit_log: Arc<dyn AuditLog>,
    event_bridge: Arc<dyn EventBridge>,
}

impl WorkerSettlement {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lock: Arc<dyn Lock>,
        balance_cache: Arc<dyn BalanceCache>,
        transaction_store: Arc<dyn TransactionStore>,
        user_store: Arc<dyn UserStore>,
        audit_log: Arc<dyn AuditLog>,
        event_bridge: Arc<dyn EventBridge>,
    ) -> Self {
        Self {
            lock,
            balance_cache,
            transaction_store,
            user_store,
            audit_log,
            event_bridge,
        }
    }

    async fn audit(&self, entry: AuditLogEntry) {
        if let Err(e) = self.audit_log.append(&entry).await {
            warn!(action = ?entry.action, "failed to write audit entry: {e}");
        }
    }

    async fn emit(&self, user_id: &UserId, event: PayoutEvent, data: serde_json::Value) {
        if let Err(e) = self.event_bridge.publish(&EventEnvelope::new(user_id.clone(), event, data)).await {
            warn!(%user_id, ?event, "failed to emit settlement event: {e}");
        }
    }

    async fn release_lock(&self, user_id: &UserId, token: &str) {
        match self.lock.release(user_id.as_str(), token).await {
            Ok(true) => {}
            // Not fatal: TTL will eventually reap an expired lock (spec §4.7 step 8).
            Ok(false) => warn!(%user_id, "lock release found no matching holder (already expired)"),
            Err(e) => error!(%user_id, "lock release failed: {e}"),
        }
    }

    /// Marks the transaction `failed` as a non-retriable business
    /// outcome (insufficient balance): no cache rollback, since nothing
    /// was deducted.
    async fn fail_business(&self, transaction_id: &TransactionId, user_id: &UserId, code: &str, message: &str) {
        if let Err(e) = self.transaction_store.mark_failed(transaction_id, code, message).await {
            error!(%transaction_id, "failed to persist business failure: {e}");
        }
        self.audit(AuditLogEntry::new(transaction_id.clone(), user_id.clone(), AuditAction::PayoutFailed, message))
            .await;
        self.emit(
            user_id,
            PayoutEvent::PayoutFailed,
            serde_json::json!({"transaction_id": transaction_id.as_str(), "code": code, "message": message}),
        )
        .await;
    }

    /// Marks the transaction `failed` as a retriable infrastructure
    /// outcome, optionally compensating a deduction that actually
    /// happened. Scoping the rollback to "only if `deduct` ran" resolves
    /// the ambiguity the source left open (spec §9): an unconditional
    /// `add` here would over-credit a user whose balance was never
    /// touched.
    async fn fail_infra(
        &self,
        transaction_id: &TransactionId,
        user_id: &UserId,
        amount: Decimal,
        deducted: bool,
        reason: &str,
    ) -> Outcome {
        if deducted {
            match self.balance_cache.add(user_id.as_str(), amount).await {
                Ok(_) => {
                    self.audit(AuditLogEntry::new(
                        transaction_id.clone(),
                        user_id.clone(),
                        AuditAction::BalanceRestored,
                        "compensating rollback after settlement failure",
                    ))
                    .await;
                }
                Err(e) => error!(%transaction_id, "compensating rollback failed: {e}"),
            }
        }
        if let Err(e) = self.transaction_store.mark_failed(transaction_id, "SETTLEMENT_ERROR", reason).await {
            error!(%transaction_id, "failed to persist infra failure: {e}");
        }
        self.audit(AuditLogEntry::new(transaction_id.clone(), user_id.clone(), AuditAction::PayoutFailed, reason))
            .await;
        self.emit(
            user_id,
            PayoutEvent::PayoutFailed,
            serde_json::json!({"transaction_id": transaction_id.as_str(), "code": "SETTLEMENT_ERROR", "message": reason}),
        )
        .await;
        Outcome::Retry(reason.to_string())
    }

    pub async fn process(&self, envelope: PayoutEnvelope) -> Outcome {
        let transaction_id = envelope.transaction_id.clone();
        let user_id = envelope.user_id.clone();

        // Step 1: load transaction.
        let txn = match self.transaction_store.get_by_id(&transaction_id).await {
            Ok(Some(txn)) => txn,
            Ok(None) => {
                warn!(%transaction_id, "settlement message references an unknown transaction, dropping");
                return Outcome::Ack;
            }
            Err(e) => return Outcome::Retry(format!("failed to load transaction: {e}")),
        };

        // Step 2: idempotency.
        match txn.status {
            TransactionStatus::Completed => return Outcome::Ack,
            TransactionStatus::Processing => return Outcome::Reject,
            TransactionStatus::Failed | TransactionStatus::RolledBack => return Outcome::Ack,
            TransactionStatus::Initiated => {}
        }

        // Step 3: transition to processing.
        if let Err(e) = self.transaction_store.mark_processing(&transaction_id).await {
            return Outcome::Retry(format!("failed to mark processing: {e}"));
        }
        self.audit(AuditLogEntry::new(transaction_id.clone(), user_id.clone(), AuditAction::PayoutProcessing, "settlement started"))
            .await;
        self.emit(&user_id, PayoutEvent::PayoutProcessing, serde_json::json!({"transaction_id": transaction_id.as_str()}))
            .await;

        // Step 4: read cached balance.
        let balance = match self.balance_cache.get(user_id.as_str()).await {
            Ok(Some(b)) => b,
            Ok(None) => {
                return self
                    .fail_infra(&transaction_id, &user_id, envelope.amount, false, "cached balance not found")
                    .await;
            }
            Err(e) => {
                return self
                    .fail_infra(&transaction_id, &user_id, envelope.amount, false, &format!("balance cache read failed: {e}"))
                    .await;
            }
        };

        // Step 5: advisory pre-check.
        if balance < envelope.amount {
            self.fail_business(&transaction_id, &user_id, "INSUFFICIENT_BALANCE", "insufficient balance at settlement").await;
            return Outcome::Ack;
        }

        // Step 6: atomic deduct. The sentinel, not the step-5 pre-check, is authoritative.
        let balance_after = match self.balance_cache.deduct(user_id.as_str(), envelope.amount).await {
            Ok(DeductOutcome::Ok(new_balance)) => new_balance,
            Ok(DeductOutcome::Insufficient) => {
                self.fail_business(&transaction_id, &user_id, "INSUFFICIENT_BALANCE", "insufficient balance at settlement").await;
                return Outcome::Ack;
            }
            Ok(DeductOutcome::NotFound) => {
                return self
                    .fail_infra(&transaction_id, &user_id, envelope.amount, false, "cached balance disappeared before deduct")
                    .await;
            }
            Err(e) => {
                return self
                    .fail_infra(&transaction_id, &user_id, envelope.amount, false, &format!("deduct failed: {e}"))
                    .await;
            }
        };
        self.audit(AuditLogEntry::new(transaction_id.clone(), user_id.clone(), AuditAction::BalanceDeducted, format!("deducted, new balance {balance_after}")))
            .await;

        // Step 7: persist completion and the durable user balance.
        if let Err(e) = self.transaction_store.mark_completed(&transaction_id, balance_after).await {
            return self
                .fail_infra(&transaction_id, &user_id, envelope.amount, true, &format!("failed to persist completion: {e}"))
                .await;
        }
        if let Err(e) = self.user_store.update_balance(&user_id, balance_after, envelope.amount).await {
            return self
                .fail_infra(&transaction_id, &user_id, envelope.amount, true, &format!("failed to update user balance: {e}"))
                .await;
        }

        // Step 8: release the per-user lock handed off by the gateway.
        self.release_lock(&user_id, &envelope.lock_token).await;

        // Step 9: notify and audit.
        self.emit(
            &user_id,
            PayoutEvent::PayoutCompleted,
            serde_json::json!({"transaction_id": transaction_id.as_str(), "balance_after": balance_after}),
        )
        .await;
        self.audit(AuditLogEntry::new(transaction_id.clone(), user_id.clone(), AuditAction::PayoutCompleted, "settlement completed"))
            .await;

        info!(%transaction_id, %user_id, %balance_after, "payout settled");

        // Step 10.
        Outcome::Ack
    }
}
