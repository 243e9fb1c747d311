//! Gateway Intake protocol (spec §4.6). Acquires the per-user lock,
//! admits against the cached balance, durably records the transaction
//! as `initiated`, and hands off to the worker via the broker. The
//! lock crosses the intake/settlement boundary by design, so a
//! concurrent second request can never admit against a stale cache.

use std::sync::Arc;

use payout_broker::{PayoutEnvelope, Publisher};
use payout_cache::BalanceCache;
use payout_core::{
    validate_amount, AuditAction, AuditLogEntry, Currency, Error, PayoutConfig, RequestMetadata,
    Result, Transaction, TransactionId, TransactionStatus, UserId,
};
use payout_events::{EventBridge, EventEnvelope, PayoutEvent};
use payout_lock::Lock;
use payout_store::{AuditLog, TransactionStore, UserStore};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct InitiatePayoutRequest {
    pub user_id: String,
    pub amount: Decimal,
    pub currency: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitiatePayoutResponse {
    pub success: bool,
    pub transaction_id: String,
    pub status: &'static str,
    pub amount: Decimal,
    pub currency: String,
    pub message: String,
}

pub struct GatewayIntake {
    lock: Arc<dyn Lock>,
    balance_cache: Arc<dyn BalanceCache>,
    transaction_store: Arc<dyn TransactionStore>,
    user_store: Arc<dyn UserStore>,
    audit_log: Arc<dyn AuditLog>,
    publisher: Arc<dyn Publisher>,
    event_bridge: Arc<dyn EventBridge>,
    config: PayoutConfig,
}

impl GatewayIntake {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lock: Arc<dyn Lock>,
        balance_cache: Arc<dyn BalanceCache>,
        transaction_store: Arc<dyn TransactionStore>,
        user_store: Arc<dyn UserStore>,
        audit_log: Arc<dyn AuditLog>,
        publisher: Arc<dyn Publisher>,
        event_bridge: Arc<dyn EventBridge>,
        config: PayoutConfig,
    ) -> Self {
        Self {
            lock,
            balance_cache,
            transaction_store,
            user_store,
            audit_log,
            publisher,
            event_bridge,
            config,
        }
    }

    async fn audit(&self, entry: AuditLogEntry) {
        if let Err(e) = self.audit_log.append(&entry).await {
            warn!(action = ?entry.action, "failed to write audit entry: {e}");
        }
    }

    async fn release_lock(&self, user_id: &UserId, token: &str) {
        match self.lock.release(user_id.as_str(), token).await {
            Ok(true) => {}
            Ok(false) => warn!(%user_id, "lock release found a different holder (already expired)"),
            Err(e) => error!(%user_id, "lock release failed: {e}"),
        }
    }

    pub async fn initiate_payout(
        &self,
        request: InitiatePayoutRequest,
        metadata: RequestMetadata,
    ) -> Result<InitiatePayoutResponse> {
        // Step 1: validate.
        if request.user_id.trim().is_empty() {
            return Err(Error::Validation("user_id must not be empty".into()));
        }
        let currency: Currency = request
            .currency
            .as_deref()
            .unwrap_or("USD")
            .parse()?;
        validate_amount(request.amount, self.config.min_payout_amount, self.config.max_payout_amount)?;

        let user_id = UserId::new(request.user_id.clone());

        // Step 2: generate transaction id.
        let transaction_id = TransactionId::generate();

        // Step 3: acquire lock, held across intake AND settlement.
        let token = self
            .lock
            .acquire_with_retry(
                user_id.as_str(),
                self.config.lock_ttl(),
                self.config.lock_retry_count,
                self.config.lock_retry_delay(),
            )
            .await?
            .ok_or(Error::ConcurrentRequest)?;
        self.audit(AuditLogEntry::new(
            transaction_id.clone(),
            user_id.clone(),
            AuditAction::LockAcquired,
            "lock acquired for intake",
        ))
        .await;

        // From here on, every early exit must release the lock.
        match self
            .initiate_inner(&transaction_id, &user_id, request.amount, currency, &metadata, request.description, &token)
            .await
        {
            Ok(response) => Ok(response),
            Err(e) => {
                self.release_lock(&user_id, &token).await;
                self.audit(AuditLogEntry::new(
                    transaction_id.clone(),
                    user_id.clone(),
                    AuditAction::LockReleased,
                    format!("rolled back after: {e}"),
                ))
                .await;
                Err(e)
            }
        }
    }

    /// Steps 4-10. The lock is already held by the caller; this helper
    /// never releases it on the success path (handoff to the worker),
    /// only the caller's error arm does, so release stays in one place.
    async fn initiate_inner(
        &self,
        transaction_id: &TransactionId,
        user_id: &UserId,
        amount: Decimal,
        currency: Currency,
        metadata: &RequestMetadata,
        description: Option<String>,
        lock_token: &str,
    ) -> Result<InitiatePayoutResponse> {
        // Step 4: load user.
        let user = self
            .user_store
            .get_by_id(user_id)
            .await?
            .ok_or(Error::UserNotFound)?;
        if !user.is_eligible_for_payout() {
            return Err(Error::UserNotActive);
        }

        // Step 5: read cached balance, rehydrating on cold miss.
        let balance_before = match self.balance_cache.get(user_id.as_str()).await? {
            Some(balance) => balance,
            None => {
                self.balance_cache.set(user_id.as_str(), user.balance).await?;
                user.balance
            }
        };

        // Step 6: advisory sufficiency check.
        if !self.balance_cache.has_sufficient(user_id.as_str(), amount).await? {
            return Err(Error::InsufficientBalance);
        }

        // Step 7: durably record the transaction as initiated.
        let mut request_metadata = metadata.clone();
        request_metadata.description = description;
        let transaction = Transaction::new_initiated(
            transaction_id.clone(),
            user_id.clone(),
            amount,
            currency,
            balance_before,
            request_metadata,
        );
        self.transaction_store.insert(&transaction).await?;

        // Step 8: hand off to the worker.
        let envelope = PayoutEnvelope {
            transaction_id: transaction_id.clone(),
            user_id: user_id.clone(),
            amount,
            currency,
            metadata: serde_json::to_value(&transaction.metadata).unwrap_or(serde_json::Value::Null),
            timestamp: transaction.created_at,
            lock_token: lock_token.to_string(),
        };
        if let Err(e) = self.publisher.publish(&envelope).await {
            if let Err(mark_err) = self
                .transaction_store
                .mark_failed(transaction_id, "QUEUE_ERROR", &e.to_string())
                .await
            {
                error!(%transaction_id, "failed to mark transaction failed after publish error: {mark_err}");
            }
            return Err(Error::Queue(e.to_string()));
        }
        self.audit(AuditLogEntry::new(
            transaction_id.clone(),
            user_id.clone(),
            AuditAction::MessagePublished,
            "settlement envelope published",
        ))
        .await;

        // Step 9: notify the submitter's session(s).
        if let Err(e) = self
            .event_bridge
            .publish(&EventEnvelope::new(
                user_id.clone(),
                PayoutEvent::PayoutInitiated,
                serde_json::json!({
                    "status": "initiated",
                    "transaction_id": transaction_id.as_str(),
                    "amount": amount,
                    "currency": currency.to_string(),
                }),
            ))
            .await
        {
            warn!(%transaction_id, "failed to emit PAYOUT_INITIATED event: {e}");
        }
        self.audit(AuditLogEntry::new(
            transaction_id.clone(),
            user_id.clone(),
            AuditAction::PayoutInitiated,
            "payout initiated",
        ))
        .await;

        // Step 10: lock intentionally stays held; the worker releases it.
        info!(%transaction_id, %user_id, "payout initiated");
        Ok(InitiatePayoutResponse {
            success: true,
            transaction_id: transaction_id.to_string(),
            status: "initiated",
            amount,
            currency: currency.to_string(),
            message: "payout initiated".to_string(),
        })
    }

    pub async fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Transaction> {
        self.transaction_store
            .get_by_id(transaction_id)
            .await?
            .ok_or(Error::TransactionNotFound)
    }

    pub async fn get_balance(&self, user_id: &UserId) -> Result<(Decimal, Currency)> {
        let user = self.user_store.get_by_id(user_id).await?.ok_or(Error::UserNotFound)?;
        let balance = self.balance_cache.get(user_id.as_str()).await?.unwrap_or(user.balance);
        Ok((balance, user.currency))
    }

    pub async fn get_history(
        &self,
        user_id: &UserId,
        status: Option<TransactionStatus>,
        limit: i64,
    ) -> Result<Vec<Transaction>> {
        self.transaction_store.get_by_user(user_id, status, limit).await
    }
}
