//! Transaction record and its state machine (spec §3, §4.7).

use crate::error::{Error, Result};
use crate::ids::{TransactionId, UserId};
use crate::money::Currency;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Initiated,
    Processing,
    Completed,
    Failed,
    RolledBack,
}

impl TransactionStatus {
    /// Whether `self -> next` is a legal state-machine edge (spec §4.7):
    /// `initiated -> processing -> completed`, with `failed` reachable
    /// from `initiated` or `processing`. No edge leaves `completed`,
    /// `failed`, or `rolled_back`; those are terminal.
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        match (self, next) {
            (Initiated, Processing) => true,
            (Processing, Completed) => true,
            (Initiated, Failed) => true,
            (Processing, Failed) => true,
            // Re-applying the same terminal state is idempotent, not a
            // transition; callers check this separately via `==`.
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Failed | TransactionStatus::RolledBack
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Payout,
    Refund,
    Adjustment,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub source: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: TransactionStatus,
    pub transaction_type: TransactionType,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub metadata: RequestMetadata,
    pub lock_acquired: bool,
    pub created_at: DateTime<Utc>,
    pub processing_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub processing_duration_ms: Option<i64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl Transaction {
    pub fn new_initiated(
        transaction_id: TransactionId,
        user_id: UserId,
        amount: Decimal,
        currency: Currency,
        balance_before: Decimal,
        metadata: RequestMetadata,
    ) -> Self {
        Self {
            transaction_id,
            user_id,
            amount,
            currency,
            status: TransactionStatus::Initiated,
            transaction_type: TransactionType::Payout,
            balance_before,
            balance_after: balance_before - amount,
            metadata,
            lock_acquired: true,
            created_at: Utc::now(),
            processing_at: None,
            completed_at: None,
            failed_at: None,
            processing_duration_ms: None,
            error_code: None,
            error_message: None,
        }
    }

    /// Applies a transition, enforcing the state machine invariant.
    /// Re-applying the transaction's current terminal status is a no-op
    /// success (idempotent redelivery, spec §4.3).
    fn transition(&mut self, next: TransactionStatus) -> Result<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(Error::Internal(format!(
                "illegal transaction transition {:?} -> {:?}",
                self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    pub fn mark_processing(&mut self) -> Result<()> {
        self.transition(TransactionStatus::Processing)?;
        self.processing_at.get_or_insert(Utc::now());
        Ok(())
    }

    /// Completes the transaction and computes `processing_duration_ms`
    /// from the `processing` timestamp (spec §4.3).
    pub fn mark_completed(&mut self, balance_after: Decimal) -> Result<()> {
        self.transition(TransactionStatus::Completed)?;
        if self.completed_at.is_none() {
            let now = Utc::now();
            if let Some(started) = self.processing_at {
                self.processing_duration_ms = Some((now - started).num_milliseconds());
            }
            self.balance_after = balance_after;
            self.completed_at = Some(now);
        }
        Ok(())
    }

    pub fn mark_failed(&mut self, code: &str, message: impl Into<String>) -> Result<()> {
        self.transition(TransactionStatus::Failed)?;
        if self.failed_at.is_none() {
            self.failed_at = Some(Utc::now());
            self.error_code = Some(code.to_string());
            self.error_message = Some(message.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> Transaction {
        Transaction::new_initiated(
            TransactionId::from("TXN_TEST"),
            UserId::new("user_001"),
            dec!(100.50),
            Currency::Usd,
            dec!(10000.00),
            RequestMetadata::default(),
        )
    }

    #[test]
    fn balance_after_computed_on_initiation() {
        let tx = sample();
        assert_eq!(tx.balance_after, dec!(9899.50));
    }

    #[test]
    fn happy_path_transitions() {
        let mut tx = sample();
        tx.mark_processing().unwrap();
        assert_eq!(tx.status, TransactionStatus::Processing);
        tx.mark_completed(dec!(9899.50)).unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert!(tx.processing_duration_ms.is_some());
    }

    #[test]
    fn cannot_resurrect_from_completed() {
        let mut tx = sample();
        tx.mark_processing().unwrap();
        tx.mark_completed(dec!(9899.50)).unwrap();
        assert!(tx.mark_processing().is_err());
        assert!(tx.mark_failed("X", "nope").is_err());
    }

    #[test]
    fn cannot_resurrect_from_failed() {
        let mut tx = sample();
        tx.mark_failed("INSUFFICIENT_BALANCE", "no funds").unwrap();
        assert!(tx.mark_processing().is_err());
        assert!(tx.mark_completed(dec!(0)).is_err());
    }

    #[test]
    fn repeated_application_of_same_terminal_state_is_idempotent() {
        let mut tx = sample();
        tx.mark_processing().unwrap();
        tx.mark_completed(dec!(9899.50)).unwrap();
        assert!(tx.mark_completed(dec!(9899.50)).is_ok());
    }

    #[test]
    fn failed_can_follow_processing() {
        let mut tx = sample();
        tx.mark_processing().unwrap();
        tx.mark_failed("BALANCE_NOT_FOUND", "cache miss").unwrap();
        assert_eq!(tx.status, TransactionStatus::Failed);
    }
}
