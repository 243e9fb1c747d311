//! Durable storage for users, transactions, and the audit trail
//! (spec §4.3). Postgres-backed via `tokio-postgres`/`deadpool-postgres`.

mod audit;
mod pool;
mod transactions;
mod users;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use audit::{AuditLog, PgAuditLog};
pub use pool::PgPool;
pub use transactions::{PgTransactionStore, TransactionStore};
pub use users::{PgUserStore, UserStore};

#[cfg(test)]
mod tests {
    use super::testing::{InMemoryAuditLog, InMemoryTransactionStore, InMemoryUserStore};
    use super::*;
    use payout_core::{
        AuditAction, AuditLogEntry, Currency, RequestMetadata, Transaction, TransactionId,
        TransactionStatus, User, UserId, UserStatus,
    };
    use rust_decimal_macros::dec;

    fn sample_user() -> User {
        User {
            user_id: UserId::new("user_001"),
            display_name: "Test User".into(),
            balance: dec!(1000.00),
            currency: Currency::Usd,
            status: UserStatus::Active,
            total_payouts: 0,
            total_payout_amount: dec!(0),
            last_payout_at: None,
        }
    }

    fn sample_txn() -> Transaction {
        Transaction::new_initiated(
            TransactionId::from("TXN_TEST_1"),
            UserId::new("user_001"),
            dec!(100.00),
            Currency::Usd,
            dec!(1000.00),
            RequestMetadata::default(),
        )
    }

    #[tokio::test]
    async fn user_store_round_trips() {
        let store = InMemoryUserStore::new();
        let user = sample_user();
        store.insert(&user).await.unwrap();

        let fetched = store.get_by_id(&user.user_id).await.unwrap().unwrap();
        assert_eq!(fetched.balance, dec!(1000.00));

        store
            .update_balance(&user.user_id, dec!(900.00), dec!(100.00))
            .await
            .unwrap();
        let fetched = store.get_by_id(&user.user_id).await.unwrap().unwrap();
        assert_eq!(fetched.balance, dec!(900.00));
        assert_eq!(fetched.total_payouts, 1);
    }

    #[tokio::test]
    async fn update_balance_on_unknown_user_fails() {
        let store = InMemoryUserStore::new();
        let err = store
            .update_balance(&UserId::new("ghost"), dec!(0), dec!(0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "USER_NOT_FOUND");
    }

    #[tokio::test]
    async fn transaction_store_tracks_state_machine() {
        let store = InMemoryTransactionStore::new();
        let txn = sample_txn();
        let id = txn.transaction_id.clone();
        store.insert(&txn).await.unwrap();

        store.mark_processing(&id).await.unwrap();
        let fetched = store.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(fetched.status, TransactionStatus::Processing);

        store.mark_completed(&id, dec!(900.00)).await.unwrap();
        let fetched = store.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(fetched.status, TransactionStatus::Completed);
        assert_eq!(fetched.balance_after, dec!(900.00));
    }

    #[tokio::test]
    async fn get_by_user_filters_by_status_and_orders_newest_first() {
        let store = InMemoryTransactionStore::new();
        let mut first = sample_txn();
        first.transaction_id = TransactionId::from("TXN_A");
        first.mark_processing().unwrap();
        first.mark_completed(dec!(900.00)).unwrap();
        store.insert(&first).await.unwrap();

        let second = sample_txn();
        store.insert(&second).await.unwrap();

        let completed = store
            .get_by_user(&UserId::new("user_001"), Some(TransactionStatus::Completed), 10)
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].transaction_id, TransactionId::from("TXN_A"));

        let all = store.get_by_user(&UserId::new("user_001"), None, 10).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn audit_log_appends_entries() {
        let log = InMemoryAuditLog::new();
        log.append(&AuditLogEntry::new(
            TransactionId::from("TXN_TEST_1"),
            UserId::new("user_001"),
            AuditAction::PayoutInitiated,
            "payout initiated",
        ))
        .await
        .unwrap();
        assert_eq!(log.entries.lock().unwrap().len(), 1);
    }
}
