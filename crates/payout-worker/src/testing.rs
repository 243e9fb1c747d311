//! Harness wiring a `WorkerSettlement` from in-memory fakes, shared by
//! this crate's unit tests and the cross-crate end-to-end scenarios.

use std::sync::Arc;

use payout_cache::testing::InMemoryBalanceCache;
use payout_cache::BalanceCache;
use payout_core::{Currency, Transaction, TransactionId, User, UserId, UserStatus};
use payout_events::testing::InMemoryEventBridge;
use payout_lock::testing::InMemoryLock;
use payout_lock::Lock;
use payout_store::testing::{InMemoryAuditLog, InMemoryTransactionStore, InMemoryUserStore};
use rust_decimal::Decimal;

use crate::WorkerSettlement;

pub struct TestHarness {
    pub lock: Arc<InMemoryLock>,
    pub balance_cache: Arc<InMemoryBalanceCache>,
    pub transaction_store: Arc<InMemoryTransactionStore>,
    pub user_store: Arc<InMemoryUserStore>,
    pub audit_log: Arc<InMemoryAuditLog>,
    pub event_bridge: Arc<InMemoryEventBridge>,
    pub settlement: WorkerSettlement,
}

impl TestHarness {
    pub fn new() -> Self {
        let lock = Arc::new(InMemoryLock::new());
        let balance_cache = Arc::new(InMemoryBalanceCache::new());
        let transaction_store = Arc::new(InMemoryTransactionStore::new());
        let user_store = Arc::new(InMemoryUserStore::new());
        let audit_log = Arc::new(InMemoryAuditLog::new());
        let event_bridge = Arc::new(InMemoryEventBridge::new());

        let settlement = WorkerSettlement::new(
            lock.clone(),
            balance_cache.clone(),
            transaction_store.clone(),
            user_store.clone(),
            audit_log.clone(),
            event_bridge.clone(),
        );

        Self {
            lock,
            balance_cache,
            transaction_store,
            user_store,
            audit_log,
            event_bridge,
            settlement,
        }
    }

    /// Seeds a user and a matching `initiated` transaction with a lock
    /// already acquired, as Gateway Intake would leave them, and returns
    /// the fencing token so the caller can build the settlement envelope.
    pub async fn seed_initiated(&self, user_id: &str, balance: Decimal, amount: Decimal) -> (TransactionId, String) {
        let user_id = UserId::new(user_id);
        let user = User {
            user_id: user_id.clone(),
            display_name: "Test User".to_string(),
            balance,
            currency: Currency::Usd,
            status: UserStatus::Active,
            total_payouts: 0,
            total_payout_amount: Decimal::ZERO,
            last_payout_at: None,
        };
        self.user_store.insert(&user).await.unwrap();
        self.balance_cache.set(user_id.as_str(), balance).await.unwrap();

        let token = self
            .lock
            .acquire(user_id.as_str(), std::time::Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();

        let transaction_id = TransactionId::generate();
        let txn = Transaction::new_initiated(
            transaction_id.clone(),
            user_id.clone(),
            amount,
            Currency::Usd,
            balance,
            Default::default(),
        );
        self.transaction_store.insert(&txn).await.unwrap();

        (transaction_id, token)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
