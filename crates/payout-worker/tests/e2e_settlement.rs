//! End-to-end scenarios (spec.md §8) wiring a real `GatewayIntake`
//! against a real `WorkerSettlement` over the same in-memory
//! collaborators, the way a client, the broker, and the worker process
//! would actually interleave.

use std::sync::Arc;
use std::time::Duration;

use payout_broker::testing::InMemoryBroker;
use payout_broker::{Consumer, Publisher};
use payout_cache::testing::InMemoryBalanceCache;
use payout_cache::BalanceCache;
use payout_core::{Currency, Error, RequestMetadata, TransactionStatus, User, UserId, UserStatus};
use payout_events::testing::InMemoryEventBridge;
use payout_events::PayoutEvent;
use payout_gateway::intake::InitiatePayoutRequest;
use payout_gateway::GatewayIntake;
use payout_lock::testing::InMemoryLock;
use payout_lock::Lock;
use payout_store::testing::{InMemoryAuditLog, InMemoryTransactionStore, InMemoryUserStore};
use payout_store::{TransactionStore, UserStore};
use payout_worker::WorkerSettlement;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

struct Pipeline {
    intake: GatewayIntake,
    settlement: Arc<WorkerSettlement>,
    broker: InMemoryBroker,
    lock: Arc<InMemoryLock>,
    balance_cache: Arc<InMemoryBalanceCache>,
    transaction_store: Arc<InMemoryTransactionStore>,
    user_store: Arc<InMemoryUserStore>,
    event_bridge: Arc<InMemoryEventBridge>,
}

impl Pipeline {
    fn new() -> Self {
        let lock = Arc::new(InMemoryLock::new());
        let balance_cache = Arc::new(InMemoryBalanceCache::new());
        let transaction_store = Arc::new(InMemoryTransactionStore::new());
        let user_store = Arc::new(InMemoryUserStore::new());
        let audit_log = Arc::new(InMemoryAuditLog::new());
        let event_bridge = Arc::new(InMemoryEventBridge::new());
        let broker = InMemoryBroker::new(3, 0);

        let intake = GatewayIntake::new(
            lock.clone(),
            balance_cache.clone(),
            transaction_store.clone(),
            user_store.clone(),
            audit_log.clone(),
            Arc::new(broker.publisher()),
            event_bridge.clone(),
            payout_core::PayoutConfig::default(),
        );

        let settlement = Arc::new(WorkerSettlement::new(
            lock.clone(),
            balance_cache.clone(),
            transaction_store.clone(),
            user_store.clone(),
            audit_log,
            event_bridge.clone(),
        ));

        Self {
            intake,
            settlement,
            broker,
            lock,
            balance_cache,
            transaction_store,
            user_store,
            event_bridge,
        }
    }

    async fn seed_user(&self, user_id: &str, balance: Decimal) {
        self.user_store
            .insert(&User {
                user_id: UserId::new(user_id),
                display_name: "Test User".to_string(),
                balance,
                currency: Currency::Usd,
                status: UserStatus::Active,
                total_payouts: 0,
                total_payout_amount: Decimal::ZERO,
                last_payout_at: None,
            })
            .await
            .unwrap();
    }

    /// Drains every message currently on the broker through the worker,
    /// as the Consumer would.
    async fn drain_worker(&self) {
        let settlement = self.settlement.clone();
        self.broker
            .consumer()
            .run(move |envelope| {
                let settlement = settlement.clone();
                async move { settlement.process(envelope).await }
            })
            .await
            .unwrap();
    }
}

fn metadata() -> RequestMetadata {
    RequestMetadata {
        ip: Some("127.0.0.1".to_string()),
        user_agent: None,
        source: Some("test".to_string()),
        description: None,
    }
}

#[tokio::test]
async fn scenario_1_happy_path() {
    // Given: user_001 has a durable balance of 10,000.00.
    let pipeline = Pipeline::new();
    pipeline.seed_user("user_001", dec!(10000.00)).await;

    // When: they request a 100.50 payout.
    let response = pipeline
        .intake
        .initiate_payout(
            InitiatePayoutRequest {
                user_id: "user_001".to_string(),
                amount: dec!(100.50),
                currency: Some("USD".to_string()),
                description: None,
            },
            metadata(),
        )
        .await
        .unwrap();
    assert_eq!(response.status, "initiated");

    // And: the worker settles the queued envelope.
    pipeline.drain_worker().await;

    // Then: the balance reflects the deduction and the transaction is completed.
    let balance = pipeline.balance_cache.get("user_001").await.unwrap().unwrap();
    assert_eq!(balance, dec!(9899.50));

    let transaction_id = payout_core::TransactionId::from(response.transaction_id.clone());
    let txn = pipeline.transaction_store.get_by_id(&transaction_id).await.unwrap().unwrap();
    assert_eq!(txn.status, TransactionStatus::Completed);
    assert_eq!(txn.balance_after, dec!(9899.50));

    // And: events were emitted in order INITIATED, PROCESSING, COMPLETED.
    let events: Vec<PayoutEvent> = pipeline.event_bridge.events().into_iter().map(|e| e.event).collect();
    assert_eq!(
        events,
        vec![PayoutEvent::PayoutInitiated, PayoutEvent::PayoutProcessing, PayoutEvent::PayoutCompleted]
    );
}

#[tokio::test]
async fn scenario_2_concurrent_duplicate() {
    // Given: user_002 has a durable balance of 5,000.00.
    let pipeline = Pipeline::new();
    pipeline.seed_user("user_002", dec!(5000.00)).await;

    let request = || InitiatePayoutRequest {
        user_id: "user_002".to_string(),
        amount: dec!(100.00),
        currency: Some("USD".to_string()),
        description: None,
    };

    // When: the first request takes the lock before a second arrives.
    let first = pipeline.intake.initiate_payout(request(), metadata()).await;
    let second = pipeline.intake.initiate_payout(request(), metadata()).await;

    // Then: exactly one succeeds, and the other is rejected as concurrent.
    assert!(first.is_ok());
    assert!(matches!(second, Err(Error::ConcurrentRequest)));

    // And: after the first settles, a repeat request succeeds against the new balance.
    pipeline.drain_worker().await;
    let third = pipeline.intake.initiate_payout(request(), metadata()).await.unwrap();
    assert_eq!(third.status, "initiated");
    pipeline.drain_worker().await;

    let balance = pipeline.balance_cache.get("user_002").await.unwrap().unwrap();
    assert_eq!(balance, dec!(4800.00));
}

#[tokio::test]
async fn scenario_3_insufficient_funds() {
    // Given: user_002 has a durable balance of 5,000.00.
    let pipeline = Pipeline::new();
    pipeline.seed_user("user_002", dec!(5000.00)).await;

    // When: they request more than their balance.
    let result = pipeline
        .intake
        .initiate_payout(
            InitiatePayoutRequest {
                user_id: "user_002".to_string(),
                amount: dec!(5000.01),
                currency: Some("USD".to_string()),
                description: None,
            },
            metadata(),
        )
        .await;

    // Then: the request is rejected and nothing was persisted.
    assert!(matches!(result, Err(Error::InsufficientBalance)));
    assert_eq!(pipeline.transaction_store.get_by_user(&UserId::new("user_002"), None, 10).await.unwrap().len(), 0);

    // And: the lock was released, so a fresh acquisition succeeds.
    assert!(pipeline.lock.acquire("user_002", Duration::from_secs(5)).await.unwrap().is_some());
}

#[tokio::test]
async fn scenario_4_crash_between_deduct_and_completion() {
    // Given: an initiated payout whose first worker attempt got as far as `processing`.
    let pipeline = Pipeline::new();
    pipeline.seed_user("user_003", dec!(5000.00)).await;
    let response = pipeline
        .intake
        .initiate_payout(
            InitiatePayoutRequest {
                user_id: "user_003".to_string(),
                amount: dec!(100.00),
                currency: Some("USD".to_string()),
                description: None,
            },
            metadata(),
        )
        .await
        .unwrap();
    let transaction_id = payout_core::TransactionId::from(response.transaction_id.clone());
    pipeline.transaction_store.mark_processing(&transaction_id).await.unwrap();

    // When: redelivery reaches a fresh worker.
    pipeline.drain_worker().await;

    // Then: it observes `processing` and backs off without a second deduction.
    let balance = pipeline.balance_cache.get("user_003").await.unwrap().unwrap();
    assert_eq!(balance, dec!(5000.00));
    assert_eq!(pipeline.broker.dead_letter_count().await, 1);
}

#[tokio::test]
async fn scenario_5_poison_message() {
    // Given: a settlement envelope pointing at a transaction that was never recorded.
    let pipeline = Pipeline::new();
    pipeline.seed_user("user_006", dec!(1000.00)).await;

    let ghost = payout_broker::PayoutEnvelope {
        transaction_id: payout_core::TransactionId::generate(),
        user_id: UserId::new("user_006"),
        amount: dec!(10.00),
        currency: Currency::Usd,
        metadata: serde_json::json!({}),
        timestamp: chrono::Utc::now(),
        lock_token: "bogus".to_string(),
    };
    pipeline.broker.publisher().publish(&ghost).await.unwrap();

    // When: the worker dequeues it.
    pipeline.drain_worker().await;

    // Then: per the protocol's step 1, a missing transaction is ack'd and
    // dropped; it never reaches the DLQ and leaves no trace on the cache.
    assert_eq!(pipeline.broker.dead_letter_count().await, 0);
    let balance = pipeline.balance_cache.get("user_006").await.unwrap();
    assert!(balance.is_none());
}
