//! Durable settlement queue (spec §4.4/§4.5). The envelope is the only
//! thing that crosses the wire between Gateway Intake and Worker
//! Settlement; everything else is re-derived by the worker from the
//! transaction id.

mod rabbit;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use rabbit::{RabbitConsumer, RabbitPublisher};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use payout_core::{Currency, Result, TransactionId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Wire envelope published to the settlement queue and consumed by the
/// worker. Body is immutable after initiation; the only mutable piece
/// of queue-level state is the `x-retry-count` header, which the
/// broker layer owns, not the envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutEnvelope {
    pub transaction_id: TransactionId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub currency: Currency,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    /// The per-user lock's fencing token, handed off from Gateway Intake
    /// (spec §4.6 step 10: the lock crosses to the worker via the queue,
    /// not via the transaction record, since it is ephemeral runtime
    /// state rather than an audit fact).
    pub lock_token: String,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Durable publish with `message_id = transaction_id` for idempotent
    /// consumption. Backpressure/broker failure must surface as
    /// `Error::Queue` so the gateway rolls back admission (spec §4.4).
    async fn publish(&self, envelope: &PayoutEnvelope) -> Result<()>;
}

/// Result of handling one delivery, as decided by the settlement
/// handler (spec §4.7). The Consumer turns this into an ack/nack
/// decision; it never inspects business error variants itself.
#[derive(Debug)]
pub enum Outcome {
    /// Handled to completion, whether by business success or by a
    /// terminal business failure that the protocol says to ack anyway
    /// (missing transaction, insufficient balance).
    Ack,
    /// Non-retriable conflict (`ALREADY_PROCESSING`): nack without
    /// requeue, which the broker topology dead-letters immediately.
    Reject,
    /// Transient failure. The Consumer applies the requeue policy:
    /// republish with an incremented retry count, or dead-letter once
    /// `max_retries` is exhausted.
    Retry(String),
}

#[async_trait]
pub trait Consumer: Send + Sync {
    /// Runs the bounded-concurrency dequeue loop until the channel is
    /// closed or cancelled by the broker. `handler` is invoked once per
    /// delivery with at most `prefetch` concurrent invocations.
    async fn run<H, Fut>(&self, handler: H) -> Result<()>
    where
        H: Fn(PayoutEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static;
}

#[cfg(test)]
mod tests {
    use super::testing::InMemoryBroker;
    use super::*;
    use payout_core::{Currency, TransactionId, UserId};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn sample_envelope() -> PayoutEnvelope {
        PayoutEnvelope {
            transaction_id: TransactionId::from("TXN_BROKER_1"),
            user_id: UserId::new("user_001"),
            amount: dec!(50.00),
            currency: Currency::Usd,
            metadata: serde_json::json!({}),
            timestamp: Utc::now(),
            lock_token: "test-token".to_string(),
        }
    }

    #[tokio::test]
    async fn published_envelope_is_consumed() {
        let broker = InMemoryBroker::new(3, 0);
        broker.publisher().publish(&sample_envelope()).await.unwrap();

        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = seen.clone();
        broker
            .consumer()
            .run(move |_env| {
                let seen = seen_clone.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Outcome::Ack
                }
            })
            .await
            .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retriable_failures_exhaust_into_dead_letter() {
        let broker = InMemoryBroker::new(3, 0);
        broker.publisher().publish(&sample_envelope()).await.unwrap();

        // First pass: one attempt fails retriably and gets requeued.
        broker
            .consumer()
            .run(|_env| async { Outcome::Retry("cache unavailable".into()) })
            .await
            .unwrap();
        assert_eq!(broker.dead_letter_count().await, 0);

        // Drain two more times to exhaust max_retries = 3.
        for _ in 0..2 {
            broker
                .consumer()
                .run(|_env| async { Outcome::Retry("cache unavailable".into()) })
                .await
                .unwrap();
        }
        assert_eq!(broker.dead_letter_count().await, 1);
    }

    #[tokio::test]
    async fn reject_dead_letters_immediately() {
        let broker = InMemoryBroker::new(3, 0);
        broker.publisher().publish(&sample_envelope()).await.unwrap();

        broker
            .consumer()
            .run(|_env| async { Outcome::Reject })
            .await
            .unwrap();

        assert_eq!(broker.dead_letter_count().await, 1);
    }
}
