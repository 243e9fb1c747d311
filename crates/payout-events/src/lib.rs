//! Real-time status fan-out (spec §4.8). The worker publishes onto a
//! single cache pub/sub channel; every gateway instance subscribes and
//! dispatches to whichever of its own sessions own the user, ignoring
//! everything else. This gives horizontal gateway scaling without
//! sticky sessions.

mod redis_bridge;
mod registry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use redis_bridge::RedisEventBridge;
pub use registry::{SessionId, SessionRegistry};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use payout_core::{Result, UserId};
use serde::{Deserialize, Serialize};
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutEvent {
    PayoutInitiated,
    PayoutProcessing,
    PayoutCompleted,
    PayoutFailed,
}

/// Message shape on the pub/sub channel (spec §3 "Event envelope").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub user_id: UserId,
    pub event: PayoutEvent,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(user_id: UserId, event: PayoutEvent, data: serde_json::Value) -> Self {
        Self {
            user_id,
            event,
            data,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait EventBridge: Send + Sync {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<()>;

    /// Subscribes and invokes `on_event` for every message received,
    /// until the underlying connection closes. Callers are expected to
    /// filter by session ownership themselves via `SessionRegistry`.
    async fn subscribe<F, Fut>(&self, on_event: F) -> Result<()>
    where
        F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static;
}

#[cfg(test)]
mod tests {
    use super::testing::InMemoryEventBridge;
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn subscribed_listener_receives_published_events() {
        let bridge = InMemoryEventBridge::new();
        let received = Arc::new(AtomicU32::new(0));
        let received_clone = received.clone();

        bridge
            .subscribe(move |_envelope| {
                let received = received_clone.clone();
                async move {
                    received.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await
            .unwrap();

        bridge
            .publish(&EventEnvelope::new(
                UserId::new("user_001"),
                PayoutEvent::PayoutInitiated,
                serde_json::json!({}),
            ))
            .await
            .unwrap();

        assert_eq!(received.load(Ordering::SeqCst), 1);
        assert_eq!(bridge.events().len(), 1);
    }

    #[test]
    fn event_envelope_round_trips_through_json() {
        let envelope = EventEnvelope::new(
            UserId::new("user_001"),
            PayoutEvent::PayoutCompleted,
            serde_json::json!({"new_balance": "900.00"}),
        );
        let raw = serde_json::to_string(&envelope).unwrap();
        assert!(raw.contains("\"event\":\"PAYOUT_COMPLETED\""));

        let parsed: EventEnvelope = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.user_id, envelope.user_id);
        assert_eq!(parsed.event, PayoutEvent::PayoutCompleted);
    }
}
