//! Redis pub/sub backed `EventBridge`. Publish uses a multiplexed
//! `ConnectionManager`; subscribe opens its own dedicated connection,
//! since a connection in subscriber mode cannot also issue commands.

use std::future::Future;

use async_trait::async_trait;
use futures_util::StreamExt;
use payout_core::{Error, Result};
use redis::aio::ConnectionManager;
use tracing::{error, warn};

use crate::{EventBridge, EventEnvelope};

const DEFAULT_CHANNEL: &str = "websocket:events";

pub struct RedisEventBridge {
    client: redis::Client,
    publish_conn: ConnectionManager,
    channel: String,
}

impl RedisEventBridge {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        Self::connect_with_channel(redis_url, DEFAULT_CHANNEL).await
    }

    pub async fn connect_with_channel(redis_url: &str, channel: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Cache(format!("invalid redis url: {e}")))?;
        let publish_conn = client
            .get_tokio_connection_manager()
            .await
            .map_err(|e| Error::Cache(format!("failed to connect to redis: {e}")))?;
        Ok(Self {
            client,
            publish_conn,
            channel: channel.to_string(),
        })
    }
}

#[async_trait]
impl EventBridge for RedisEventBridge {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<()> {
        let payload = serde_json::to_string(envelope).map_err(|e| Error::Cache(e.to_string()))?;
        let mut conn = self.publish_conn.clone();
        redis::cmd("PUBLISH")
            .arg(&self.channel)
            .arg(payload)
            .query_async::<_, i64>(&mut conn)
            .await
            .map_err(|e| Error::Cache(format!("event publish failed: {e}")))?;
        Ok(())
    }

    async fn subscribe<F, Fut>(&self, on_event: F) -> Result<()>
    where
        F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| Error::Cache(format!("failed to open pub/sub connection: {e}")))?;
        pubsub
            .subscribe(&self.channel)
            .await
            .map_err(|e| Error::Cache(format!("failed to subscribe to {}: {e}", self.channel)))?;

        let mut stream = pubsub.into_on_message();
        while let Some(msg) = stream.next().await {
            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(e) => {
                    warn!("malformed event payload: {e}");
                    continue;
                }
            };
            match serde_json::from_str::<EventEnvelope>(&payload) {
                Ok(envelope) => on_event(envelope).await,
                Err(e) => error!("failed to decode event envelope: {e}"),
            }
        }
        Ok(())
    }
}
