//! `lapin`-backed AMQP broker implementing the topology from spec §6:
//! a durable direct exchange `dlx_payout`, a durable `payout_dlq` bound
//! to it, and a durable `payout_queue` whose dead-letter config routes
//! exhausted/rejected messages to the DLQ.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use payout_core::{Error, Result};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::{Outcome, PayoutEnvelope};

const DLX_EXCHANGE: &str = "dlx_payout";
const DLQ_QUEUE: &str = "payout_dlq";
const MAIN_QUEUE: &str = "payout_queue";
const ROUTING_KEY: &str = "payout";
const MESSAGE_TTL_MS: i32 = 86_400_000;

const RETRY_COUNT_HEADER: &str = "x-retry-count";

async fn connect(amqp_url: &str) -> Result<Channel> {
    let conn = Connection::connect(amqp_url, ConnectionProperties::default())
        .await
        .map_err(|e| Error::Queue(format!("amqp connection failed: {e}")))?;
    conn.create_channel()
        .await
        .map_err(|e| Error::Queue(format!("amqp channel failed: {e}")))
}

/// Declares the durable exchange/queue topology. Idempotent: safe to
/// call on every startup of both the gateway and the worker.
async fn declare_topology(channel: &Channel) -> Result<()> {
    channel
        .exchange_declare(
            DLX_EXCHANGE,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| Error::Queue(format!("failed to declare {DLX_EXCHANGE}: {e}")))?;

    channel
        .queue_declare(
            DLQ_QUEUE,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| Error::Queue(format!("failed to declare {DLQ_QUEUE}: {e}")))?;

    channel
        .queue_bind(
            DLQ_QUEUE,
            DLX_EXCHANGE,
            ROUTING_KEY,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| Error::Queue(format!("failed to bind {DLQ_QUEUE}: {e}")))?;

    let mut main_args = FieldTable::default();
    main_args.insert("x-dead-letter-exchange".into(), AMQPValue::LongString(DLX_EXCHANGE.into()));
    main_args.insert("x-dead-letter-routing-key".into(), AMQPValue::LongString(ROUTING_KEY.into()));
    main_args.insert("x-message-ttl".into(), AMQPValue::LongInt(MESSAGE_TTL_MS));

    channel
        .queue_declare(
            MAIN_QUEUE,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            main_args,
        )
        .await
        .map_err(|e| Error::Queue(format!("failed to declare {MAIN_QUEUE}: {e}")))?;

    Ok(())
}

fn retry_count(delivery: &Delivery) -> i64 {
    delivery
        .properties
        .headers()
        .as_ref()
        .and_then(|h| h.inner().get(RETRY_COUNT_HEADER))
        .and_then(|v| match v {
            AMQPValue::LongLongInt(n) => Some(*n),
            AMQPValue::LongInt(n) => Some(*n as i64),
            AMQPValue::ShortInt(n) => Some(*n as i64),
            _ => None,
        })
        .unwrap_or(0)
}

fn properties_with_retry_count(transaction_id: &str, retry_count: i64) -> BasicProperties {
    let mut headers = FieldTable::default();
    headers.insert(RETRY_COUNT_HEADER.into(), AMQPValue::LongLongInt(retry_count));
    BasicProperties::default()
        .with_delivery_mode(2)
        .with_message_id(transaction_id.to_string().into())
        .with_headers(headers)
}

pub struct RabbitPublisher {
    channel: Channel,
}

impl RabbitPublisher {
    pub async fn connect(amqp_url: &str) -> Result<Self> {
        let channel = connect(amqp_url).await?;
        declare_topology(&channel).await?;
        Ok(Self { channel })
    }
}

#[async_trait]
impl crate::Publisher for RabbitPublisher {
    async fn publish(&self, envelope: &PayoutEnvelope) -> Result<()> {
        let body = serde_json::to_vec(envelope).map_err(|e| Error::Queue(e.to_string()))?;
        let properties = properties_with_retry_count(envelope.transaction_id.as_str(), 0);

        let confirm = self
            .channel
            .basic_publish(
                "",
                MAIN_QUEUE,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await
            .map_err(|e| Error::Queue(format!("publish failed: {e}")))?;

        confirm
            .await
            .map_err(|e| Error::Queue(format!("publisher confirm failed: {e}")))?;
        Ok(())
    }
}

pub struct RabbitConsumer {
    channel: Channel,
    prefetch: u16,
    max_retries: u32,
    retry_delay_ms: u64,
}

impl RabbitConsumer {
    pub async fn connect(amqp_url: &str, prefetch: u16, max_retries: u32, retry_delay_ms: u64) -> Result<Self> {
        let channel = connect(amqp_url).await?;
        declare_topology(&channel).await?;
        channel
            .basic_qos(prefetch, Default::default())
            .await
            .map_err(|e| Error::Queue(format!("failed to set prefetch: {e}")))?;
        Ok(Self {
            channel,
            prefetch,
            max_retries,
            retry_delay_ms,
        })
    }

}

/// Applies the requeue policy: nack the current delivery without
/// requeue, then either republish with an incremented retry count or,
/// once `max_retries` is exhausted, let the dead-letter config carry it
/// to the DLQ (spec §4.7's "Requeue policy").
async fn requeue_or_dlq(
    channel: &Channel,
    delivery: &Delivery,
    envelope: &PayoutEnvelope,
    reason: &str,
    max_retries: u32,
    retry_delay_ms: u64,
) -> Result<()> {
    let attempt = retry_count(delivery) + 1;
    delivery
        .nack(BasicNackOptions {
            multiple: false,
            requeue: false,
        })
        .await
        .map_err(|e| Error::Queue(format!("nack failed: {e}")))?;

    if attempt as u32 >= max_retries {
        warn!(
            transaction_id = %envelope.transaction_id,
            reason,
            "settlement retries exhausted, message dead-lettered"
        );
        return Ok(());
    }

    tokio::time::sleep(Duration::from_millis(retry_delay_ms)).await;

    let body = serde_json::to_vec(envelope).map_err(|e| Error::Queue(e.to_string()))?;
    let properties = properties_with_retry_count(envelope.transaction_id.as_str(), attempt);
    channel
        .basic_publish("", MAIN_QUEUE, BasicPublishOptions::default(), &body, properties)
        .await
        .map_err(|e| Error::Queue(format!("requeue publish failed: {e}")))?
        .await
        .map_err(|e| Error::Queue(format!("requeue confirm failed: {e}")))?;

    info!(transaction_id = %envelope.transaction_id, attempt, reason, "settlement requeued");
    Ok(())
}

#[async_trait]
impl crate::Consumer for RabbitConsumer {
    async fn run<H, Fut>(&self, handler: H) -> Result<()>
    where
        H: Fn(PayoutEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let mut consumer = self
            .channel
            .basic_consume(
                MAIN_QUEUE,
                "payout-worker",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Queue(format!("failed to start consuming: {e}")))?;

        let handler = Arc::new(handler);
        let semaphore = Arc::new(Semaphore::new(self.prefetch as usize));
        let channel = self.channel.clone();
        let max_retries = self.max_retries;
        let retry_delay_ms = self.retry_delay_ms;

        while let Some(delivery) = consumer.next().await {
            let delivery = match delivery {
                Ok(d) => d,
                Err(e) => {
                    error!("consumer stream error: {e}");
                    break;
                }
            };

            let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
            let handler = handler.clone();
            let channel = channel.clone();

            tokio::spawn(async move {
                let _permit = permit;
                let envelope: PayoutEnvelope = match serde_json::from_slice(&delivery.data) {
                    Ok(env) => env,
                    Err(e) => {
                        error!("malformed settlement envelope, dead-lettering: {e}");
                        let _ = delivery
                            .nack(BasicNackOptions {
                                multiple: false,
                                requeue: false,
                            })
                            .await;
                        return;
                    }
                };

                let outcome = handler(envelope.clone()).await;
                match outcome {
                    Outcome::Ack => {
                        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                            error!(transaction_id = %envelope.transaction_id, "ack failed: {e}");
                        }
                    }
                    Outcome::Reject => {
                        if let Err(e) = delivery
                            .nack(BasicNackOptions {
                                multiple: false,
                                requeue: false,
                            })
                            .await
                        {
                            error!(transaction_id = %envelope.transaction_id, "reject nack failed: {e}");
                        }
                    }
                    Outcome::Retry(reason) => {
                        if let Err(e) =
                            requeue_or_dlq(&channel, &delivery, &envelope, &reason, max_retries, retry_delay_ms).await
                        {
                            error!(transaction_id = %envelope.transaction_id, "requeue failed: {e}");
                        }
                    }
                }
            });
        }

        Ok(())
    }
}
