//! In-memory broker fake. `InMemoryPublisher` records envelopes in a
//! shared queue that `InMemoryConsumer` drains, applying the same
//! retry-count/requeue policy as `RabbitConsumer` but without a real
//! broker connection.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use payout_core::Result;
use tokio::sync::Mutex;

use crate::{Consumer, Outcome, PayoutEnvelope, Publisher};

#[derive(Debug, Clone)]
struct Delivery {
    envelope: PayoutEnvelope,
    retry_count: u32,
}

#[derive(Clone)]
pub struct InMemoryBroker {
    queue: Arc<Mutex<VecDeque<Delivery>>>,
    pub dead_lettered: Arc<Mutex<Vec<PayoutEnvelope>>>,
    max_retries: u32,
    retry_delay_ms: u64,
}

impl InMemoryBroker {
    pub fn new(max_retries: u32, retry_delay_ms: u64) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            dead_lettered: Arc::new(Mutex::new(Vec::new())),
            max_retries,
            retry_delay_ms,
        }
    }

    pub fn publisher(&self) -> InMemoryPublisher {
        InMemoryPublisher { broker: self.clone() }
    }

    pub fn consumer(&self) -> InMemoryConsumer {
        InMemoryConsumer { broker: self.clone() }
    }

    pub async fn dead_letter_count(&self) -> usize {
        self.dead_lettered.lock().await.len()
    }
}

pub struct InMemoryPublisher {
    broker: InMemoryBroker,
}

#[async_trait]
impl Publisher for InMemoryPublisher {
    async fn publish(&self, envelope: &PayoutEnvelope) -> Result<()> {
        self.broker.queue.lock().await.push_back(Delivery {
            envelope: envelope.clone(),
            retry_count: 0,
        });
        Ok(())
    }
}

pub struct InMemoryConsumer {
    broker: InMemoryBroker,
}

#[async_trait]
impl Consumer for InMemoryConsumer {
    /// Drains the queue once, applying the handler to every delivery
    /// present at call time (including ones requeued mid-drain).
    /// Unlike the real broker this never blocks waiting for new work;
    /// tests call it in a loop or just once per scenario.
    async fn run<H, Fut>(&self, handler: H) -> Result<()>
    where
        H: Fn(PayoutEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        loop {
            let delivery = self.broker.queue.lock().await.pop_front();
            let Some(delivery) = delivery else {
                break;
            };

            match handler(delivery.envelope.clone()).await {
                Outcome::Ack => {}
                Outcome::Reject => {
                    self.broker.dead_lettered.lock().await.push(delivery.envelope);
                }
                Outcome::Retry(_reason) => {
                    let attempt = delivery.retry_count + 1;
                    if attempt >= self.broker.max_retries {
                        self.broker.dead_lettered.lock().await.push(delivery.envelope);
                    } else {
                        tokio::time::sleep(Duration::from_millis(self.broker.retry_delay_ms)).await;
                        self.broker.queue.lock().await.push_back(Delivery {
                            envelope: delivery.envelope,
                            retry_count: attempt,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
