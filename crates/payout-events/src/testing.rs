//! In-memory `EventBridge` fake. Published envelopes are recorded for
//! assertions and immediately fanned out to any registered listener,
//! mirroring the synchronous-enough behavior tests need without a
//! live Redis pub/sub channel.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use async_trait::async_trait;
use payout_core::Result;

use crate::{EventBridge, EventEnvelope};

type Listener = Box<dyn Fn(EventEnvelope) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

#[derive(Default)]
pub struct InMemoryEventBridge {
    pub published: Mutex<Vec<EventEnvelope>>,
    listener: Mutex<Option<Listener>>,
}

impl InMemoryEventBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EventEnvelope> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventBridge for InMemoryEventBridge {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<()> {
        self.published.lock().unwrap().push(envelope.clone());
        let fut = self.listener.lock().unwrap().as_ref().map(|f| f(envelope.clone()));
        if let Some(fut) = fut {
            fut.await;
        }
        Ok(())
    }

    async fn subscribe<F, Fut>(&self, on_event: F) -> Result<()>
    where
        F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let boxed: Listener = Box::new(move |envelope| Box::pin(on_event(envelope)));
        *self.listener.lock().unwrap() = Some(boxed);
        Ok(())
    }
}
