//! In-memory fakes wiring a full `GatewayIntake` for protocol-level
//! tests that exercise the six end-to-end scenarios without live
//! infrastructure.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use payout_core::Result;

use crate::rate_limit::RateLimiter;

#[derive(Default)]
pub struct InMemoryRateLimiter {
    windows: Mutex<HashMap<String, (u32, Instant)>>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: &str, window: Duration, max_requests: u32) -> Result<bool> {
        let mut windows = self.windows.lock().unwrap();
        let now = Instant::now();
        let entry = windows.entry(key.to_string()).or_insert((0, now));

        if now.duration_since(entry.1) > window {
            *entry = (0, now);
        }
        entry.0 += 1;
        Ok(entry.0 <= max_requests)
    }
}
