//! In-memory `Lock` fake for protocol-level tests that don't want a live
//! Redis, per SPEC_FULL.md's "Test tooling" section.

use crate::{generate_token, Lock, Token};
use async_trait::async_trait;
use payout_core::Result;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    token: Token,
    expires_at: Instant,
}

#[derive(Default)]
pub struct InMemoryLock {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(entry: &Entry) -> bool {
        Instant::now() < entry.expires_at
    }
}

#[async_trait]
impl Lock for InMemoryLock {
    async fn acquire(&self, resource: &str, ttl: Duration) -> Result<Option<Token>> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(existing) = entries.get(resource) {
            if Self::is_live(existing) {
                return Ok(None);
            }
        }
        let token = generate_token();
        entries.insert(
            resource.to_string(),
            Entry {
                token: token.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(Some(token))
    }

    async fn release(&self, resource: &str, token: &str) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        let matches = entries
            .get(resource)
            .map(|e| e.token == token)
            .unwrap_or(false);
        if matches {
            entries.remove(resource);
        }
        Ok(matches)
    }

    async fn extend(&self, resource: &str, token: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(resource) {
            if entry.token == token {
                entry.expires_at = Instant::now() + ttl;
                return Ok(true);
            }
        }
        Ok(false)
    }
}
