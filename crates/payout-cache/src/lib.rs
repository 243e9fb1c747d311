//! Authoritative pending balance with atomic compare-deduct/compare-
//! credit operations (spec §4.2). The cached value, not the primary
//! store, is the source of truth for admission decisions.

mod redis_cache;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use redis_cache::RedisBalanceCache;

use async_trait::async_trait;
use payout_core::{Error, Result};
use rust_decimal::Decimal;

/// Outcome of an atomic `deduct`/`add` script invocation. Callers must
/// branch on this rather than on a prior `has_sufficient` check; it is
/// the only source of truth (spec §4.2 invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeductOutcome {
    Ok(Decimal),
    NotFound,
    Insufficient,
}

#[async_trait]
pub trait BalanceCache: Send + Sync {
    /// Reads the cached balance, or `None` on a cold miss.
    async fn get(&self, user_id: &str) -> Result<Option<Decimal>>;

    /// Unconditional seed, used only to rehydrate a cold cache from the
    /// durable user balance.
    async fn set(&self, user_id: &str, value: Decimal) -> Result<()>;

    /// Atomic compare-and-deduct. Never yields a negative balance.
    async fn deduct(&self, user_id: &str, amount: Decimal) -> Result<DeductOutcome>;

    /// Atomic credit, used for rollback. `NotFound` if absent.
    async fn add(&self, user_id: &str, amount: Decimal) -> Result<DeductOutcome>;

    /// Advisory, non-atomic pre-check; never a substitute for `deduct`.
    async fn has_sufficient(&self, user_id: &str, amount: Decimal) -> Result<bool> {
        match self.get(user_id).await? {
            Some(balance) => Ok(balance >= amount),
            None => Err(Error::BalanceNotFound),
        }
    }
}
