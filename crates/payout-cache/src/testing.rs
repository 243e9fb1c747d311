//! In-memory `BalanceCache` fake. Deduct/add are guarded by a single
//! mutex so the atomicity the real Lua scripts provide is preserved for
//! tests exercising concurrent settlement.

use crate::{BalanceCache, DeductOutcome};
use async_trait::async_trait;
use payout_core::Result;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryBalanceCache {
    balances: Mutex<HashMap<String, Decimal>>,
}

impl InMemoryBalanceCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BalanceCache for InMemoryBalanceCache {
    async fn get(&self, user_id: &str) -> Result<Option<Decimal>> {
        Ok(self.balances.lock().unwrap().get(user_id).copied())
    }

    async fn set(&self, user_id: &str, value: Decimal) -> Result<()> {
        self.balances.lock().unwrap().insert(user_id.to_string(), value);
        Ok(())
    }

    async fn deduct(&self, user_id: &str, amount: Decimal) -> Result<DeductOutcome> {
        let mut balances = self.balances.lock().unwrap();
        let Some(balance) = balances.get(user_id).copied() else {
            return Ok(DeductOutcome::NotFound);
        };
        if balance < amount {
            return Ok(DeductOutcome::Insufficient);
        }
        let new_balance = balance - amount;
        balances.insert(user_id.to_string(), new_balance);
        Ok(DeductOutcome::Ok(new_balance))
    }

    async fn add(&self, user_id: &str, amount: Decimal) -> Result<DeductOutcome> {
        let mut balances = self.balances.lock().unwrap();
        let Some(balance) = balances.get(user_id).copied() else {
            return Ok(DeductOutcome::NotFound);
        };
        let new_balance = balance + amount;
        balances.insert(user_id.to_string(), new_balance);
        Ok(DeductOutcome::Ok(new_balance))
    }
}
