//! In-memory fakes for `TransactionStore`/`UserStore`/`AuditLog`, for
//! protocol-level tests that don't need a live Postgres instance.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use payout_core::{
    AuditLogEntry, Error, Result, Transaction, TransactionId, TransactionStatus, User, UserId,
};
use rust_decimal::Decimal;

use crate::audit::AuditLog;
use crate::transactions::TransactionStore;
use crate::users::UserStore;

#[derive(Default)]
pub struct InMemoryTransactionStore {
    rows: Mutex<HashMap<TransactionId, Transaction>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, txn: &Transaction) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        rows.entry(txn.transaction_id.clone()).or_insert_with(|| txn.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        Ok(self.rows.lock().unwrap().get(id).cloned())
    }

    async fn get_by_user(
        &self,
        user_id: &UserId,
        status: Option<TransactionStatus>,
        limit: i64,
    ) -> Result<Vec<Transaction>> {
        let rows = self.rows.lock().unwrap();
        let mut matching: Vec<Transaction> = rows
            .values()
            .filter(|t| &t.user_id == user_id)
            .filter(|t| status.map(|s| t.status == s).unwrap_or(true))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit.max(0) as usize);
        Ok(matching)
    }

    async fn mark_processing(&self, id: &TransactionId) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let txn = rows.get_mut(id).ok_or(Error::TransactionNotFound)?;
        txn.mark_processing()
    }

    async fn mark_completed(&self, id: &TransactionId, balance_after: Decimal) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let txn = rows.get_mut(id).ok_or(Error::TransactionNotFound)?;
        txn.mark_completed(balance_after)
    }

    async fn mark_failed(&self, id: &TransactionId, code: &str, message: &str) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let txn = rows.get_mut(id).ok_or(Error::TransactionNotFound)?;
        txn.mark_failed(code, message.to_string())
    }
}

#[derive(Default)]
pub struct InMemoryUserStore {
    rows: Mutex<HashMap<UserId, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: &User) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        rows.entry(user.user_id.clone()).or_insert_with(|| user.clone());
        Ok(())
    }

    async fn get_by_id(&self, user_id: &UserId) -> Result<Option<User>> {
        Ok(self.rows.lock().unwrap().get(user_id).cloned())
    }

    async fn update_balance(&self, user_id: &UserId, new_balance: Decimal, payout_amount: Decimal) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let user = rows.get_mut(user_id).ok_or(Error::UserNotFound)?;
        user.balance = new_balance;
        user.total_payouts += 1;
        user.total_payout_amount += payout_amount;
        user.last_payout_at = Some(chrono::Utc::now());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAuditLog {
    pub entries: Mutex<Vec<AuditLogEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, entry: &AuditLogEntry) -> Result<()> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}
