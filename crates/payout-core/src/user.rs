//! User account: primary-store record consulted by the Gateway and
//! mutated only by Worker Settlement (spec §3).

use crate::ids::UserId;
use crate::money::Currency;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Suspended,
    Closed,
}

impl UserStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, UserStatus::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub display_name: String,
    /// Authoritative, durable balance. Invariant: always >= 0.
    pub balance: Decimal,
    pub currency: Currency,
    pub status: UserStatus,
    pub total_payouts: u64,
    pub total_payout_amount: Decimal,
    pub last_payout_at: Option<DateTime<Utc>>,
}

impl User {
    /// Returns an error-free check for whether this user can be the
    /// target of a new payout admission (does not check balance).
    pub fn is_eligible_for_payout(&self) -> bool {
        self.status.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_user() -> User {
        User {
            user_id: UserId::new("user_001"),
            display_name: "Test User".into(),
            balance: dec!(10000.00),
            currency: Currency::Usd,
            status: UserStatus::Active,
            total_payouts: 0,
            total_payout_amount: dec!(0),
            last_payout_at: None,
        }
    }

    #[test]
    fn active_user_is_eligible() {
        assert!(sample_user().is_eligible_for_payout());
    }

    #[test]
    fn suspended_user_is_not_eligible() {
        let mut u = sample_user();
        u.status = UserStatus::Suspended;
        assert!(!u.is_eligible_for_payout());
    }
}
