//! Shared domain types for the instant payout pipeline: identifiers,
//! money/currency validation, the user and transaction records, the
//! audit log, the error taxonomy, and environment-driven configuration.
//!
//! Every other crate in this workspace depends on `payout-core` for
//! these types rather than redefining them at each boundary.

pub mod audit;
pub mod config;
pub mod error;
pub mod ids;
pub mod money;
pub mod transaction;
pub mod user;

pub use audit::{AuditAction, AuditLogEntry};
pub use config::PayoutConfig;
pub use error::{Error, ErrorKind, Result};
pub use ids::{TransactionId, UserId};
pub use money::{validate_amount, Currency};
pub use transaction::{RequestMetadata, Transaction, TransactionStatus, TransactionType};
pub use user::{User, UserStatus};
