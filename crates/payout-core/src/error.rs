//! Stable error taxonomy shared by every collaborator and protocol.
//!
//! Each variant corresponds to one row of the `code` table in the payout
//! pipeline specification. The HTTP layer (payout-gateway) maps these to
//! status codes; the worker maps them to ack/nack/requeue decisions.

use thiserror::Error;

/// Top-level error type returned by every payout-pipeline collaborator.
#[derive(Error, Debug)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("user is not active")]
    UserNotActive,

    #[error("user not found")]
    UserNotFound,

    #[error("transaction not found")]
    TransactionNotFound,

    #[error("concurrent request for this user")]
    ConcurrentRequest,

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("user rate limit exceeded")]
    UserRateLimitExceeded,

    #[error("queue error: {0}")]
    Queue(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("database error: {0}")]
    Database(String),

    /// A settlement observed `processing` on redelivery: not an error
    /// in the business sense, but callers branch on it explicitly.
    #[error("transaction already processing")]
    AlreadyProcessing,

    /// Cached balance was absent when the worker expected it present.
    /// Treated as retriable infrastructure failure (spec §4.7 step 4).
    #[error("balance not found in cache")]
    BalanceNotFound,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Classification used by HTTP and worker layers to decide status codes
/// and requeue behavior without matching on the `Error` variant twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    InsufficientBalance,
    UserNotActive,
    UserNotFound,
    TransactionNotFound,
    ConcurrentRequest,
    RateLimitExceeded,
    UserRateLimitExceeded,
    Queue,
    Cache,
    Database,
    AlreadyProcessing,
    BalanceNotFound,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::InsufficientBalance => ErrorKind::InsufficientBalance,
            Error::UserNotActive => ErrorKind::UserNotActive,
            Error::UserNotFound => ErrorKind::UserNotFound,
            Error::TransactionNotFound => ErrorKind::TransactionNotFound,
            Error::ConcurrentRequest => ErrorKind::ConcurrentRequest,
            Error::RateLimitExceeded => ErrorKind::RateLimitExceeded,
            Error::UserRateLimitExceeded => ErrorKind::UserRateLimitExceeded,
            Error::Queue(_) => ErrorKind::Queue,
            Error::Cache(_) => ErrorKind::Cache,
            Error::Database(_) => ErrorKind::Database,
            Error::AlreadyProcessing => ErrorKind::AlreadyProcessing,
            Error::BalanceNotFound => ErrorKind::BalanceNotFound,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable `code` string returned in the HTTP error envelope.
    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::InsufficientBalance => "INSUFFICIENT_BALANCE",
            ErrorKind::UserNotActive => "USER_NOT_ACTIVE",
            ErrorKind::UserNotFound => "USER_NOT_FOUND",
            ErrorKind::TransactionNotFound => "TRANSACTION_NOT_FOUND",
            ErrorKind::ConcurrentRequest => "CONCURRENT_REQUEST",
            ErrorKind::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorKind::UserRateLimitExceeded => "USER_RATE_LIMIT_EXCEEDED",
            ErrorKind::Queue => "QUEUE_ERROR",
            ErrorKind::Cache => "CACHE_ERROR",
            ErrorKind::Database => "DATABASE_ERROR",
            ErrorKind::AlreadyProcessing => "ALREADY_PROCESSING",
            ErrorKind::BalanceNotFound => "BALANCE_NOT_FOUND",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }

    /// HTTP status code for this error, per the taxonomy table.
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::InsufficientBalance => 400,
            ErrorKind::UserNotActive => 403,
            ErrorKind::UserNotFound | ErrorKind::TransactionNotFound => 404,
            ErrorKind::ConcurrentRequest | ErrorKind::AlreadyProcessing => 409,
            ErrorKind::RateLimitExceeded | ErrorKind::UserRateLimitExceeded => 429,
            ErrorKind::Queue | ErrorKind::Cache | ErrorKind::Database | ErrorKind::BalanceNotFound => 503,
            ErrorKind::Internal => 500,
        }
    }

    /// Whether the failure kind is worth retrying later (caller-dependent).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConcurrentRequest
                | ErrorKind::RateLimitExceeded
                | ErrorKind::UserRateLimitExceeded
                | ErrorKind::Queue
                | ErrorKind::Cache
                | ErrorKind::Database
                | ErrorKind::BalanceNotFound
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_matches_spec_table() {
        assert_eq!(Error::Validation("bad".into()).http_status(), 400);
        assert_eq!(Error::InsufficientBalance.http_status(), 400);
        assert_eq!(Error::UserNotActive.http_status(), 403);
        assert_eq!(Error::UserNotFound.http_status(), 404);
        assert_eq!(Error::TransactionNotFound.http_status(), 404);
        assert_eq!(Error::ConcurrentRequest.http_status(), 409);
        assert_eq!(Error::RateLimitExceeded.http_status(), 429);
        assert_eq!(Error::UserRateLimitExceeded.http_status(), 429);
        assert_eq!(Error::Queue("x".into()).http_status(), 503);
        assert_eq!(Error::Cache("x".into()).http_status(), 503);
        assert_eq!(Error::Database("x".into()).http_status(), 503);
        assert_eq!(Error::Internal("x".into()).http_status(), 500);
    }

    #[test]
    fn codes_are_stable_strings() {
        assert_eq!(Error::ConcurrentRequest.code(), "CONCURRENT_REQUEST");
        assert_eq!(Error::BalanceNotFound.code(), "BALANCE_NOT_FOUND");
    }

    #[test]
    fn retryability_matches_spec() {
        assert!(Error::ConcurrentRequest.is_retryable());
        assert!(Error::Cache("down".into()).is_retryable());
        assert!(!Error::InsufficientBalance.is_retryable());
        assert!(!Error::UserNotFound.is_retryable());
    }
}
