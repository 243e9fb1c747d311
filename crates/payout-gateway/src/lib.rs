//! Gateway: accepts intake HTTP requests and notifies sessions of
//! settlement status, per spec §4.6 and §4.8.

pub mod intake;
pub mod rate_limit;
pub mod routes;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use intake::{GatewayIntake, InitiatePayoutRequest, InitiatePayoutResponse};
pub use rate_limit::{RateLimiter, RedisRateLimiter};
pub use routes::{configure_routes, start_api_server, AppState};
