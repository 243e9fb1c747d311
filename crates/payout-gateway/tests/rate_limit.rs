//! End-to-end scenario 6 (spec.md §8): per-user rate limiting on the
//! intake route, exercised through the real actix-web service rather
//! than by calling `GatewayIntake` directly.

use std::sync::Arc;
use std::time::Instant;

use actix_web::{test, web, App};
use payout_broker::testing::InMemoryBroker;
use payout_cache::testing::InMemoryBalanceCache;
use payout_core::{Currency, PayoutConfig, User, UserId, UserStatus};
use payout_events::testing::InMemoryEventBridge;
use payout_gateway::testing::InMemoryRateLimiter;
use payout_gateway::{configure_routes, AppState, GatewayIntake};
use payout_lock::testing::InMemoryLock;
use payout_store::testing::{InMemoryAuditLog, InMemoryTransactionStore, InMemoryUserStore};
use payout_store::UserStore;
use rust_decimal_macros::dec;
use serde_json::json;

async fn app_state() -> Arc<AppState> {
    let user_store = Arc::new(InMemoryUserStore::new());
    user_store
        .insert(&User {
            user_id: UserId::new("user_001"),
            display_name: "Test User".to_string(),
            balance: dec!(100000.00),
            currency: Currency::Usd,
            status: UserStatus::Active,
            total_payouts: 0,
            total_payout_amount: rust_decimal::Decimal::ZERO,
            last_payout_at: None,
        })
        .await
        .unwrap();

    let broker = InMemoryBroker::new(3, 0);
    let intake = Arc::new(GatewayIntake::new(
        Arc::new(InMemoryLock::new()),
        Arc::new(InMemoryBalanceCache::new()),
        Arc::new(InMemoryTransactionStore::new()),
        user_store,
        Arc::new(InMemoryAuditLog::new()),
        Arc::new(broker.publisher()),
        Arc::new(InMemoryEventBridge::new()),
        PayoutConfig::default(),
    ));

    Arc::new(AppState {
        intake,
        rate_limiter: Arc::new(InMemoryRateLimiter::new()),
        config: PayoutConfig::default(),
        start_time: Instant::now(),
    })
}

#[actix_web::test]
async fn eleventh_rapid_request_is_user_rate_limited() {
    // Given: the default config admits 10 payout requests per user per
    // 60-second window (spec §8 scenario 6).
    let state = app_state().await;
    let app_data = web::Data::from(state);
    let app = test::init_service(
        App::new().app_data(app_data.clone()).configure(configure_routes),
    )
    .await;

    let body = json!({
        "user_id": "user_001",
        "amount": "10.00",
        "currency": "USD",
    });

    // When: ten requests fire in quick succession, they are all admitted
    // (a few may separately fail on a re-used lock/idempotency path, but
    // none should be rate-limited).
    for _ in 0..10 {
        let req = test::TestRequest::post().uri("/api/payout").set_json(&body).to_request();
        let resp = test::call_service(&app, req).await;
        assert_ne!(resp.status(), 429, "request within the window was rate-limited early");
    }

    // Then: the 11th request in the same window is rejected with 429 and
    // the USER_RATE_LIMIT_EXCEEDED code.
    let req = test::TestRequest::post().uri("/api/payout").set_json(&body).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 429);

    let payload: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(payload["code"], "USER_RATE_LIMIT_EXCEEDED");
    assert_eq!(payload["success"], false);
}

#[actix_web::test]
async fn requests_for_other_users_are_unaffected() {
    // Given: user_001 has already been rate-limited.
    let state = app_state().await;
    let app_data = web::Data::from(state);
    let app = test::init_service(
        App::new().app_data(app_data.clone()).configure(configure_routes),
    )
    .await;

    for _ in 0..11 {
        let body = json!({"user_id": "user_001", "amount": "10.00", "currency": "USD"});
        let req = test::TestRequest::post().uri("/api/payout").set_json(&body).to_request();
        test::call_service(&app, req).await;
    }

    // When: a different user (not seeded, so it fails validation downstream)
    // makes its first request in the same window.
    let body = json!({"user_id": "user_002", "amount": "10.00", "currency": "USD"});
    let req = test::TestRequest::post().uri("/api/payout").set_json(&body).to_request();
    let resp = test::call_service(&app, req).await;

    // Then: it is not rejected by the rate limiter (the per-user bucket is
    // keyed independently), even though it may fail for an unrelated
    // reason (e.g. UserNotFound).
    assert_ne!(resp.status(), 429);
}
