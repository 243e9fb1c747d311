mod health;
mod payout;

use crate::rate_limit::RateLimiter;
use crate::GatewayIntake;
use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpServer};
use payout_core::{PayoutConfig, Result};
use std::sync::Arc;
use std::time::Instant;

pub struct AppState {
    pub intake: Arc<GatewayIntake>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub config: PayoutConfig,
    pub start_time: Instant,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/payout", web::post().to(payout::initiate_payout))
            .route("/payout/user/{user_id}/balance", web::get().to(payout::get_balance))
            .route("/payout/user/{user_id}/history", web::get().to(payout::get_history))
            .route("/payout/{transaction_id}", web::get().to(payout::get_transaction))
            .route("/health", web::get().to(health::health))
            .route("/health/detailed", web::get().to(health::detailed))
            .route("/health/ready", web::get().to(health::ready))
            .route("/health/live", web::get().to(health::live)),
    );
}

pub(crate) fn error_response(e: &payout_core::Error) -> actix_web::HttpResponse {
    let status = actix_web::http::StatusCode::from_u16(e.http_status()).unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
    actix_web::HttpResponse::build(status).json(serde_json::json!({
        "success": false,
        "error": e.to_string(),
        "code": e.code(),
    }))
}

pub async fn start_api_server(state: Arc<AppState>) -> Result<()> {
    let bind_address = state.config.api_bind_address.clone();
    tracing::info!("starting gateway HTTP API on {}", bind_address);

    let app_data = web::Data::from(state);

    HttpServer::new(move || {
        let allowed_origin = app_data.config.allowed_origin.clone();
        let mut cors = Cors::default()
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![header::CONTENT_TYPE, header::AUTHORIZATION])
            .max_age(3600);

        match allowed_origin {
            Some(origin) => {
                tracing::info!(origin, "CORS restricted to configured origin");
                cors = cors.allowed_origin(&origin);
            }
            None => {
                tracing::warn!("ALLOWED_ORIGIN not set, falling back to allow_any_origin (dev mode)");
                cors = cors.allow_any_origin();
            }
        }

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(app_data.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)
    .map_err(|e| payout_core::Error::Internal(format!("failed to bind {bind_address}: {e}")))?
    .run()
    .await
    .map_err(|e| payout_core::Error::Internal(format!("HTTP server error: {e}")))
}
