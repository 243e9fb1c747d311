use std::time::Duration;

use actix_web::{web, HttpRequest, HttpResponse};
use payout_core::{Error, RequestMetadata, TransactionId, TransactionStatus, UserId};
use serde::Deserialize;

use super::{error_response, AppState};
use crate::intake::InitiatePayoutRequest;

fn rate_limited_response(window: Duration) -> HttpResponse {
    HttpResponse::TooManyRequests().json(serde_json::json!({
        "success": false,
        "error": "rate limit exceeded",
        "code": "RATE_LIMIT_EXCEEDED",
        "retry_after": window.as_secs(),
    }))
}

fn parse_status(raw: &str) -> Option<TransactionStatus> {
    match raw {
        "initiated" => Some(TransactionStatus::Initiated),
        "processing" => Some(TransactionStatus::Processing),
        "completed" => Some(TransactionStatus::Completed),
        "failed" => Some(TransactionStatus::Failed),
        "rolled_back" => Some(TransactionStatus::RolledBack),
        _ => None,
    }
}

pub async fn initiate_payout(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<InitiatePayoutRequest>,
) -> HttpResponse {
    let ip = req
        .peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let user_agent = req
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let global_key = format!("rl:{ip}");
    match state
        .rate_limiter
        .check(&global_key, state.config.rate_limit_window(), state.config.rate_limit_max_requests)
        .await
    {
        Ok(true) => {}
        Ok(false) => return rate_limited_response(state.config.rate_limit_window()),
        Err(e) => return error_response(&e),
    }

    let user_key = format!("rl:user:{}", body.user_id);
    match state
        .rate_limiter
        .check(&user_key, Duration::from_secs(60), state.config.user_rate_limit_max_requests)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            return HttpResponse::TooManyRequests().json(serde_json::json!({
                "success": false,
                "error": "user rate limit exceeded",
                "code": "USER_RATE_LIMIT_EXCEEDED",
                "retry_after": 60,
            }))
        }
        Err(e) => return error_response(&e),
    }

    let metadata = RequestMetadata {
        ip: Some(ip),
        user_agent,
        source: Some("http".to_string()),
        description: None,
    };

    match state.intake.initiate_payout(body.into_inner(), metadata).await {
        Ok(response) => HttpResponse::Accepted().json(response),
        Err(e) => error_response(&e),
    }
}

pub async fn get_transaction(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let transaction_id = TransactionId::from(path.into_inner());
    match state.intake.get_transaction(&transaction_id).await {
        Ok(transaction) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "transaction": transaction,
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn get_balance(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let user_id = UserId::new(path.into_inner());
    match state.intake.get_balance(&user_id).await {
        Ok((balance, currency)) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "user_id": user_id.as_str(),
            "balance": balance,
            "currency": currency.to_string(),
        })),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub status: Option<String>,
}

pub async fn get_history(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<HistoryQuery>,
) -> HttpResponse {
    let user_id = UserId::new(path.into_inner());
    let status = match query.status.as_deref().map(parse_status) {
        Some(Some(s)) => Some(s),
        Some(None) => return error_response(&Error::Validation("unknown status filter".into())),
        None => None,
    };
    let limit = query.limit.unwrap_or(50).clamp(1, 200);

    match state.intake.get_history(&user_id, status, limit).await {
        Ok(transactions) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "count": transactions.len(),
            "transactions": transactions,
        })),
        Err(e) => error_response(&e),
    }
}
