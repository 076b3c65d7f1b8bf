//! HTTP handlers
//!
//! Thin axum adapters over [`LedgerService`]. Errors leave as
//! `{"kind": "...", "error": "..."}` with a status derived from the
//! [`LedgerError`] variant.

pub mod admin_handler;
pub mod challenge_handler;
pub mod leaderboard_handler;
pub mod trade_handler;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::application::services::ledger_service::LedgerService;
use crate::auth::{require_api_key, ApiKeys};
use crate::domain::errors::{LedgerError, ValidationError};
use crate::rate_limit::{rate_limit_middleware, GlobalRateLimiter};

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: String,
    pub error: String,
}

/// A [`LedgerError`] on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub LedgerError);

impl From<LedgerError> for ApiError {
    fn from(error: LedgerError) -> Self {
        ApiError(error)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(ValidationError::InvalidRequest(rejection.body_text()).into())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
            LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
            LedgerError::ChallengeNotActive { .. } | LedgerError::TradeAlreadyClosed { .. } => {
                StatusCode::CONFLICT
            }
            LedgerError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::Forbidden(_) => StatusCode::FORBIDDEN,
            LedgerError::MarketDataUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            LedgerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match &self.0 {
            // Backend details stay in the logs.
            LedgerError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        (
            status,
            Json(ErrorResponse {
                kind: self.0.kind().to_string(),
                error,
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LedgerService>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Build the API router.
///
/// `/health` and `GET /leaderboard` are public; everything else requires a
/// bearer API key. All routes share the global rate limit.
pub fn router(state: AppState, api_keys: ApiKeys, limiter: GlobalRateLimiter) -> Router {
    let protected = Router::new()
        .route(
            "/challenges",
            post(challenge_handler::create_challenge).get(challenge_handler::list_challenges),
        )
        .route(
            "/challenges/:id",
            get(challenge_handler::get_challenge)
                .patch(challenge_handler::patch_challenge)
                .delete(challenge_handler::delete_challenge),
        )
        .route(
            "/challenges/:id/evaluate",
            post(challenge_handler::evaluate_challenge),
        )
        .route("/challenges/:id/trades", get(trade_handler::list_trades))
        .route("/trades", post(trade_handler::open_trade))
        .route("/trades/:id/close", post(trade_handler::close_trade))
        .route("/admin/challenges", get(admin_handler::list_all_challenges))
        .route(
            "/admin/challenges/:id/status",
            post(admin_handler::set_challenge_status),
        )
        .route("/admin/rollover", post(admin_handler::run_rollover))
        .layer(middleware::from_fn_with_state(api_keys, require_api_key));

    let public = Router::new()
        .route("/health", get(health_check))
        .route("/leaderboard", get(leaderboard_handler::get_leaderboard));

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
