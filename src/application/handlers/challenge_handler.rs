use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};

use super::{ApiError, ApiResult, AppState};
use crate::application::services::ledger_service::CreateChallengeRequest;
use crate::auth::RequestContext;
use crate::domain::entities::challenge::{Challenge, ChallengePatch};
use crate::domain::services::ledger::EvaluationOutcome;

/// Start a new challenge on the requested plan
pub async fn create_challenge(
    State(state): State<AppState>,
    ctx: RequestContext,
    payload: Result<Json<CreateChallengeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Challenge>), ApiError> {
    let Json(request) = payload?;
    let challenge = state.service.create_challenge(&ctx, request).await?;
    Ok((StatusCode::CREATED, Json(challenge)))
}

/// The caller's challenges, newest first
pub async fn list_challenges(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> ApiResult<Vec<Challenge>> {
    Ok(Json(state.service.list_challenges(&ctx).await?))
}

pub async fn get_challenge(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<Challenge> {
    Ok(Json(state.service.get_challenge(&ctx, &id).await?))
}

/// Update user-editable fields; unknown or ledger-owned fields are rejected
pub async fn patch_challenge(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
    payload: Result<Json<ChallengePatch>, JsonRejection>,
) -> ApiResult<Challenge> {
    let Json(patch) = payload?;
    Ok(Json(state.service.patch_challenge(&ctx, &id, patch).await?))
}

pub async fn delete_challenge(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_challenge(&ctx, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn evaluate_challenge(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<EvaluationOutcome> {
    Ok(Json(state.service.evaluate_challenge(&ctx, &id).await?))
}
