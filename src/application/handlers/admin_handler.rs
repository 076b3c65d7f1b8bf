use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::{ApiResult, AppState};
use crate::application::services::ledger_service::AdminOverview;
use crate::auth::RequestContext;
use crate::domain::entities::challenge::{Challenge, StatusOverride};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusOverrideRequest {
    pub status: StatusOverride,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RolloverResponse {
    pub rolled: usize,
}

/// Every challenge with per-status counts
pub async fn list_all_challenges(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> ApiResult<AdminOverview> {
    Ok(Json(state.service.admin_overview(&ctx).await?))
}

/// Manually mark an active challenge passed or failed
pub async fn set_challenge_status(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
    payload: Result<Json<StatusOverrideRequest>, JsonRejection>,
) -> ApiResult<Challenge> {
    ctx.require_admin()?;
    let Json(request) = payload?;
    Ok(Json(
        state
            .service
            .admin_set_status(&ctx, &id, request.status)
            .await?,
    ))
}

/// Start a new trading day for all active challenges now
pub async fn run_rollover(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> ApiResult<RolloverResponse> {
    ctx.require_admin()?;
    let rolled = state.service.roll_daily_all().await?;
    Ok(Json(RolloverResponse { rolled }))
}
