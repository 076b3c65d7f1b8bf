use axum::{extract::State, Json};

use super::{ApiResult, AppState};
use crate::domain::services::leaderboard::LeaderboardEntry;

/// Top passed challenges, best total P&L percentage first
pub async fn get_leaderboard(State(state): State<AppState>) -> ApiResult<Vec<LeaderboardEntry>> {
    Ok(Json(state.service.leaderboard().await?))
}
