//! HTTP handlers for the Glicko-2 rating engine's read surface (spec §4.3).

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::CoreResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn get_rating(
    State(state): State<AppState>,
    Path((game_id, player_id)): Path<(String, Uuid)>,
) -> CoreResult<impl IntoResponse> {
    let rating = state.rating_engine.get_rating(player_id, &game_id, Utc::now()).await?;
    Ok(Json(rating))
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    Query(query): Query<LeaderboardQuery>,
) -> CoreResult<impl IntoResponse> {
    let board = state.rating_engine.leaderboard(&game_id, query.limit).await?;
    Ok(Json(board))
}

pub async fn rank_distribution(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> CoreResult<impl IntoResponse> {
    let histogram = state.rating_engine.rank_distribution(&game_id).await?;
    let by_name: std::collections::HashMap<String, usize> =
        histogram.into_iter().map(|(tier, count)| (format!("{tier:?}"), count)).collect();
    Ok(Json(by_name))
}

#[derive(Debug, Deserialize)]
pub struct ReportMatchResultRequest {
    pub match_id: Uuid,
    pub game_id: String,
    pub winners: Vec<Uuid>,
    pub losers: Vec<Uuid>,
}

/// Reports a completed match's outcome and applies the Glicko-2 update to
/// every participant (spec §4.3). Distinct from the lobby saga: a lobby can
/// finish its match without this ever running a rated game, and conversely
/// this can rate matches that never went through a lobby at all.
pub async fn report_match_result(
    State(state): State<AppState>,
    Json(req): Json<ReportMatchResultRequest>,
) -> CoreResult<impl IntoResponse> {
    let updated = state
        .rating_engine
        .update_ratings_after_match(req.match_id, &req.game_id, &req.winners, &req.losers)
        .await?;
    Ok(Json(updated))
}
