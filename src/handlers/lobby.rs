//! HTTP handlers for the lobby/prize-pool saga (spec §4.4). Thin
//! translation layer: deserialize, call the orchestrator, serialize.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::amount::{Amount, Currency};
use crate::domain::distribution::DistributionRule;
use crate::domain::lobby::Tier;
use crate::error::CoreResult;
use crate::orchestrator::CreateLobbyParams;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateLobbyRequest {
    pub creator_id: Uuid,
    pub game_id: String,
    pub region: String,
    pub tier: Tier,
    pub distribution_rule: DistributionRule,
    pub max_players: usize,
    #[serde(default)]
    pub auto_fill: bool,
    #[serde(default)]
    pub invite_only: bool,
    pub currency: Currency,
    pub platform_contribution: f64,
    #[serde(default)]
    pub ready_timeout_secs: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LobbyResponse {
    pub lobby_id: Uuid,
    pub pool_id: Uuid,
}

pub async fn create_lobby(
    State(state): State<AppState>,
    Json(req): Json<CreateLobbyRequest>,
) -> CoreResult<impl IntoResponse> {
    let platform_contribution = Amount::from_major_units_f64(req.platform_contribution)?;
    let ready_timeout_secs = req.ready_timeout_secs.unwrap_or(state.settings.ready_check_timeout_secs);
    let (lobby, pool) = state
        .orchestrator
        .create_lobby(CreateLobbyParams {
            creator_id: req.creator_id,
            game_id: req.game_id,
            region: req.region,
            tier: req.tier,
            distribution_rule: req.distribution_rule,
            max_players: req.max_players,
            auto_fill: req.auto_fill,
            invite_only: req.invite_only,
            currency: req.currency,
            platform_contribution,
            ready_timeout_secs,
        })
        .await?;
    Ok(Json(LobbyResponse {
        lobby_id: lobby.id,
        pool_id: pool.id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct JoinLobbyRequest {
    pub player_id: Uuid,
    #[serde(default)]
    pub mmr: Option<f64>,
}

pub async fn join_lobby(
    State(state): State<AppState>,
    Path(lobby_id): Path<Uuid>,
    Json(req): Json<JoinLobbyRequest>,
) -> CoreResult<impl IntoResponse> {
    let (lobby, pool) = state.orchestrator.join_lobby(lobby_id, req.player_id, req.mmr).await?;
    Ok(Json(serde_json::json!({ "lobby": lobby, "prize_pool": pool })))
}

#[derive(Debug, Deserialize)]
pub struct PlayerIdRequest {
    pub player_id: Uuid,
}

pub async fn leave_lobby(
    State(state): State<AppState>,
    Path(lobby_id): Path<Uuid>,
    Json(req): Json<PlayerIdRequest>,
) -> CoreResult<impl IntoResponse> {
    let (lobby, pool) = state.orchestrator.leave_lobby(lobby_id, req.player_id).await?;
    Ok(Json(serde_json::json!({ "lobby": lobby, "prize_pool": pool })))
}

#[derive(Debug, Deserialize)]
pub struct SetReadyRequest {
    pub player_id: Uuid,
    pub ready: bool,
}

pub async fn set_player_ready(
    State(state): State<AppState>,
    Path(lobby_id): Path<Uuid>,
    Json(req): Json<SetReadyRequest>,
) -> CoreResult<impl IntoResponse> {
    let lobby = state
        .orchestrator
        .set_player_ready(lobby_id, req.player_id, req.ready)
        .await?;
    Ok(Json(lobby))
}

pub async fn start_ready_check(
    State(state): State<AppState>,
    Path(lobby_id): Path<Uuid>,
) -> CoreResult<impl IntoResponse> {
    let lobby = state.orchestrator.start_ready_check(lobby_id).await?;
    Ok(Json(lobby))
}

pub async fn start_match(
    State(state): State<AppState>,
    Path(lobby_id): Path<Uuid>,
) -> CoreResult<impl IntoResponse> {
    let (lobby, pool) = state.orchestrator.start_match(lobby_id).await?;
    Ok(Json(serde_json::json!({ "lobby": lobby, "prize_pool": pool })))
}

#[derive(Debug, Deserialize)]
pub struct CancelLobbyRequest {
    pub reason: String,
}

pub async fn cancel_lobby(
    State(state): State<AppState>,
    Path(lobby_id): Path<Uuid>,
    Json(req): Json<CancelLobbyRequest>,
) -> CoreResult<impl IntoResponse> {
    let (lobby, pool) = state.orchestrator.cancel_lobby(lobby_id, &req.reason).await?;
    Ok(Json(serde_json::json!({ "lobby": lobby, "prize_pool": pool })))
}

#[derive(Debug, Deserialize)]
pub struct EnterEscrowRequest {
    #[serde(default)]
    pub escrow_hours: Option<i64>,
}

/// Moves the lobby's prize pool into escrow once the match engine has
/// reported a result; falls back to the configured default window when the
/// caller doesn't override it.
pub async fn enter_escrow(
    State(state): State<AppState>,
    Path(lobby_id): Path<Uuid>,
    Json(req): Json<EnterEscrowRequest>,
) -> CoreResult<impl IntoResponse> {
    let escrow_hours = req.escrow_hours.unwrap_or(state.settings.escrow_hours);
    let pool = state.orchestrator.enter_escrow(lobby_id, escrow_hours).await?;
    Ok(Json(pool))
}

#[derive(Debug, Deserialize)]
pub struct DistributePrizePoolRequest {
    pub ranked_players: Vec<Uuid>,
    #[serde(default)]
    pub mvp: Option<Uuid>,
}

pub async fn distribute_prize_pool(
    State(state): State<AppState>,
    Path(lobby_id): Path<Uuid>,
    Json(req): Json<DistributePrizePoolRequest>,
) -> CoreResult<impl IntoResponse> {
    let pool = state
        .orchestrator
        .distribute_prize_pool(lobby_id, &req.ranked_players, req.mvp)
        .await?;
    Ok(Json(pool))
}
