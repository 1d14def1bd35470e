//! Matchmaking core service entry point.
//!
//! Boots a demonstrator: in-memory repositories and wallet (see
//! `ports::demo`) wired behind the same ports a production deployment
//! would plug a real ledger and database into, a lobby orchestrator, a
//! Glicko-2 rating engine, the WebSocket fan-out hub, and the adaptive
//! rate limiter — then serves the HTTP/WebSocket API over Axum.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arena_matchmaking_core::config::Settings;
use arena_matchmaking_core::engine::RatingEngine;
use arena_matchmaking_core::handlers::{lobby, rate_limit_mw::enforce_rate_limit, rating, ws_handler};
use arena_matchmaking_core::hub::FanOutHub;
use arena_matchmaking_core::orchestrator::LobbyOrchestrator;
use arena_matchmaking_core::ports::demo::{
    DemoWallet, InMemoryLobbyRepository, InMemoryPlayerRatingRepository, InMemoryPrizePoolRepository,
};
use arena_matchmaking_core::rate_limit::AdaptiveRateLimiter;
use arena_matchmaking_core::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    arena_matchmaking_core::config::load_env();
    let settings = Settings::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.log_filter.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let hub = FanOutHub::spawn();
    let orchestrator = Arc::new(LobbyOrchestrator::new(
        Arc::new(InMemoryLobbyRepository::default()),
        Arc::new(InMemoryPrizePoolRepository::default()),
        Arc::new(DemoWallet),
        hub.clone(),
    ));
    let rating_engine = Arc::new(RatingEngine::new(InMemoryPlayerRatingRepository::default()));
    let rate_limiter = AdaptiveRateLimiter::new(chrono::Utc::now());

    spawn_ready_check_sweeper(orchestrator.clone(), settings.ready_check_sweep_interval_secs);
    spawn_rate_limit_cleanup(rate_limiter.clone(), settings.rate_limit_cleanup_interval_secs);

    let state = AppState {
        orchestrator,
        hub,
        rating_engine,
        rate_limiter,
        settings: Arc::new(settings.clone()),
    };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/lobbies", post(lobby::create_lobby))
        .route("/api/lobbies/{lobby_id}/join", post(lobby::join_lobby))
        .route("/api/lobbies/{lobby_id}/leave", post(lobby::leave_lobby))
        .route("/api/lobbies/{lobby_id}/ready", post(lobby::set_player_ready))
        .route("/api/lobbies/{lobby_id}/start-ready-check", post(lobby::start_ready_check))
        .route("/api/lobbies/{lobby_id}/start-match", post(lobby::start_match))
        .route("/api/lobbies/{lobby_id}/cancel", post(lobby::cancel_lobby))
        .route("/api/lobbies/{lobby_id}/enter-escrow", post(lobby::enter_escrow))
        .route("/api/lobbies/{lobby_id}/distribute", post(lobby::distribute_prize_pool))
        .route("/api/ratings/{game_id}/{player_id}", get(rating::get_rating))
        .route("/api/ratings/{game_id}/leaderboard", get(rating::leaderboard))
        .route("/api/ratings/{game_id}/rank-distribution", get(rating::rank_distribution))
        .route("/api/matches/report-result", post(rating::report_match_result))
        .route("/ws", get(ws_handler))
        .layer(middleware::from_fn_with_state(state.clone(), enforce_rate_limit))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;
    info!(addr = %settings.bind_addr, "matchmaking core listening");
    axum::serve(listener, app)
        .await
        .context("matchmaking core server exited")?;
    Ok(())
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok", "service": "arena-matchmaking-core" })))
}

fn spawn_ready_check_sweeper(orchestrator: Arc<LobbyOrchestrator>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            // A real deployment would page lobby ids with an open ready-check
            // from the repository; the demo adapter has no such index yet.
            let _ = orchestrator.sweep_expired_ready_checks(&[]).await;
        }
    });
}

fn spawn_rate_limit_cleanup(rate_limiter: Arc<AdaptiveRateLimiter>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            let purged = rate_limiter.sweep_idle_clients(chrono::Utc::now()).await;
            if purged > 0 {
                info!(purged, "rate limiter cleanup sweep");
            }
        }
    });
}
