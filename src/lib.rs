//! Matchmaking core: lobby orchestration, prize pool escrow, Glicko-2
//! ratings, an adaptive rate limiter, and the WebSocket fan-out hub that
//! ties them to connected clients.

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod orchestrator;
pub mod ports;
pub mod rate_limit;

pub use error::{CoreError, CoreResult};

use std::sync::Arc;

use config::Settings;
use engine::RatingEngine;
use hub::FanOutHub;
use orchestrator::LobbyOrchestrator;
use ports::demo::InMemoryPlayerRatingRepository;
use rate_limit::AdaptiveRateLimiter;

/// Shared application state handed to every Axum handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<LobbyOrchestrator>,
    pub hub: Arc<FanOutHub>,
    pub rating_engine: Arc<RatingEngine<InMemoryPlayerRatingRepository>>,
    pub rate_limiter: Arc<AdaptiveRateLimiter>,
    pub settings: Arc<Settings>,
}
