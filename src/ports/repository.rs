//! Repository ports (spec §6).
//!
//! These are narrow persistence seams: load/save/delete plus the handful of
//! queries the orchestrator and rating engine actually issue. The physical
//! data layout behind them is explicitly out of scope (spec §1 Non-goals);
//! this crate never assumes more than these methods.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{MatchmakingLobby, PlayerRating, PrizePool};
use crate::error::CoreResult;

#[async_trait]
pub trait LobbyRepository: Send + Sync {
    async fn save(&self, lobby: &MatchmakingLobby) -> CoreResult<()>;
    async fn load(&self, lobby_id: Uuid) -> CoreResult<Option<MatchmakingLobby>>;
    async fn delete(&self, lobby_id: Uuid) -> CoreResult<()>;
}

#[async_trait]
pub trait PrizePoolRepository: Send + Sync {
    async fn save(&self, pool: &PrizePool) -> CoreResult<()>;
    async fn load(&self, pool_id: Uuid) -> CoreResult<Option<PrizePool>>;
    async fn find_by_match_id(&self, match_id: Uuid) -> CoreResult<Option<PrizePool>>;
    async fn delete(&self, pool_id: Uuid) -> CoreResult<()>;
}

#[async_trait]
pub trait PlayerRatingRepository: Send + Sync {
    async fn save(&self, rating: &PlayerRating) -> CoreResult<()>;
    async fn find_by_player_and_game(
        &self,
        player_id: Uuid,
        game_id: &str,
    ) -> CoreResult<Option<PlayerRating>>;
    async fn get_top_players(&self, game_id: &str, limit: usize) -> CoreResult<Vec<PlayerRating>>;
}
