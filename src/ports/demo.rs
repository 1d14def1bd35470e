//! In-memory demo adapters for the ports this crate consumes (spec §6).
//!
//! These exist so `main.rs` can boot a runnable demonstrator without a real
//! payments integration or datastore; production deployments swap these for
//! adapters backed by an actual ledger and database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::domain::amount::{Amount, Currency};
use crate::domain::{MatchmakingLobby, PlayerRating, PrizePool};
use crate::error::CoreResult;
use crate::ports::repository::{LobbyRepository, PlayerRatingRepository, PrizePoolRepository};
use crate::ports::wallet::WalletCommand;

/// Logs every deduction/refund and always succeeds. No ledger, no balance
/// checks — a real implementation sits behind this trait (spec §6).
pub struct DemoWallet;

#[async_trait]
impl WalletCommand for DemoWallet {
    async fn deduct_entry_fee(&self, user: Uuid, currency: Currency, amount: Amount) -> CoreResult<()> {
        info!(%user, %currency, %amount, "demo wallet: deduct entry fee");
        Ok(())
    }

    async fn refund(&self, user: Uuid, currency: Currency, amount: Amount, reason: &str) -> CoreResult<()> {
        info!(%user, %currency, %amount, reason, "demo wallet: refund");
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryLobbyRepository {
    lobbies: Mutex<HashMap<Uuid, MatchmakingLobby>>,
}

#[async_trait]
impl LobbyRepository for InMemoryLobbyRepository {
    async fn save(&self, lobby: &MatchmakingLobby) -> CoreResult<()> {
        self.lobbies.lock().unwrap().insert(lobby.id, lobby.clone());
        Ok(())
    }

    async fn load(&self, lobby_id: Uuid) -> CoreResult<Option<MatchmakingLobby>> {
        Ok(self.lobbies.lock().unwrap().get(&lobby_id).cloned())
    }

    async fn delete(&self, lobby_id: Uuid) -> CoreResult<()> {
        self.lobbies.lock().unwrap().remove(&lobby_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPrizePoolRepository {
    pools: Mutex<HashMap<Uuid, PrizePool>>,
}

#[async_trait]
impl PrizePoolRepository for InMemoryPrizePoolRepository {
    async fn save(&self, pool: &PrizePool) -> CoreResult<()> {
        self.pools.lock().unwrap().insert(pool.id, pool.clone());
        Ok(())
    }

    async fn load(&self, pool_id: Uuid) -> CoreResult<Option<PrizePool>> {
        Ok(self.pools.lock().unwrap().get(&pool_id).cloned())
    }

    async fn find_by_match_id(&self, match_id: Uuid) -> CoreResult<Option<PrizePool>> {
        Ok(self
            .pools
            .lock()
            .unwrap()
            .values()
            .find(|pool| pool.match_id == match_id)
            .cloned())
    }

    async fn delete(&self, pool_id: Uuid) -> CoreResult<()> {
        self.pools.lock().unwrap().remove(&pool_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPlayerRatingRepository {
    ratings: Mutex<HashMap<(Uuid, String), PlayerRating>>,
}

#[async_trait]
impl PlayerRatingRepository for InMemoryPlayerRatingRepository {
    async fn save(&self, rating: &PlayerRating) -> CoreResult<()> {
        self.ratings
            .lock()
            .unwrap()
            .insert((rating.player_id, rating.game_id.clone()), rating.clone());
        Ok(())
    }

    async fn find_by_player_and_game(&self, player_id: Uuid, game_id: &str) -> CoreResult<Option<PlayerRating>> {
        Ok(self
            .ratings
            .lock()
            .unwrap()
            .get(&(player_id, game_id.to_string()))
            .cloned())
    }

    async fn get_top_players(&self, game_id: &str, limit: usize) -> CoreResult<Vec<PlayerRating>> {
        let ratings = self.ratings.lock().unwrap();
        let mut matching: Vec<PlayerRating> = ratings
            .values()
            .filter(|rating| rating.game_id == game_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.rating.partial_cmp(&a.rating).unwrap_or(std::cmp::Ordering::Equal));
        matching.truncate(limit);
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lobby_round_trips_through_save_and_load() {
        let repo = InMemoryLobbyRepository::default();
        let lobby = MatchmakingLobby::new(
            Uuid::new_v4(),
            "valorant",
            "na-east",
            crate::domain::lobby::Tier::Free,
            crate::domain::DistributionRule::WinnerTakesAll,
            2,
            false,
            false,
            crate::domain::lobby::DEFAULT_READY_TIMEOUT_SECS,
        )
        .unwrap();
        repo.save(&lobby).await.unwrap();
        let loaded = repo.load(lobby.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, lobby.id);
    }

    #[tokio::test]
    async fn top_players_are_sorted_descending_by_rating() {
        let repo = InMemoryPlayerRatingRepository::default();
        let mut low = PlayerRating::new(Uuid::new_v4(), "valorant");
        low.rating = 1000.0;
        let mut high = PlayerRating::new(Uuid::new_v4(), "valorant");
        high.rating = 2000.0;
        repo.save(&low).await.unwrap();
        repo.save(&high).await.unwrap();

        let top = repo.get_top_players("valorant", 10).await.unwrap();
        assert_eq!(top[0].player_id, high.player_id);
    }
}
