//! Lobby orchestrator (spec §4.4): the only component allowed to mutate a
//! lobby and its prize pool in the same logical step, and the only one
//! that calls the wallet.
//!
//! Open question resolved here (see DESIGN.md): a prize pool's
//! `match_id` field is seeded to the owning lobby's id at `create_lobby`
//! time, since no real match id exists until `start_match`. `find_by_match_id`
//! is keyed on that same value for the lobby's whole lifetime, giving the
//! 1:1 lobby/pool pairing spec §3 describes without a separate join table.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, warn};
use uuid::Uuid;

use crate::domain::amount::{Amount, Currency};
use crate::domain::distribution::DistributionRule;
use crate::domain::lobby::{MatchmakingLobby, Tier};
use crate::domain::prize_pool::PrizePool;
use crate::error::{CoreError, CoreResult};
use crate::hub::{Envelope, EventType, FanOutHub, Topic};
use crate::ports::{LobbyRepository, PrizePoolRepository, WalletCommand};

#[derive(Debug, Clone)]
pub struct CreateLobbyParams {
    pub creator_id: Uuid,
    pub game_id: String,
    pub region: String,
    pub tier: Tier,
    pub distribution_rule: DistributionRule,
    pub max_players: usize,
    pub auto_fill: bool,
    pub invite_only: bool,
    pub currency: Currency,
    pub platform_contribution: Amount,
    pub ready_timeout_secs: i64,
}

pub struct LobbyOrchestrator {
    lobby_repo: Arc<dyn LobbyRepository>,
    pool_repo: Arc<dyn PrizePoolRepository>,
    wallet: Arc<dyn WalletCommand>,
    hub: Arc<FanOutHub>,
    lobby_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl LobbyOrchestrator {
    pub fn new(
        lobby_repo: Arc<dyn LobbyRepository>,
        pool_repo: Arc<dyn PrizePoolRepository>,
        wallet: Arc<dyn WalletCommand>,
        hub: Arc<FanOutHub>,
    ) -> Self {
        LobbyOrchestrator {
            lobby_repo,
            pool_repo,
            wallet,
            hub,
            lobby_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, lobby_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.lobby_locks.lock().await;
        locks.entry(lobby_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    async fn broadcast_lobby(&self, lobby: &MatchmakingLobby, event_type: EventType) {
        let payload = json!({ "lobby": lobby });
        let envelope = Envelope::new(event_type, Some(lobby.id), None, payload, Utc::now().timestamp());
        self.hub.broadcast(Topic::Lobby(lobby.id), envelope).await;
    }

    async fn broadcast_pool(&self, pool: &PrizePool) {
        let payload = json!({ "prize_pool": pool });
        let envelope = Envelope::new(
            EventType::PrizePoolUpdate,
            None,
            Some(pool.id),
            payload,
            Utc::now().timestamp(),
        );
        self.hub.broadcast(Topic::Lobby(pool.match_id), envelope).await;
    }

    /// Constructs the lobby and its seeded prize pool, persisting both. The
    /// creator occupies slot 0 on creation, so their own entry fee is
    /// deducted and contributed here too (spec.md's worked example: pool
    /// total after one join = platform + creator's fee + joiner's fee).
    /// Compensates a pool-persist failure by deleting the lobby and
    /// refunding the creator (spec §4.4).
    pub async fn create_lobby(&self, params: CreateLobbyParams) -> CoreResult<(MatchmakingLobby, PrizePool)> {
        let lobby = MatchmakingLobby::new(
            params.creator_id,
            params.game_id.clone(),
            params.region.clone(),
            params.tier,
            params.distribution_rule.clone(),
            params.max_players,
            params.auto_fill,
            params.invite_only,
            params.ready_timeout_secs,
        )?;
        let _guard = self.lock_for(lobby.id).await.lock_owned().await;

        let entry_fee = Amount::from_major_units_f64(params.tier.entry_fee_major_units())?;
        if entry_fee.is_positive() {
            self.wallet.deduct_entry_fee(params.creator_id, params.currency, entry_fee).await?;
        }

        if let Err(err) = self.lobby_repo.save(&lobby).await {
            self.compensate_refund(params.creator_id, params.currency, entry_fee, "create_lobby: lobby persist failed")
                .await;
            return Err(err);
        }

        let mut pool = PrizePool::new(
            lobby.id,
            params.game_id,
            params.region,
            params.currency,
            params.platform_contribution,
            params.distribution_rule,
        );

        if entry_fee.is_positive() {
            if let Err(err) = pool.add_player_contribution(params.creator_id, entry_fee) {
                self.compensate_refund(params.creator_id, params.currency, entry_fee, "create_lobby: add_contribution failed")
                    .await;
                if let Err(delete_err) = self.lobby_repo.delete(lobby.id).await {
                    error!(lobby_id = %lobby.id, error = %delete_err, "compensation delete also failed");
                }
                return Err(err);
            }
        }

        if let Err(err) = self.pool_repo.save(&pool).await {
            warn!(lobby_id = %lobby.id, error = %err, "pool persist failed, compensating by deleting lobby");
            self.compensate_refund(params.creator_id, params.currency, entry_fee, "create_lobby: pool persist failed")
                .await;
            if let Err(delete_err) = self.lobby_repo.delete(lobby.id).await {
                error!(lobby_id = %lobby.id, error = %delete_err, "compensation delete also failed");
            }
            return Err(err);
        }

        self.broadcast_lobby(&lobby, EventType::LobbyUpdate).await;
        Ok((lobby, pool))
    }

    async fn load_lobby_and_pool(&self, lobby_id: Uuid) -> CoreResult<(MatchmakingLobby, PrizePool)> {
        let lobby = self
            .lobby_repo
            .load(lobby_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("lobby {lobby_id} not found")))?;
        let pool = self
            .pool_repo
            .find_by_match_id(lobby_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("prize pool for lobby {lobby_id} not found")))?;
        Ok((lobby, pool))
    }

    /// Runs the seven-step join saga from spec §4.4's compensation table.
    pub async fn join_lobby(&self, lobby_id: Uuid, player_id: Uuid, mmr: Option<f64>) -> CoreResult<(MatchmakingLobby, PrizePool)> {
        let _guard = self.lock_for(lobby_id).await.lock_owned().await;

        // Step 1: load lobby and pool.
        let (mut lobby, mut pool) = self.load_lobby_and_pool(lobby_id).await?;

        // Step 2: compute entry fee from tier.
        let entry_fee = Amount::from_major_units_f64(lobby.tier.entry_fee_major_units())?;

        // Step 3: deduct entry fee.
        if entry_fee.is_positive() {
            self.wallet.deduct_entry_fee(player_id, pool.currency, entry_fee).await?;
        }

        // Step 4: add player to lobby.
        let add_result = lobby.add_player(player_id, mmr);
        if let Err(err) = add_result {
            self.compensate_refund(player_id, pool.currency, entry_fee, "join_lobby: add_player failed").await;
            return Err(err);
        }

        // Step 5: add contribution to prize pool.
        if entry_fee.is_positive() {
            if let Err(err) = pool.add_player_contribution(player_id, entry_fee) {
                if let Err(remove_err) = lobby.remove_player(player_id) {
                    error!(lobby_id = %lobby_id, error = %remove_err, "compensation remove_player failed");
                } else if let Err(persist_err) = self.lobby_repo.save(&lobby).await {
                    error!(lobby_id = %lobby_id, error = %persist_err, "compensation persist failed");
                }
                self.compensate_refund(player_id, pool.currency, entry_fee, "join_lobby: add_contribution failed").await;
                return Err(err);
            }
        }

        // Step 6: persist lobby then pool.
        self.lobby_repo.save(&lobby).await?;
        if let Err(err) = self.pool_repo.save(&pool).await {
            error!(
                lobby_id = %lobby_id,
                pool_id = %pool.id,
                error = %err,
                "CRITICAL: lobby persisted but pool persist failed — manual reconciliation required"
            );
            return Err(err);
        }

        // Step 7: broadcast.
        self.broadcast_lobby(&lobby, EventType::PlayerJoined).await;
        self.broadcast_pool(&pool).await;

        Ok((lobby, pool))
    }

    async fn compensate_refund(&self, player_id: Uuid, currency: Currency, amount: Amount, reason: &str) {
        if let Err(err) = self.wallet.refund(player_id, currency, amount, reason).await {
            error!(%player_id, error = %err, reason, "compensation refund failed");
        }
    }

    /// Computes the player's current contribution, removes them, refunds,
    /// persists, and broadcasts. A creator leave cascades through
    /// `MatchmakingLobby::remove_player` into full cancellation (spec §4.4).
    pub async fn leave_lobby(&self, lobby_id: Uuid, player_id: Uuid) -> CoreResult<(MatchmakingLobby, PrizePool)> {
        let _guard = self.lock_for(lobby_id).await.lock_owned().await;
        let (mut lobby, pool) = self.load_lobby_and_pool(lobby_id).await?;

        let contribution = pool.player_contribution(player_id);
        lobby.remove_player(player_id)?;

        if lobby.status == crate::domain::LobbyStatus::Cancelled {
            self.lobby_repo.save(&lobby).await?;
            let mut pool = pool;
            let cancelled_pool = self.cancel_pool_and_refund_all(&mut pool, "creator left lobby").await?;
            self.broadcast_lobby(&lobby, EventType::PlayerLeft).await;
            self.broadcast_pool(&cancelled_pool).await;
            return Ok((lobby, cancelled_pool));
        }

        if contribution.is_positive() {
            self.compensate_refund(player_id, pool.currency, contribution, "leave_lobby refund").await;
        }
        self.lobby_repo.save(&lobby).await?;
        self.broadcast_lobby(&lobby, EventType::PlayerLeft).await;
        Ok((lobby, pool))
    }

    pub async fn set_player_ready(&self, lobby_id: Uuid, player_id: Uuid, ready: bool) -> CoreResult<MatchmakingLobby> {
        let _guard = self.lock_for(lobby_id).await.lock_owned().await;
        let mut lobby = self
            .lobby_repo
            .load(lobby_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("lobby {lobby_id} not found")))?;
        lobby.set_player_ready(player_id, ready)?;
        self.lobby_repo.save(&lobby).await?;
        self.broadcast_lobby(&lobby, EventType::ReadyStatusChanged).await;
        Ok(lobby)
    }

    pub async fn start_ready_check(&self, lobby_id: Uuid) -> CoreResult<MatchmakingLobby> {
        let _guard = self.lock_for(lobby_id).await.lock_owned().await;
        let mut lobby = self
            .lobby_repo
            .load(lobby_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("lobby {lobby_id} not found")))?;
        lobby.start_ready_check()?;
        self.lobby_repo.save(&lobby).await?;
        self.broadcast_lobby(&lobby, EventType::LobbyUpdate).await;
        Ok(lobby)
    }

    /// Generates a match id, advances the lobby to `starting` and locks
    /// the pool, persists both, then advances to `started` and persists
    /// again before broadcasting `match_starting` (spec §4.4's two-step
    /// transition, preserved so an external match-engine ack has a window).
    pub async fn start_match(&self, lobby_id: Uuid) -> CoreResult<(MatchmakingLobby, PrizePool)> {
        let _guard = self.lock_for(lobby_id).await.lock_owned().await;
        let (mut lobby, mut pool) = self.load_lobby_and_pool(lobby_id).await?;

        let match_id = Uuid::new_v4();
        lobby.start_match(match_id)?;
        pool.lock()?;
        self.lobby_repo.save(&lobby).await?;
        self.pool_repo.save(&pool).await?;

        lobby.mark_match_started()?;
        self.lobby_repo.save(&lobby).await?;

        self.broadcast_lobby(&lobby, EventType::MatchStarting).await;
        Ok((lobby, pool))
    }

    /// Cancels the lobby and its pool, refunding every contributor.
    /// Refund failures are logged but never block subsequent refunds or
    /// the terminal state write (spec §4.4).
    pub async fn cancel_lobby(&self, lobby_id: Uuid, reason: &str) -> CoreResult<(MatchmakingLobby, PrizePool)> {
        let _guard = self.lock_for(lobby_id).await.lock_owned().await;
        let (mut lobby, mut pool) = self.load_lobby_and_pool(lobby_id).await?;

        lobby.cancel(reason)?;
        self.lobby_repo.save(&lobby).await?;
        let cancelled_pool = self.cancel_pool_and_refund_all(&mut pool, reason).await?;

        self.broadcast_lobby(&lobby, EventType::LobbyUpdate).await;
        self.broadcast_pool(&cancelled_pool).await;
        Ok((lobby, cancelled_pool))
    }

    async fn cancel_pool_and_refund_all(&self, pool: &mut PrizePool, reason: &str) -> CoreResult<PrizePool> {
        pool.cancel(reason)?;
        for (&player_id, &amount) in pool.player_contributions.clone().iter() {
            if amount.is_positive() {
                self.compensate_refund(player_id, pool.currency, amount, reason).await;
            }
        }
        self.pool_repo.save(pool).await?;
        Ok(pool.clone())
    }

    /// Moves a locked pool into escrow once the match engine reports the
    /// match has ended (spec §4.2 `EnterEscrow`). Single-aggregate: only
    /// the pool changes, so no lobby mutation or compensation applies.
    pub async fn enter_escrow(&self, lobby_id: Uuid, escrow_hours: i64) -> CoreResult<PrizePool> {
        let _guard = self.lock_for(lobby_id).await.lock_owned().await;
        let mut pool = self
            .pool_repo
            .find_by_match_id(lobby_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("prize pool for lobby {lobby_id} not found")))?;
        pool.enter_escrow(escrow_hours)?;
        self.pool_repo.save(&pool).await?;
        self.broadcast_pool(&pool).await;
        Ok(pool)
    }

    /// Calculates and applies the final distribution once the escrow
    /// window has closed (spec §4.2 `CalculateDistribution` + `Distribute`).
    pub async fn distribute_prize_pool(
        &self,
        lobby_id: Uuid,
        ranked_players: &[Uuid],
        mvp: Option<Uuid>,
    ) -> CoreResult<PrizePool> {
        let _guard = self.lock_for(lobby_id).await.lock_owned().await;
        let mut pool = self
            .pool_repo
            .find_by_match_id(lobby_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("prize pool for lobby {lobby_id} not found")))?;
        let distribution = pool.calculate_distribution(ranked_players, mvp)?;
        pool.distribute(&distribution, Utc::now())?;
        self.pool_repo.save(&pool).await?;
        self.broadcast_pool(&pool).await;
        Ok(pool)
    }

    /// Periodic sweep (spec §5): reclassifies expired ready-checks on wall
    /// clock rather than a timer thread. Callers run this on an interval.
    pub async fn sweep_expired_ready_checks(&self, lobby_ids: &[Uuid]) -> CoreResult<usize> {
        let mut swept = 0;
        let now = Utc::now();
        for &lobby_id in lobby_ids {
            let _guard = self.lock_for(lobby_id).await.lock_owned().await;
            let Some(mut lobby) = self.lobby_repo.load(lobby_id).await? else {
                continue;
            };
            if lobby.sweep_ready_check_timeout(now) {
                self.lobby_repo.save(&lobby).await?;
                self.broadcast_lobby(&lobby, EventType::LobbyUpdate).await;
                if let Some(mut pool) = self.pool_repo.find_by_match_id(lobby_id).await? {
                    let cancelled = self
                        .cancel_pool_and_refund_all(&mut pool, "ready check timed out")
                        .await?;
                    self.broadcast_pool(&cancelled).await;
                }
                swept += 1;
            }
        }
        Ok(swept)
    }
}
