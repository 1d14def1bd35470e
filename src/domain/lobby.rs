//! The custom-lobby state machine (spec §3, §4.1).
//!
//! `MatchmakingLobby` is a single-writer aggregate: callers are expected to
//! serialize access externally (the orchestrator holds one `tokio::sync::
//! Mutex<MatchmakingLobby>` per lobby id).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

pub const DEFAULT_READY_TIMEOUT_SECS: i64 = 60;
pub const MIN_MAX_PLAYERS: usize = 2;
pub const MAX_MAX_PLAYERS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Free,
    Premium,
    Pro,
    Elite,
}

impl Tier {
    /// Entry fee in major units, per spec §4.4's JoinLobby step 2.
    pub fn entry_fee_major_units(&self) -> f64 {
        match self {
            Tier::Free => 0.0,
            Tier::Premium => 1.00,
            Tier::Pro => 2.00,
            Tier::Elite => 5.00,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobbyStatus {
    Open,
    ReadyCheck,
    Starting,
    Started,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSlot {
    pub slot_number: usize,
    pub player_id: Option<Uuid>,
    pub is_ready: bool,
    pub joined_at: Option<DateTime<Utc>>,
    pub mmr_snapshot: Option<f64>,
}

impl PlayerSlot {
    fn empty(slot_number: usize) -> Self {
        PlayerSlot {
            slot_number,
            player_id: None,
            is_ready: false,
            joined_at: None,
            mmr_snapshot: None,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.player_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchmakingLobby {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub game_id: String,
    pub region: String,
    pub tier: Tier,
    pub distribution_rule: crate::domain::DistributionRule,
    pub max_players: usize,
    pub slots: Vec<PlayerSlot>,
    pub status: LobbyStatus,
    pub ready_check_started_at: Option<DateTime<Utc>>,
    pub ready_check_ends_at: Option<DateTime<Utc>>,
    pub match_id: Option<Uuid>,
    pub cancel_reason: Option<String>,
    pub auto_fill: bool,
    pub ready_timeout_secs: i64,
    pub invite_only: bool,
    pub version: u64,
}

/// Result of `CheckReadyStatus`: whether everyone occupied is ready, and who isn't.
#[derive(Debug, Clone)]
pub struct ReadyStatus {
    pub all_ready: bool,
    pub not_ready: Vec<Uuid>,
}

impl MatchmakingLobby {
    pub fn new(
        creator_id: Uuid,
        game_id: impl Into<String>,
        region: impl Into<String>,
        tier: Tier,
        distribution_rule: crate::domain::DistributionRule,
        max_players: usize,
        auto_fill: bool,
        invite_only: bool,
        ready_timeout_secs: i64,
    ) -> CoreResult<Self> {
        if !(MIN_MAX_PLAYERS..=MAX_MAX_PLAYERS).contains(&max_players) {
            return Err(CoreError::ValidationError(format!(
                "max_players must be within [{MIN_MAX_PLAYERS}, {MAX_MAX_PLAYERS}], got {max_players}"
            )));
        }

        let mut slots: Vec<PlayerSlot> = (0..max_players).map(PlayerSlot::empty).collect();
        slots[0] = PlayerSlot {
            slot_number: 0,
            player_id: Some(creator_id),
            is_ready: false,
            joined_at: Some(Utc::now()),
            mmr_snapshot: None,
        };

        Ok(MatchmakingLobby {
            id: Uuid::new_v4(),
            creator_id,
            game_id: game_id.into(),
            region: region.into(),
            tier,
            distribution_rule,
            max_players,
            slots,
            status: LobbyStatus::Open,
            ready_check_started_at: None,
            ready_check_ends_at: None,
            match_id: None,
            cancel_reason: None,
            auto_fill,
            ready_timeout_secs,
            invite_only,
            version: 0,
        })
    }

    fn bump_version(&mut self) {
        self.version += 1;
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_occupied()).count()
    }

    pub fn contains_player(&self, player_id: Uuid) -> bool {
        self.slots
            .iter()
            .any(|s| s.player_id == Some(player_id))
    }

    /// Adds a player to the first empty slot in slot-number order (spec §4.1).
    pub fn add_player(&mut self, player_id: Uuid, mmr: Option<f64>) -> CoreResult<usize> {
        if self.status != LobbyStatus::Open {
            return Err(CoreError::Conflict(format!(
                "cannot join lobby in status {:?}",
                self.status
            )));
        }
        if self.contains_player(player_id) {
            return Err(CoreError::Conflict("player already in lobby".into()));
        }
        let slot = self
            .slots
            .iter_mut()
            .find(|s| !s.is_occupied())
            .ok_or_else(|| CoreError::Conflict("lobby is full".into()))?;

        slot.player_id = Some(player_id);
        slot.is_ready = false;
        slot.joined_at = Some(Utc::now());
        slot.mmr_snapshot = mmr;
        let slot_number = slot.slot_number;
        self.bump_version();
        Ok(slot_number)
    }

    /// Removes a player; cascades to `Cancelled` if the creator leaves (spec §4.1).
    pub fn remove_player(&mut self, player_id: Uuid) -> CoreResult<()> {
        if self.status == LobbyStatus::Started {
            return Err(CoreError::Conflict("cannot leave a started lobby".into()));
        }
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.player_id == Some(player_id))
            .ok_or_else(|| CoreError::NotFound("player not in lobby".into()))?;
        *slot = PlayerSlot::empty(slot.slot_number);
        self.bump_version();

        if player_id == self.creator_id {
            self.status = LobbyStatus::Cancelled;
            self.cancel_reason = Some("creator left lobby".to_string());
        }
        Ok(())
    }

    /// Sets a player's ready flag; only valid in `Open` or `ReadyCheck` (spec §4.1).
    pub fn set_player_ready(&mut self, player_id: Uuid, ready: bool) -> CoreResult<()> {
        if !matches!(self.status, LobbyStatus::Open | LobbyStatus::ReadyCheck) {
            return Err(CoreError::Conflict(format!(
                "cannot change ready state in status {:?}",
                self.status
            )));
        }
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.player_id == Some(player_id))
            .ok_or_else(|| CoreError::NotFound("player not in lobby".into()))?;
        slot.is_ready = ready;
        self.bump_version();
        Ok(())
    }

    /// Starts the ready-check window; requires >=2 occupied slots (spec §4.1).
    pub fn start_ready_check(&mut self) -> CoreResult<()> {
        if self.status != LobbyStatus::Open {
            return Err(CoreError::Conflict(format!(
                "cannot start ready check in status {:?}",
                self.status
            )));
        }
        if self.occupied_count() < 2 {
            return Err(CoreError::Conflict(
                "ready check requires at least 2 occupied slots".into(),
            ));
        }
        let now = Utc::now();
        self.status = LobbyStatus::ReadyCheck;
        self.ready_check_started_at = Some(now);
        self.ready_check_ends_at = Some(now + Duration::seconds(self.ready_timeout_secs));
        self.bump_version();
        Ok(())
    }

    /// Read-only: who is occupied but not ready.
    pub fn check_ready_status(&self) -> ReadyStatus {
        let not_ready: Vec<Uuid> = self
            .slots
            .iter()
            .filter(|s| s.is_occupied() && !s.is_ready)
            .filter_map(|s| s.player_id)
            .collect();
        ReadyStatus {
            all_ready: not_ready.is_empty(),
            not_ready,
        }
    }

    pub fn is_ready_check_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == LobbyStatus::ReadyCheck
            && self.ready_check_ends_at.is_some_and(|end| now > end)
    }

    /// Orchestrator-invoked periodic sweep: expired ready-checks become cancelled.
    pub fn sweep_ready_check_timeout(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_ready_check_expired(now) {
            self.status = LobbyStatus::Cancelled;
            self.cancel_reason = Some("ready check timed out".to_string());
            self.bump_version();
            true
        } else {
            false
        }
    }

    /// Requires `ReadyCheck` status and all occupied slots ready (spec §4.1).
    pub fn start_match(&mut self, match_id: Uuid) -> CoreResult<()> {
        if self.status != LobbyStatus::ReadyCheck {
            return Err(CoreError::Conflict(format!(
                "cannot start match in status {:?}",
                self.status
            )));
        }
        let status = self.check_ready_status();
        if !status.all_ready {
            return Err(CoreError::Conflict(format!(
                "players not ready: {:?}",
                status.not_ready
            )));
        }
        self.status = LobbyStatus::Starting;
        self.match_id = Some(match_id);
        self.bump_version();
        Ok(())
    }

    pub fn mark_match_started(&mut self) -> CoreResult<()> {
        if self.status != LobbyStatus::Starting {
            return Err(CoreError::Conflict(format!(
                "cannot mark started from status {:?}",
                self.status
            )));
        }
        if self.match_id.is_none() {
            return Err(CoreError::InvariantViolation(
                "starting lobby has no match id".into(),
            ));
        }
        self.status = LobbyStatus::Started;
        self.bump_version();
        Ok(())
    }

    pub fn cancel(&mut self, reason: impl Into<String>) -> CoreResult<()> {
        if self.status == LobbyStatus::Started {
            return Err(CoreError::Conflict("cannot cancel a started lobby".into()));
        }
        self.status = LobbyStatus::Cancelled;
        self.cancel_reason = Some(reason.into());
        self.bump_version();
        Ok(())
    }

    pub fn assert_slot_invariants(&self) -> CoreResult<()> {
        if self.slots.len() != self.max_players {
            return Err(CoreError::InvariantViolation(format!(
                "slot count {} != max_players {}",
                self.slots.len(),
                self.max_players
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for slot in &self.slots {
            if let Some(player_id) = slot.player_id {
                if !seen.insert(player_id) {
                    return Err(CoreError::InvariantViolation(format!(
                        "player {player_id} occupies more than one slot"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DistributionRule;

    fn new_lobby(max_players: usize) -> MatchmakingLobby {
        MatchmakingLobby::new(
            Uuid::new_v4(),
            "valorant",
            "na-east",
            Tier::Premium,
            DistributionRule::WinnerTakesAll,
            max_players,
            false,
            false,
            DEFAULT_READY_TIMEOUT_SECS,
        )
        .unwrap()
    }

    #[test]
    fn creator_occupies_slot_zero() {
        let lobby = new_lobby(2);
        assert_eq!(lobby.slots[0].player_id, Some(lobby.creator_id));
        assert_eq!(lobby.occupied_count(), 1);
    }

    #[test]
    fn add_player_picks_lowest_empty_slot() {
        let mut lobby = new_lobby(4);
        let p1 = Uuid::new_v4();
        let slot = lobby.add_player(p1, None).unwrap();
        assert_eq!(slot, 1);
    }

    #[test]
    fn add_player_rejects_duplicate_and_full() {
        let mut lobby = new_lobby(2);
        let p1 = Uuid::new_v4();
        lobby.add_player(p1, None).unwrap();
        assert!(lobby.add_player(p1, None).is_err());

        let p2 = Uuid::new_v4();
        assert!(lobby.add_player(p2, None).is_err());
    }

    #[test]
    fn creator_leaving_cancels_with_reason() {
        let mut lobby = new_lobby(2);
        let creator = lobby.creator_id;
        lobby.remove_player(creator).unwrap();
        assert_eq!(lobby.status, LobbyStatus::Cancelled);
        assert_eq!(lobby.cancel_reason.as_deref(), Some("creator left lobby"));
    }

    #[test]
    fn ready_check_requires_two_players() {
        let mut lobby = new_lobby(2);
        assert!(lobby.start_ready_check().is_err());
        lobby.add_player(Uuid::new_v4(), None).unwrap();
        assert!(lobby.start_ready_check().is_ok());
    }

    #[test]
    fn start_match_requires_all_ready() {
        let mut lobby = new_lobby(2);
        let p2 = Uuid::new_v4();
        lobby.add_player(p2, None).unwrap();
        lobby.start_ready_check().unwrap();

        let err = lobby.start_match(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        lobby.set_player_ready(lobby.creator_id, true).unwrap();
        lobby.set_player_ready(p2, true).unwrap();
        lobby.start_match(Uuid::new_v4()).unwrap();
        assert_eq!(lobby.status, LobbyStatus::Starting);
    }

    #[test]
    fn full_happy_path_transitions() {
        let mut lobby = new_lobby(2);
        let p2 = Uuid::new_v4();
        lobby.add_player(p2, None).unwrap();
        lobby.start_ready_check().unwrap();
        lobby.set_player_ready(lobby.creator_id, true).unwrap();
        lobby.set_player_ready(p2, true).unwrap();
        let match_id = Uuid::new_v4();
        lobby.start_match(match_id).unwrap();
        lobby.mark_match_started().unwrap();
        assert_eq!(lobby.status, LobbyStatus::Started);
        assert_eq!(lobby.match_id, Some(match_id));
    }

    #[test]
    fn cancel_after_started_is_conflict() {
        let mut lobby = new_lobby(2);
        let p2 = Uuid::new_v4();
        lobby.add_player(p2, None).unwrap();
        lobby.start_ready_check().unwrap();
        lobby.set_player_ready(lobby.creator_id, true).unwrap();
        lobby.set_player_ready(p2, true).unwrap();
        lobby.start_match(Uuid::new_v4()).unwrap();
        lobby.mark_match_started().unwrap();
        assert!(lobby.cancel("late cancel").is_err());
        assert!(lobby.remove_player(p2).is_err());
    }

    #[test]
    fn slot_invariants_hold_after_mutation() {
        let mut lobby = new_lobby(4);
        lobby.add_player(Uuid::new_v4(), None).unwrap();
        lobby.assert_slot_invariants().unwrap();
    }

    #[test]
    fn ready_check_expiry_is_wall_clock_driven() {
        let mut lobby = new_lobby(2);
        lobby.add_player(Uuid::new_v4(), None).unwrap();
        lobby.start_ready_check().unwrap();
        let far_future = Utc::now() + Duration::seconds(1000);
        assert!(lobby.is_ready_check_expired(far_future));
        assert!(lobby.sweep_ready_check_timeout(far_future));
        assert_eq!(lobby.status, LobbyStatus::Cancelled);
    }
}
