//! Glicko-2 player rating state and its derived views.
//!
//! `PlayerRating` itself is a plain data holder with clamp-enforcing
//! constructors; the actual per-match math lives in
//! [`crate::engine::rating_engine::RatingEngine`], which is the only thing
//! allowed to mutate it (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_RATING: f64 = 100.0;
pub const MAX_RATING: f64 = 4000.0;
pub const MIN_DEVIATION: f64 = 30.0;
pub const MAX_DEVIATION: f64 = 350.0;
pub const DEFAULT_RATING: f64 = 1500.0;
pub const DEFAULT_DEVIATION: f64 = 350.0;
pub const DEFAULT_VOLATILITY: f64 = 0.06;
pub const PROVISIONAL_THRESHOLD: u32 = 10;
pub const MAX_HISTORY_LEN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RankTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
    Master,
    Grandmaster,
    Challenger,
}

impl RankTier {
    /// Ascending-threshold bucket lookup on `rating` (spec §4.3).
    pub fn from_rating(rating: f64) -> RankTier {
        if rating < 1200.0 {
            RankTier::Bronze
        } else if rating < 1400.0 {
            RankTier::Silver
        } else if rating < 1600.0 {
            RankTier::Gold
        } else if rating < 1900.0 {
            RankTier::Platinum
        } else if rating < 2200.0 {
            RankTier::Diamond
        } else if rating < 2500.0 {
            RankTier::Master
        } else if rating < 2800.0 {
            RankTier::Grandmaster
        } else {
            RankTier::Challenger
        }
    }

    pub fn all() -> [RankTier; 8] {
        [
            RankTier::Bronze,
            RankTier::Silver,
            RankTier::Gold,
            RankTier::Platinum,
            RankTier::Diamond,
            RankTier::Master,
            RankTier::Grandmaster,
            RankTier::Challenger,
        ]
    }
}

/// One entry in a player's bounded rating history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingChange {
    pub match_id: Uuid,
    pub rating_before: f64,
    pub rating_after: f64,
    pub deviation_before: f64,
    pub deviation_after: f64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRating {
    pub player_id: Uuid,
    pub game_id: String,
    pub rating: f64,
    pub deviation: f64,
    pub volatility: f64,
    pub matches_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub win_streak: u32,
    pub peak_rating: f64,
    pub last_match_at: Option<DateTime<Utc>>,
    pub history: Vec<RatingChange>,
    pub version: u64,
}

impl PlayerRating {
    /// A freshly-created rating for a player seen for the first time (spec §3:
    /// "created lazily on first lookup").
    pub fn new(player_id: Uuid, game_id: impl Into<String>) -> Self {
        PlayerRating {
            player_id,
            game_id: game_id.into(),
            rating: DEFAULT_RATING,
            deviation: DEFAULT_DEVIATION,
            volatility: DEFAULT_VOLATILITY,
            matches_played: 0,
            wins: 0,
            losses: 0,
            draws: 0,
            win_streak: 0,
            peak_rating: DEFAULT_RATING,
            last_match_at: None,
            history: Vec::new(),
            version: 0,
        }
    }

    pub fn clamp_bounds(&mut self) {
        self.rating = self.rating.clamp(MIN_RATING, MAX_RATING);
        self.deviation = self.deviation.clamp(MIN_DEVIATION, MAX_DEVIATION);
    }

    pub fn push_history(&mut self, change: RatingChange) {
        self.history.push(change);
        if self.history.len() > MAX_HISTORY_LEN {
            let overflow = self.history.len() - MAX_HISTORY_LEN;
            self.history.drain(0..overflow);
        }
    }

    pub fn rank(&self) -> RankTier {
        RankTier::from_rating(self.rating)
    }

    pub fn confidence_pct(&self) -> f64 {
        (100.0 * (1.0 - self.deviation / MAX_DEVIATION)).clamp(0.0, 100.0)
    }

    pub fn is_provisional(&self) -> bool {
        self.matches_played < PROVISIONAL_THRESHOLD
    }

    pub fn win_rate_pct(&self) -> f64 {
        let decisive = self.wins + self.losses + self.draws;
        if decisive == 0 {
            0.0
        } else {
            100.0 * self.wins as f64 / decisive as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rating_has_spec_defaults() {
        let r = PlayerRating::new(Uuid::new_v4(), "valorant");
        assert_eq!(r.rating, 1500.0);
        assert_eq!(r.deviation, 350.0);
        assert_eq!(r.volatility, 0.06);
        assert!(r.is_provisional());
    }

    #[test]
    fn rank_buckets_match_thresholds() {
        assert_eq!(RankTier::from_rating(1199.0), RankTier::Bronze);
        assert_eq!(RankTier::from_rating(1200.0), RankTier::Silver);
        assert_eq!(RankTier::from_rating(2799.0), RankTier::Grandmaster);
        assert_eq!(RankTier::from_rating(2800.0), RankTier::Challenger);
    }

    #[test]
    fn history_is_capped_at_50() {
        let mut r = PlayerRating::new(Uuid::new_v4(), "valorant");
        for _ in 0..60 {
            r.push_history(RatingChange {
                match_id: Uuid::new_v4(),
                rating_before: 1500.0,
                rating_after: 1505.0,
                deviation_before: 350.0,
                deviation_after: 340.0,
                occurred_at: Utc::now(),
            });
        }
        assert_eq!(r.history.len(), MAX_HISTORY_LEN);
    }

    #[test]
    fn win_rate_handles_zero_denominator() {
        let r = PlayerRating::new(Uuid::new_v4(), "valorant");
        assert_eq!(r.win_rate_pct(), 0.0);
    }

    #[test]
    fn clamp_bounds_enforces_spec_range() {
        let mut r = PlayerRating::new(Uuid::new_v4(), "valorant");
        r.rating = 50.0;
        r.deviation = 10.0;
        r.clamp_bounds();
        assert_eq!(r.rating, MIN_RATING);
        assert_eq!(r.deviation, MIN_DEVIATION);
    }
}
