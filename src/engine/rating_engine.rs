//! Glicko-2 rating engine (spec §4.3).
//!
//! Implements the per-match team update, inactivity decay on read, and the
//! leaderboard/rank-distribution queries. The volatility solve uses the
//! Illinois-method regula falsi variant spec.md names explicitly (the
//! `fA/2` halving step below is what distinguishes it from plain regula
//! falsi).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::rating::{RankTier, RatingChange, MAX_DEVIATION};
use crate::domain::PlayerRating;
use crate::error::{CoreError, CoreResult};
use crate::ports::PlayerRatingRepository;

const GLICKO2_SCALE: f64 = 173.7178;
const TAU: f64 = 0.5;
const EPSILON: f64 = 1e-6;
const DECAY_AFTER_DAYS: i64 = 7;

pub struct RatingEngine<R: PlayerRatingRepository> {
    repo: R,
}

/// Histogram over the 8 rank buckets (spec §4.3).
pub type RankDistribution = HashMap<RankTier, usize>;

impl<R: PlayerRatingRepository> RatingEngine<R> {
    pub fn new(repo: R) -> Self {
        RatingEngine { repo }
    }

    /// Loads (creating lazily if absent) a player's rating, applying
    /// inactivity decay on every read (spec §4.3, §9's resolved open question).
    pub async fn get_rating(&self, player_id: Uuid, game_id: &str, now: DateTime<Utc>) -> CoreResult<PlayerRating> {
        let mut rating = match self.repo.find_by_player_and_game(player_id, game_id).await? {
            Some(rating) => rating,
            None => PlayerRating::new(player_id, game_id),
        };
        if apply_inactivity_decay(&mut rating, now) {
            self.repo.save(&rating).await?;
        }
        Ok(rating)
    }

    pub async fn leaderboard(&self, game_id: &str, limit: usize) -> CoreResult<Vec<PlayerRating>> {
        self.repo.get_top_players(game_id, limit).await
    }

    pub async fn rank_distribution(&self, game_id: &str) -> CoreResult<RankDistribution> {
        // Practically bounded: callers page `get_top_players` with a large
        // limit since the repository port has no dedicated histogram query.
        let all = self.repo.get_top_players(game_id, usize::MAX).await?;
        let mut histogram: RankDistribution = RankTier::all().into_iter().map(|t| (t, 0)).collect();
        for rating in all {
            *histogram.entry(rating.rank()).or_insert(0) += 1;
        }
        Ok(histogram)
    }

    /// Applies the per-match team update to every participant (spec §4.3).
    /// Atomic across all participants: either every save succeeds or none
    /// are considered applied by the caller (spec §5).
    pub async fn update_ratings_after_match(
        &self,
        match_id: Uuid,
        game_id: &str,
        winners: &[Uuid],
        losers: &[Uuid],
    ) -> CoreResult<Vec<PlayerRating>> {
        if winners.is_empty() || losers.is_empty() {
            return Err(CoreError::ValidationError(
                "a match requires at least one winner and one loser".into(),
            ));
        }
        let now = Utc::now();

        let mut winner_ratings = Vec::with_capacity(winners.len());
        for &id in winners {
            winner_ratings.push(self.get_rating(id, game_id, now).await?);
        }
        let mut loser_ratings = Vec::with_capacity(losers.len());
        for &id in losers {
            loser_ratings.push(self.get_rating(id, game_id, now).await?);
        }

        let (winner_mu, winner_phi) = team_average(&winner_ratings);
        let (loser_mu, loser_phi) = team_average(&loser_ratings);

        let mut updated = Vec::with_capacity(winners.len() + losers.len());
        for rating in winner_ratings {
            updated.push(apply_match_result(rating, match_id, loser_mu, loser_phi, 1.0, now));
        }
        for rating in loser_ratings {
            updated.push(apply_match_result(rating, match_id, winner_mu, winner_phi, 0.0, now));
        }

        for rating in &updated {
            self.repo.save(rating).await?;
        }
        Ok(updated)
    }
}

fn team_average(ratings: &[PlayerRating]) -> (f64, f64) {
    let n = ratings.len() as f64;
    let mu = ratings.iter().map(|r| r.rating).sum::<f64>() / n;
    let phi = ratings.iter().map(|r| r.deviation).sum::<f64>() / n;
    (mu, phi)
}

/// Applies the inactivity decay rule (spec §4.3): if idle >= 7 days, widen
/// `phi` by `sqrt(phi^2 + (25/30)^2 * days)`, capped at 350. `mu` untouched.
/// Returns whether the rating was changed (and so needs persisting).
fn apply_inactivity_decay(rating: &mut PlayerRating, now: DateTime<Utc>) -> bool {
    let Some(last_match) = rating.last_match_at else {
        return false;
    };
    let days_idle = (now - last_match).num_days();
    if days_idle < DECAY_AFTER_DAYS {
        return false;
    }
    let days = days_idle as f64;
    let widened = (rating.deviation.powi(2) + (25.0 / 30.0).powi(2) * days).sqrt();
    let new_phi = widened.min(MAX_DEVIATION);
    if new_phi != rating.deviation {
        rating.deviation = new_phi;
        true
    } else {
        false
    }
}

fn g(phi: f64) -> f64 {
    1.0 / (1.0 + 3.0 * phi.powi(2) / std::f64::consts::PI.powi(2)).sqrt()
}

fn expected_score(mu: f64, mu_opp: f64, phi_opp: f64) -> f64 {
    1.0 / (1.0 + (-g(phi_opp) * (mu - mu_opp)).exp())
}

/// Illinois-method regula falsi solve for the new volatility (spec §4.3).
fn solve_volatility(phi: f64, v: f64, delta: f64, sigma: f64) -> f64 {
    let a = (sigma.powi(2)).ln();
    let f = |x: f64| -> f64 {
        let ex = x.exp();
        (ex * (delta.powi(2) - phi.powi(2) - v - ex)) / (2.0 * (phi.powi(2) + v + ex).powi(2)) - (x - a) / TAU.powi(2)
    };

    let mut big_a = a;
    let mut big_b;
    if delta.powi(2) > phi.powi(2) + v {
        big_b = (delta.powi(2) - phi.powi(2) - v).ln();
    } else {
        let mut k = 1.0;
        while f(a - k * TAU) < 0.0 {
            k += 1.0;
        }
        big_b = a - k * TAU;
    }

    let mut f_a = f(big_a);
    let mut f_b = f(big_b);

    while (big_b - big_a).abs() > EPSILON {
        let c = big_a + (big_a - big_b) * f_a / (f_b - f_a);
        let f_c = f(c);
        if f_c * f_b < 0.0 {
            big_a = big_b;
            f_a = f_b;
        } else {
            f_a /= 2.0;
        }
        big_b = c;
        f_b = f_c;
    }

    (big_a / 2.0).exp()
}

/// Single-opponent Glicko-2 update for one player against an aggregate
/// opponent (the other side's team mean rating/deviation), per spec §4.3.
fn apply_match_result(
    mut rating: PlayerRating,
    match_id: Uuid,
    opp_mu: f64,
    opp_phi: f64,
    score: f64,
    now: DateTime<Utc>,
) -> PlayerRating {
    let rating_before = rating.rating;
    let deviation_before = rating.deviation;

    let mu = (rating.rating - 1500.0) / GLICKO2_SCALE;
    let phi = rating.deviation / GLICKO2_SCALE;
    let mu_opp = (opp_mu - 1500.0) / GLICKO2_SCALE;
    let phi_opp = opp_phi / GLICKO2_SCALE;

    let g_opp = g(phi_opp);
    let e = expected_score(mu, mu_opp, phi_opp);
    let v = 1.0 / (g_opp.powi(2) * e * (1.0 - e));
    let delta = v * g_opp * (score - e);

    let new_sigma = solve_volatility(phi, v, delta, rating.volatility);
    let phi_star = (phi.powi(2) + new_sigma.powi(2)).sqrt();
    let new_phi = 1.0 / (1.0 / phi_star.powi(2) + 1.0 / v).sqrt();
    let new_mu = mu + new_phi.powi(2) * g_opp * (score - e);

    rating.rating = GLICKO2_SCALE * new_mu + 1500.0;
    rating.deviation = GLICKO2_SCALE * new_phi;
    rating.volatility = new_sigma;
    rating.clamp_bounds();

    rating.matches_played += 1;
    if score > 0.5 {
        rating.wins += 1;
        rating.win_streak += 1;
    } else if score < 0.5 {
        rating.losses += 1;
        rating.win_streak = 0;
    } else {
        rating.draws += 1;
    }
    if rating.rating > rating.peak_rating {
        rating.peak_rating = rating.rating;
    }
    rating.last_match_at = Some(now);
    rating.push_history(RatingChange {
        match_id,
        rating_before,
        rating_after: rating.rating,
        deviation_before,
        deviation_after: rating.deviation,
        occurred_at: now,
    });

    rating
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    #[derive(Default)]
    struct InMemoryRatingRepo {
        ratings: Mutex<HashMap<(Uuid, String), PlayerRating>>,
    }

    #[async_trait]
    impl PlayerRatingRepository for InMemoryRatingRepo {
        async fn save(&self, rating: &PlayerRating) -> CoreResult<()> {
            self.ratings
                .lock()
                .unwrap()
                .insert((rating.player_id, rating.game_id.clone()), rating.clone());
            Ok(())
        }

        async fn find_by_player_and_game(
            &self,
            player_id: Uuid,
            game_id: &str,
        ) -> CoreResult<Option<PlayerRating>> {
            Ok(self
                .ratings
                .lock()
                .unwrap()
                .get(&(player_id, game_id.to_string()))
                .cloned())
        }

        async fn get_top_players(&self, game_id: &str, limit: usize) -> CoreResult<Vec<PlayerRating>> {
            let mut all: Vec<PlayerRating> = self
                .ratings
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.game_id == game_id)
                .cloned()
                .collect();
            all.sort_by(|a, b| b.rating.partial_cmp(&a.rating).unwrap());
            all.truncate(limit);
            Ok(all)
        }
    }

    #[tokio::test]
    async fn equal_teams_winners_gain_losers_lose() {
        let engine = RatingEngine::new(InMemoryRatingRepo::default());
        let winners = vec![Uuid::new_v4(), Uuid::new_v4()];
        let losers = vec![Uuid::new_v4(), Uuid::new_v4()];

        let updated = engine
            .update_ratings_after_match(Uuid::new_v4(), "valorant", &winners, &losers)
            .await
            .unwrap();

        for rating in &updated {
            if winners.contains(&rating.player_id) {
                assert!(rating.rating > 1500.0, "winner rating should strictly increase");
            } else {
                assert!(rating.rating < 1500.0, "loser rating should strictly decrease");
            }
            assert!(
                rating.deviation < 350.0,
                "rating deviation should strictly decrease after a match"
            );
        }
    }

    #[tokio::test]
    async fn matches_played_and_streak_tracked() {
        let engine = RatingEngine::new(InMemoryRatingRepo::default());
        let w = Uuid::new_v4();
        let l = Uuid::new_v4();
        engine
            .update_ratings_after_match(Uuid::new_v4(), "valorant", &[w], &[l])
            .await
            .unwrap();
        let winner = engine.get_rating(w, "valorant", Utc::now()).await.unwrap();
        assert_eq!(winner.matches_played, 1);
        assert_eq!(winner.wins, 1);
        assert_eq!(winner.win_streak, 1);
        assert!(winner.is_provisional());
    }

    #[test]
    fn inactivity_decay_widens_deviation_not_rating() {
        let mut rating = PlayerRating::new(Uuid::new_v4(), "valorant");
        rating.deviation = 50.0;
        rating.last_match_at = Some(Utc::now() - chrono::Duration::days(30));
        let original_rating = rating.rating;
        let changed = apply_inactivity_decay(&mut rating, Utc::now());
        assert!(changed);
        assert!(rating.deviation > 50.0);
        assert_eq!(rating.rating, original_rating);
    }

    #[test]
    fn inactivity_decay_is_noop_within_window() {
        let mut rating = PlayerRating::new(Uuid::new_v4(), "valorant");
        rating.last_match_at = Some(Utc::now() - chrono::Duration::days(1));
        assert!(!apply_inactivity_decay(&mut rating, Utc::now()));
    }

    #[tokio::test]
    async fn no_winners_or_losers_is_validation_error() {
        let engine = RatingEngine::new(InMemoryRatingRepo::default());
        let err = engine
            .update_ratings_after_match(Uuid::new_v4(), "valorant", &[], &[Uuid::new_v4()])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    #[tokio::test]
    async fn leaderboard_is_sorted_descending() {
        let engine = RatingEngine::new(InMemoryRatingRepo::default());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        engine
            .update_ratings_after_match(Uuid::new_v4(), "valorant", &[a], &[b])
            .await
            .unwrap();
        let board = engine.leaderboard("valorant", 10).await.unwrap();
        assert_eq!(board[0].player_id, a);
    }
}
