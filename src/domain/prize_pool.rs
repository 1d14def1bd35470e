//! Prize pool escrow aggregate (spec §3, §4.2).
//!
//! Core invariant, revalidated after every mutation:
//! `total_amount == platform_contribution + Σ player_contributions`.
//! A violation is an [`crate::error::CoreError::InvariantViolation`] —
//! implementation bug, never caught, per spec §7.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::amount::{Amount, Currency};
use crate::domain::distribution::{DistributionRule, PrizeDistribution};
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrizePoolStatus {
    Accumulating,
    Locked,
    InEscrow,
    Distributed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrizeWinner {
    pub player_id: Uuid,
    pub rank: u8,
    pub amount: Amount,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrizePool {
    pub id: Uuid,
    pub match_id: Uuid,
    pub game_id: String,
    pub region: String,
    pub currency: Currency,
    pub total_amount: Amount,
    pub platform_contribution: Amount,
    pub player_contributions: HashMap<Uuid, Amount>,
    pub distribution_rule: DistributionRule,
    pub status: PrizePoolStatus,
    pub locked_at: Option<DateTime<Utc>>,
    pub distributed_at: Option<DateTime<Utc>>,
    pub winners: Vec<PrizeWinner>,
    pub mvp: Option<Uuid>,
    pub escrow_end_time: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub version: u64,
}

impl PrizePool {
    pub fn new(
        match_id: Uuid,
        game_id: impl Into<String>,
        region: impl Into<String>,
        currency: Currency,
        platform_contribution: Amount,
        distribution_rule: DistributionRule,
    ) -> Self {
        PrizePool {
            id: Uuid::new_v4(),
            match_id,
            game_id: game_id.into(),
            region: region.into(),
            currency,
            total_amount: platform_contribution,
            platform_contribution,
            player_contributions: HashMap::new(),
            distribution_rule,
            status: PrizePoolStatus::Accumulating,
            locked_at: None,
            distributed_at: None,
            winners: Vec::new(),
            mvp: None,
            escrow_end_time: None,
            cancel_reason: None,
            version: 0,
        }
    }

    fn bump_version(&mut self) {
        self.version += 1;
    }

    pub fn player_contribution(&self, player_id: Uuid) -> Amount {
        self.player_contributions
            .get(&player_id)
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    /// Revalidates `total == platform + Σ contributions` exactly.
    fn assert_invariant(&self) -> CoreResult<()> {
        let mut sum = self.platform_contribution;
        for amount in self.player_contributions.values() {
            sum = sum.add(*amount).map_err(|_| {
                CoreError::InvariantViolation("contribution sum overflow".into())
            })?;
        }
        if sum != self.total_amount {
            return Err(CoreError::InvariantViolation(format!(
                "total_amount {} != platform {} + contributions {}",
                self.total_amount, self.platform_contribution, sum
            )));
        }
        Ok(())
    }

    /// Adds a (possibly repeated) contribution from `player_id` (spec §4.2).
    pub fn add_player_contribution(&mut self, player_id: Uuid, amount: Amount) -> CoreResult<()> {
        if self.status != PrizePoolStatus::Accumulating {
            return Err(CoreError::Conflict(format!(
                "cannot add contribution in status {:?}",
                self.status
            )));
        }
        if !amount.is_positive() {
            return Err(CoreError::ValidationError(
                "contribution must be strictly positive".into(),
            ));
        }
        let existing = self.player_contribution(player_id);
        let updated = existing.add(amount)?;
        self.player_contributions.insert(player_id, updated);
        self.total_amount = self.total_amount.add(amount)?;
        self.bump_version();
        self.assert_invariant()?;
        Ok(())
    }

    pub fn lock(&mut self) -> CoreResult<()> {
        if self.status != PrizePoolStatus::Accumulating {
            return Err(CoreError::Conflict(format!(
                "cannot lock from status {:?}",
                self.status
            )));
        }
        self.status = PrizePoolStatus::Locked;
        self.locked_at = Some(Utc::now());
        self.bump_version();
        Ok(())
    }

    pub fn enter_escrow(&mut self, escrow_hours: i64) -> CoreResult<()> {
        if self.status != PrizePoolStatus::Locked {
            return Err(CoreError::Conflict(format!(
                "cannot enter escrow from status {:?}",
                self.status
            )));
        }
        self.status = PrizePoolStatus::InEscrow;
        self.escrow_end_time = Some(Utc::now() + Duration::hours(escrow_hours));
        self.bump_version();
        Ok(())
    }

    pub fn calculate_distribution(
        &self,
        ranked_players: &[Uuid],
        mvp: Option<Uuid>,
    ) -> CoreResult<PrizeDistribution> {
        self.distribution_rule
            .calculate(self.total_amount, ranked_players, mvp)
    }

    /// Requires `InEscrow`, escrow window elapsed, and an exact-sum distribution (spec §4.2).
    pub fn distribute(&mut self, distribution: &PrizeDistribution, now: DateTime<Utc>) -> CoreResult<()> {
        if self.status != PrizePoolStatus::InEscrow {
            return Err(CoreError::Conflict(format!(
                "cannot distribute from status {:?}",
                self.status
            )));
        }
        let escrow_end = self
            .escrow_end_time
            .ok_or_else(|| CoreError::InvariantViolation("in_escrow pool has no escrow_end_time".into()))?;
        if now < escrow_end {
            return Err(CoreError::Conflict(
                "cannot distribute before the escrow window closes".into(),
            ));
        }
        let distribution_total = distribution.total()?;
        if distribution_total != self.total_amount {
            return Err(CoreError::Conflict(format!(
                "distribution total {} does not equal pool total {}",
                distribution_total, self.total_amount
            )));
        }

        let mut winners: Vec<PrizeWinner> = distribution
            .shares
            .iter()
            .enumerate()
            .map(|(i, (player_id, amount))| PrizeWinner {
                player_id: *player_id,
                rank: (i + 1) as u8,
                amount: *amount,
                paid_at: Some(now),
            })
            .collect();

        if let Some((mvp_id, mvp_amount)) = distribution.mvp_bonus {
            self.mvp = Some(mvp_id);
            winners.push(PrizeWinner {
                player_id: mvp_id,
                rank: 0,
                amount: mvp_amount,
                paid_at: Some(now),
            });
        }

        self.winners = winners;
        self.status = PrizePoolStatus::Distributed;
        self.distributed_at = Some(now);
        self.bump_version();
        Ok(())
    }

    pub fn cancel(&mut self, reason: impl Into<String>) -> CoreResult<()> {
        if self.status == PrizePoolStatus::Distributed {
            return Err(CoreError::Conflict("cannot cancel a distributed pool".into()));
        }
        self.status = PrizePoolStatus::Cancelled;
        self.cancel_reason = Some(reason.into());
        self.bump_version();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_pool(platform: f64) -> PrizePool {
        PrizePool::new(
            Uuid::new_v4(),
            "valorant",
            "na-east",
            Currency::USD,
            Amount::from_major_units_f64(platform).unwrap(),
            DistributionRule::WinnerTakesAll,
        )
    }

    #[test]
    fn invariant_holds_after_contributions() {
        let mut pool = new_pool(0.50);
        let p1 = Uuid::new_v4();
        pool.add_player_contribution(p1, Amount::from_major_units_f64(1.00).unwrap())
            .unwrap();
        pool.add_player_contribution(p1, Amount::from_major_units_f64(1.00).unwrap())
            .unwrap();
        assert_eq!(pool.total_amount, Amount::from_major_units_f64(2.50).unwrap());
        assert_eq!(
            pool.player_contribution(p1),
            Amount::from_major_units_f64(2.00).unwrap()
        );
    }

    #[test]
    fn zero_or_negative_contribution_is_validation_error() {
        let mut pool = new_pool(0.0);
        assert!(matches!(
            pool.add_player_contribution(Uuid::new_v4(), Amount::ZERO).unwrap_err(),
            CoreError::ValidationError(_)
        ));
    }

    #[test]
    fn distribute_before_escrow_end_is_conflict() {
        let mut pool = new_pool(0.0);
        let p1 = Uuid::new_v4();
        pool.add_player_contribution(p1, Amount::from_major_units_f64(10.0).unwrap())
            .unwrap();
        pool.lock().unwrap();
        pool.enter_escrow(24).unwrap();
        let dist = pool.calculate_distribution(&[p1], None).unwrap();
        let err = pool.distribute(&dist, Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn distribute_after_escrow_end_succeeds_and_sums_to_total() {
        let mut pool = new_pool(0.0);
        let p1 = Uuid::new_v4();
        pool.add_player_contribution(p1, Amount::from_major_units_f64(10.0).unwrap())
            .unwrap();
        pool.lock().unwrap();
        pool.enter_escrow(24).unwrap();
        let dist = pool.calculate_distribution(&[p1], None).unwrap();
        let later = Utc::now() + Duration::hours(25);
        pool.distribute(&dist, later).unwrap();
        assert_eq!(pool.status, PrizePoolStatus::Distributed);
        let sum: i64 = pool.winners.iter().map(|w| w.amount.minor_units()).sum();
        assert_eq!(sum, pool.total_amount.minor_units());
    }

    #[test]
    fn cancel_after_distributed_is_conflict() {
        let mut pool = new_pool(0.0);
        let p1 = Uuid::new_v4();
        pool.add_player_contribution(p1, Amount::from_major_units_f64(10.0).unwrap())
            .unwrap();
        pool.lock().unwrap();
        pool.enter_escrow(0).unwrap();
        let dist = pool.calculate_distribution(&[p1], None).unwrap();
        pool.distribute(&dist, Utc::now() + Duration::seconds(1))
            .unwrap();
        assert!(pool.cancel("too late").is_err());
    }
}
