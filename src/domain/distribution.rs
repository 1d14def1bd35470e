//! Prize distribution policy (spec §3: `DistributionRule`).
//!
//! The exact split ratios for `top_2_split` and `top_3_split` were left as
//! an open configuration question by spec.md; this crate follows spec.md's
//! own worked example (70/30, 60/25/15) as the default basis points,
//! exposed as configurable fields rather than hard-coded constants (see
//! DESIGN.md).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::amount::Amount;
use crate::error::{CoreError, CoreResult};

const BPS_DENOMINATOR: i64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionRule {
    WinnerTakesAll,
    Top2Split { first_bps: u16, second_bps: u16 },
    Top3Split { first_bps: u16, second_bps: u16, third_bps: u16 },
    MvpBonus { mvp_bps: u16, base: Box<DistributionRule> },
}

impl DistributionRule {
    pub fn top_2_split_default() -> Self {
        DistributionRule::Top2Split {
            first_bps: 7000,
            second_bps: 3000,
        }
    }

    pub fn top_3_split_default() -> Self {
        DistributionRule::Top3Split {
            first_bps: 6000,
            second_bps: 2500,
            third_bps: 1500,
        }
    }

    /// Splits `total` among `ranked_player_ids` (rank 1 first), per this rule.
    /// Residue from integer rounding is assigned to rank 1, and the sum of
    /// the distribution is always exactly `total` (spec §3, §8).
    pub fn calculate(
        &self,
        total: Amount,
        ranked_player_ids: &[Uuid],
        mvp: Option<Uuid>,
    ) -> CoreResult<PrizeDistribution> {
        match self {
            DistributionRule::WinnerTakesAll => {
                let winner = *ranked_player_ids
                    .first()
                    .ok_or_else(|| CoreError::ValidationError("no ranked players".into()))?;
                Ok(PrizeDistribution {
                    shares: vec![(winner, total)],
                    mvp_bonus: None,
                })
            }
            DistributionRule::Top2Split { first_bps, second_bps } => {
                self.split_by_bps(total, ranked_player_ids, &[*first_bps, *second_bps])
            }
            DistributionRule::Top3Split {
                first_bps,
                second_bps,
                third_bps,
            } => self.split_by_bps(total, ranked_player_ids, &[*first_bps, *second_bps, *third_bps]),
            DistributionRule::MvpBonus { mvp_bps, base } => {
                let mvp_id = mvp.ok_or_else(|| {
                    CoreError::ValidationError("mvp_bonus rule requires an mvp".into())
                })?;
                let mvp_share = bps_of(total, *mvp_bps)?;
                let remainder = total.subtract(mvp_share)?;
                let mut base_dist = base.calculate(remainder, ranked_player_ids, mvp)?;
                base_dist.mvp_bonus = Some((mvp_id, mvp_share));
                Ok(base_dist)
            }
        }
    }

    fn split_by_bps(
        &self,
        total: Amount,
        ranked_player_ids: &[Uuid],
        bps: &[u16],
    ) -> CoreResult<PrizeDistribution> {
        if ranked_player_ids.len() < bps.len() {
            return Err(CoreError::ValidationError(format!(
                "need at least {} ranked players, got {}",
                bps.len(),
                ranked_player_ids.len()
            )));
        }
        let mut shares: Vec<(Uuid, Amount)> = Vec::with_capacity(bps.len());
        let mut allocated = Amount::ZERO;
        for (i, share_bps) in bps.iter().enumerate() {
            let share = bps_of(total, *share_bps)?;
            allocated = allocated.add(share)?;
            shares.push((ranked_player_ids[i], share));
        }
        // Rounding residue goes to rank 1 (spec §3).
        let residue = total.subtract(allocated)?;
        if residue.is_positive() {
            shares[0].1 = shares[0].1.add(residue)?;
        }
        Ok(PrizeDistribution {
            shares,
            mvp_bonus: None,
        })
    }
}

fn bps_of(total: Amount, bps: u16) -> CoreResult<Amount> {
    let minor = total.minor_units() * bps as i64 / BPS_DENOMINATOR;
    Amount::from_minor_units(minor)
}

/// The output of `DistributionRule::calculate`: per-player shares, summing
/// exactly to the input total (spec §3, §8).
#[derive(Debug, Clone)]
pub struct PrizeDistribution {
    pub shares: Vec<(Uuid, Amount)>,
    pub mvp_bonus: Option<(Uuid, Amount)>,
}

impl PrizeDistribution {
    pub fn total(&self) -> CoreResult<Amount> {
        let mut sum = Amount::ZERO;
        for (_, amount) in &self.shares {
            sum = sum.add(*amount)?;
        }
        if let Some((_, mvp_amount)) = self.mvp_bonus {
            sum = sum.add(mvp_amount)?;
        }
        Ok(sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn winner_takes_all_gives_everything_to_rank_one() {
        let p1 = Uuid::new_v4();
        let total = Amount::from_major_units_f64(100.0).unwrap();
        let dist = DistributionRule::WinnerTakesAll
            .calculate(total, &[p1], None)
            .unwrap();
        assert_eq!(dist.shares, vec![(p1, total)]);
        assert_eq!(dist.total().unwrap(), total);
    }

    #[test]
    fn top_2_split_sums_exactly_with_residue_to_rank_one() {
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        // 10.01 split 70/30 does not divide evenly; residue must land on rank 1.
        let total = Amount::from_minor_units(1001).unwrap();
        let dist = DistributionRule::top_2_split_default()
            .calculate(total, &[p1, p2], None)
            .unwrap();
        assert_eq!(dist.total().unwrap(), total);
        assert_eq!(dist.shares[0].0, p1);
    }

    #[test]
    fn top_3_split_sums_exactly() {
        let players: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let total = Amount::from_major_units_f64(250.0).unwrap();
        let dist = DistributionRule::top_3_split_default()
            .calculate(total, &players, None)
            .unwrap();
        assert_eq!(dist.total().unwrap(), total);
        assert_eq!(dist.shares.len(), 3);
    }

    #[test]
    fn mvp_bonus_reserves_share_then_splits_remainder() {
        let winner = Uuid::new_v4();
        let mvp = Uuid::new_v4();
        let total = Amount::from_major_units_f64(100.0).unwrap();
        let rule = DistributionRule::MvpBonus {
            mvp_bps: 1000,
            base: Box::new(DistributionRule::WinnerTakesAll),
        };
        let dist = rule.calculate(total, &[winner], Some(mvp)).unwrap();
        assert_eq!(dist.total().unwrap(), total);
        assert_eq!(dist.mvp_bonus.unwrap().0, mvp);
    }

    #[test]
    fn insufficient_ranked_players_is_validation_error() {
        let p1 = Uuid::new_v4();
        let total = Amount::from_major_units_f64(100.0).unwrap();
        let err = DistributionRule::top_2_split_default()
            .calculate(total, &[p1], None)
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }
}
