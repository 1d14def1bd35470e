//! Domain aggregates and value objects.
//!
//! Each aggregate here is a single-writer consistency boundary (spec §5):
//! callers serialize mutations externally (the orchestrator holds a
//! `tokio::sync::Mutex` per aggregate instance).

pub mod amount;
pub mod distribution;
pub mod lobby;
pub mod prize_pool;
pub mod rating;

pub use amount::{Amount, Currency};
pub use distribution::{DistributionRule, PrizeDistribution};
pub use lobby::{LobbyStatus, MatchmakingLobby, PlayerSlot, Tier};
pub use prize_pool::{PrizePool, PrizePoolStatus, PrizeWinner};
pub use rating::{PlayerRating, RankTier, RatingChange};
