//! Rate-limit tiers and their defaults (spec §4.6 table).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RateLimitTier {
    Anonymous,
    Free,
    Pro,
    Enterprise,
    Internal,
    Whitelisted,
}

#[derive(Debug, Clone, Copy)]
pub struct TierConfig {
    pub requests_per_minute: f64,
    pub burst: f64,
    pub cooldown_secs: u64,
    pub max_concurrent: u32,
}

impl RateLimitTier {
    pub fn config(&self) -> TierConfig {
        match self {
            RateLimitTier::Anonymous => TierConfig {
                requests_per_minute: 30.0,
                burst: 5.0,
                cooldown_secs: 5 * 60,
                max_concurrent: 3,
            },
            RateLimitTier::Free => TierConfig {
                requests_per_minute: 60.0,
                burst: 10.0,
                cooldown_secs: 2 * 60,
                max_concurrent: 5,
            },
            RateLimitTier::Pro => TierConfig {
                requests_per_minute: 300.0,
                burst: 50.0,
                cooldown_secs: 30,
                max_concurrent: 20,
            },
            RateLimitTier::Enterprise => TierConfig {
                requests_per_minute: 1000.0,
                burst: 200.0,
                cooldown_secs: 10,
                max_concurrent: 100,
            },
            RateLimitTier::Internal => TierConfig {
                requests_per_minute: 10_000.0,
                burst: 1_000.0,
                cooldown_secs: 0,
                max_concurrent: 500,
            },
            RateLimitTier::Whitelisted => TierConfig {
                requests_per_minute: 100_000.0,
                burst: 10_000.0,
                cooldown_secs: 0,
                max_concurrent: 1_000,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_matches_spec_table() {
        let c = RateLimitTier::Anonymous.config();
        assert_eq!(c.requests_per_minute, 30.0);
        assert_eq!(c.burst, 5.0);
        assert_eq!(c.cooldown_secs, 300);
        assert_eq!(c.max_concurrent, 3);
    }

    #[test]
    fn whitelisted_matches_spec_table() {
        let c = RateLimitTier::Whitelisted.config();
        assert_eq!(c.requests_per_minute, 100_000.0);
        assert_eq!(c.max_concurrent, 1_000);
    }
}
