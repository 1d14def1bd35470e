//! Per-client token bucket and telemetry state (spec §3, §4.6).

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::rate_limit::threat::{EndpointSensitivity, ThreatLevel};
use crate::rate_limit::tiers::RateLimitTier;

/// Escalating block durations, in seconds: 1m, 5m, 15m, 1h, 24h (spec §4.6).
const BLOCK_DURATIONS_SECS: [u64; 5] = [60, 300, 900, 3600, 86_400];

#[derive(Debug, Default, Clone, Copy)]
pub struct RequestCounters {
    pub requests: u64,
    pub successes: u64,
    pub errors_4xx: u64,
    pub errors_5xx: u64,
    pub consecutive_errors: u32,
}

#[derive(Debug, Clone)]
pub struct RateLimitClientState {
    pub tier: RateLimitTier,
    pub tokens: f64,
    pub last_refill_at: DateTime<Utc>,
    pub last_request_at: DateTime<Utc>,
    pub counters: RequestCounters,
    pub user_agents: HashMap<String, u32>,
    pub endpoints: HashMap<String, u32>,
    pub methods: HashMap<String, u32>,
    pub threat_score: f64,
    pub threat_level: ThreatLevel,
    pub blocked_until: Option<DateTime<Utc>>,
    pub block_count: u32,
    pub active_concurrent: u32,
}

impl RateLimitClientState {
    pub fn new(tier: RateLimitTier, now: DateTime<Utc>) -> Self {
        RateLimitClientState {
            tier,
            tokens: tier.config().burst,
            last_refill_at: now,
            last_request_at: now,
            counters: RequestCounters::default(),
            user_agents: HashMap::new(),
            endpoints: HashMap::new(),
            methods: HashMap::new(),
            threat_score: 0.0,
            threat_level: ThreatLevel::None,
            blocked_until: None,
            block_count: 0,
            active_concurrent: 0,
        }
    }

    pub fn is_blocked(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.blocked_until.filter(|&until| now < until)
    }

    /// `effective_rate = base_rate * threat_multiplier * load_multiplier * endpoint_multiplier` (spec §4.6).
    pub fn effective_rate(&self, load: f64, endpoint_sensitivity: EndpointSensitivity) -> f64 {
        let base_rate = self.tier.config().requests_per_minute;
        base_rate
            * self.threat_level.rate_multiplier()
            * load_multiplier(load)
            * endpoint_sensitivity.rate_multiplier()
    }

    /// Refills tokens continuously (`effective_rate/60` per second), capped at burst.
    pub fn refill(&mut self, now: DateTime<Utc>, load: f64, endpoint_sensitivity: EndpointSensitivity) {
        let elapsed_secs = (now - self.last_refill_at).num_milliseconds().max(0) as f64 / 1000.0;
        let rate_per_sec = self.effective_rate(load, endpoint_sensitivity) / 60.0;
        let burst = self.tier.config().burst;
        self.tokens = (self.tokens + rate_per_sec * elapsed_secs).min(burst);
        self.last_refill_at = now;
    }

    /// Attempts to consume a single token, refilling first. Returns the
    /// floor of remaining tokens on success (spec §8: `Remaining =
    /// floor(tokens_after)`).
    pub fn try_consume(
        &mut self,
        now: DateTime<Utc>,
        load: f64,
        endpoint_sensitivity: EndpointSensitivity,
    ) -> Option<u64> {
        self.refill(now, load, endpoint_sensitivity);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Some(self.tokens.floor() as u64)
        } else {
            None
        }
    }

    /// Increments `block_count` and sets `blocked_until` per the escalating
    /// block-duration table, scaled by threat level (spec §4.6).
    pub fn trip_block(&mut self, now: DateTime<Utc>) -> Duration {
        self.block_count += 1;
        let index = (self.block_count as usize - 1).min(BLOCK_DURATIONS_SECS.len() - 1);
        let base_secs = BLOCK_DURATIONS_SECS[index] as f64;
        let duration_secs = (base_secs * self.threat_level.block_duration_multiplier()) as i64;
        let duration = Duration::seconds(duration_secs);
        self.blocked_until = Some(now + duration);
        duration
    }

    pub fn record_request_metadata(&mut self, user_agent: &str, endpoint: &str, method: &str) {
        *self.user_agents.entry(user_agent.to_string()).or_insert(0) += 1;
        *self.endpoints.entry(endpoint.to_string()).or_insert(0) += 1;
        *self.methods.entry(method.to_string()).or_insert(0) += 1;
        self.counters.requests += 1;
    }

    pub fn record_outcome(&mut self, status_code: u16) {
        if (200..400).contains(&status_code) {
            self.counters.successes += 1;
            self.counters.consecutive_errors = 0;
        } else {
            if (400..500).contains(&status_code) {
                self.counters.errors_4xx += 1;
            } else {
                self.counters.errors_5xx += 1;
            }
            self.counters.consecutive_errors += 1;
        }
    }

    pub fn rolling_error_rate(&self) -> f64 {
        if self.counters.requests == 0 {
            0.0
        } else {
            (self.counters.errors_4xx + self.counters.errors_5xx) as f64 / self.counters.requests as f64
        }
    }

    pub fn is_idle_and_unblocked(&self, now: DateTime<Utc>, idle_threshold_secs: i64) -> bool {
        self.blocked_until.is_none() && (now - self.last_request_at) > Duration::seconds(idle_threshold_secs)
    }
}

fn load_multiplier(load: f64) -> f64 {
    if load > 0.9 {
        0.3
    } else if load > 0.7 {
        0.6
    } else if load > 0.5 {
        0.8
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_bucket_starts_at_burst() {
        let state = RateLimitClientState::new(RateLimitTier::Free, Utc::now());
        assert_eq!(state.tokens, 10.0);
    }

    #[test]
    fn consuming_below_zero_denies() {
        let mut state = RateLimitClientState::new(RateLimitTier::Anonymous, Utc::now());
        let now = Utc::now();
        for _ in 0..5 {
            assert!(state.try_consume(now, 0.0, EndpointSensitivity::Low).is_some());
        }
        assert!(state.try_consume(now, 0.0, EndpointSensitivity::Low).is_none());
    }

    #[test]
    fn one_token_available_after_refill_window() {
        let mut state = RateLimitClientState::new(RateLimitTier::Anonymous, Utc::now());
        let now = Utc::now();
        for _ in 0..5 {
            state.try_consume(now, 0.0, EndpointSensitivity::Low);
        }
        assert!(state.try_consume(now, 0.0, EndpointSensitivity::Low).is_none());

        // effective_rate = 30 req/min at None threat / normal load, so one
        // token takes 60/30 = 2 seconds to refill.
        let later = now + Duration::milliseconds(2100);
        assert!(state.try_consume(later, 0.0, EndpointSensitivity::Low).is_some());
    }

    #[test]
    fn block_duration_escalates() {
        let mut state = RateLimitClientState::new(RateLimitTier::Anonymous, Utc::now());
        let now = Utc::now();
        let first = state.trip_block(now);
        assert_eq!(first, Duration::seconds(60));
        let second = state.trip_block(now);
        assert_eq!(second, Duration::seconds(300));
    }

    #[test]
    fn threat_level_halves_effective_rate_at_medium() {
        let mut state = RateLimitClientState::new(RateLimitTier::Free, Utc::now());
        state.threat_level = ThreatLevel::Medium;
        let rate = state.effective_rate(0.0, EndpointSensitivity::Low);
        assert_eq!(rate, 30.0); // 60 * 0.5
    }
}
