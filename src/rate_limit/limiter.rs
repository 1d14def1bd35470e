//! Adaptive rate limiter (spec §4.6): ties tiers, token buckets, threat
//! scoring, and the global circuit breaker into a single admission
//! decision per request.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use tracing::warn;

use crate::rate_limit::bucket::RateLimitClientState;
use crate::rate_limit::circuit::{CircuitBreaker, CircuitLevel};
use crate::rate_limit::threat::{score_delta, EndpointSensitivity, ThreatLevel, ThreatSignal};
use crate::rate_limit::tiers::RateLimitTier;

const IDLE_SWEEP_THRESHOLD_SECS: i64 = 5 * 60;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub client_id: String,
    pub tier: RateLimitTier,
    pub endpoint: String,
    pub user_agent: String,
    pub method: String,
    pub current_load: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allow { remaining: u64 },
    DenyCircuitOpen,
    DenyBlocked { retry_after_secs: i64 },
    DenyConcurrencyExceeded { retry_after_secs: i64 },
    DenyRateExceeded { retry_after_secs: i64, threat_level: ThreatLevel },
}

/// Holds all per-client state plus the single global circuit breaker.
/// Callers serialize access through the outer mutex, matching the
/// single-writer aggregate pattern used across the engines.
pub struct AdaptiveRateLimiter {
    clients: Mutex<HashMap<String, RateLimitClientState>>,
    circuit: Mutex<CircuitBreaker>,
}

impl AdaptiveRateLimiter {
    pub fn new(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(AdaptiveRateLimiter {
            clients: Mutex::new(HashMap::new()),
            circuit: Mutex::new(CircuitBreaker::new(now)),
        })
    }

    /// Implements the five-step decision order from spec §4.6:
    /// (1) circuit open -> deny; (2) client blocked -> deny with
    /// remaining cooldown; (3) concurrency limit -> deny with short
    /// retry; (4) token bucket consume; (5) on bucket exhaustion, record
    /// the exceedance and possibly extend the block.
    pub async fn check(&self, ctx: &RequestContext, now: DateTime<Utc>) -> Decision {
        {
            let mut circuit = self.circuit.lock().await;
            if let Some(level) = circuit.maybe_assess(now) {
                if level >= CircuitLevel::Medium {
                    warn!(?level, "circuit breaker severity escalated");
                }
            }
            if circuit.is_open(now) {
                return Decision::DenyCircuitOpen;
            }
        }

        let mut clients = self.clients.lock().await;
        let state = clients
            .entry(ctx.client_id.clone())
            .or_insert_with(|| RateLimitClientState::new(ctx.tier, now));

        if let Some(until) = state.is_blocked(now) {
            return Decision::DenyBlocked {
                retry_after_secs: (until - now).num_seconds().max(1),
            };
        }

        if state.active_concurrent >= ctx.tier.config().max_concurrent {
            return Decision::DenyConcurrencyExceeded { retry_after_secs: 1 };
        }

        state.record_request_metadata(&ctx.user_agent, &ctx.endpoint, &ctx.method);
        let sensitivity = EndpointSensitivity::classify(&ctx.endpoint);

        match state.try_consume(now, ctx.current_load, sensitivity) {
            Some(remaining) => Decision::Allow { remaining },
            None => {
                let signal = ThreatSignal {
                    rolling_error_rate: Some(state.rolling_error_rate()),
                    rolling_request_count: state.counters.requests as u32,
                    consecutive_errors: state.counters.consecutive_errors,
                    unique_user_agents: state.user_agents.len() as u32,
                    requests_per_second: 0.0,
                    status_code: None,
                };
                state.threat_score += score_delta(&signal);
                state.threat_level = ThreatLevel::from_score(state.threat_score);
                let duration = state.trip_block(now);
                Decision::DenyRateExceeded {
                    retry_after_secs: duration.num_seconds(),
                    threat_level: state.threat_level,
                }
            }
        }
    }

    /// Records the outcome of a request that was allowed through, feeding
    /// the threat score and the global circuit breaker's rolling window.
    pub async fn record_outcome(&self, client_id: &str, status_code: u16, now: DateTime<Utc>) {
        let was_error = status_code >= 400;
        {
            let mut circuit = self.circuit.lock().await;
            circuit.record_request(was_error, false);
        }

        let mut clients = self.clients.lock().await;
        if let Some(state) = clients.get_mut(client_id) {
            state.record_outcome(status_code);
            let signal = ThreatSignal {
                status_code: Some(status_code),
                consecutive_errors: state.counters.consecutive_errors,
                rolling_error_rate: Some(state.rolling_error_rate()),
                rolling_request_count: state.counters.requests as u32,
                requests_per_second: 0.0,
                unique_user_agents: state.user_agents.len() as u32,
            };
            state.threat_score += score_delta(&signal);
            state.threat_level = ThreatLevel::from_score(state.threat_score);
            state.last_request_at = now;
        }
    }

    /// Feeds the circuit breaker's rolling window for a request that was
    /// denied before reaching the handler, so block rate (not just error
    /// rate) can trip the breaker (spec §4.6).
    pub async fn record_denied(&self, was_blocked: bool) {
        let mut circuit = self.circuit.lock().await;
        circuit.record_request(false, was_blocked);
    }

    pub async fn enter_concurrent(&self, client_id: &str, tier: RateLimitTier, now: DateTime<Utc>) {
        let mut clients = self.clients.lock().await;
        let state = clients
            .entry(client_id.to_string())
            .or_insert_with(|| RateLimitClientState::new(tier, now));
        state.active_concurrent += 1;
    }

    pub async fn exit_concurrent(&self, client_id: &str) {
        let mut clients = self.clients.lock().await;
        if let Some(state) = clients.get_mut(client_id) {
            state.active_concurrent = state.active_concurrent.saturating_sub(1);
        }
    }

    /// Current threat level for a client, `None`-level if never seen
    /// (spec §6: `X-Threat-Level` rides on every response).
    pub async fn threat_level(&self, client_id: &str) -> ThreatLevel {
        self.clients
            .lock()
            .await
            .get(client_id)
            .map(|s| s.threat_level)
            .unwrap_or(ThreatLevel::None)
    }

    /// Periodic sweep (spec §4.6: every 5 minutes) purging clients that
    /// are idle and currently unblocked, to bound memory growth.
    pub async fn sweep_idle_clients(&self, now: DateTime<Utc>) -> usize {
        let mut clients = self.clients.lock().await;
        let before = clients.len();
        clients.retain(|_, state| !state.is_idle_and_unblocked(now, IDLE_SWEEP_THRESHOLD_SECS));
        before - clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ctx(client_id: &str, endpoint: &str) -> RequestContext {
        RequestContext {
            client_id: client_id.to_string(),
            tier: RateLimitTier::Anonymous,
            endpoint: endpoint.to_string(),
            user_agent: "test-agent".to_string(),
            method: "GET".to_string(),
            current_load: 0.0,
        }
    }

    #[tokio::test]
    async fn allows_requests_within_burst() {
        let now = Utc::now();
        let limiter = AdaptiveRateLimiter::new(now);
        for _ in 0..5 {
            let decision = limiter.check(&ctx("alice", "/lobbies"), now).await;
            assert!(matches!(decision, Decision::Allow { .. }));
        }
    }

    #[tokio::test]
    async fn denies_after_burst_exhausted_and_blocks() {
        let now = Utc::now();
        let limiter = AdaptiveRateLimiter::new(now);
        for _ in 0..5 {
            limiter.check(&ctx("bob", "/lobbies"), now).await;
        }
        let decision = limiter.check(&ctx("bob", "/lobbies"), now).await;
        assert!(matches!(decision, Decision::DenyRateExceeded { .. }));

        let decision_again = limiter.check(&ctx("bob", "/lobbies"), now + Duration::milliseconds(100)).await;
        assert!(matches!(decision_again, Decision::DenyBlocked { .. }));
    }

    #[tokio::test]
    async fn concurrency_limit_denies_once_exceeded() {
        let now = Utc::now();
        let limiter = AdaptiveRateLimiter::new(now);
        for _ in 0..3 {
            limiter.enter_concurrent("carol", RateLimitTier::Anonymous, now).await;
        }
        let decision = limiter.check(&ctx("carol", "/lobbies"), now).await;
        assert!(matches!(decision, Decision::DenyConcurrencyExceeded { .. }));
    }

    #[tokio::test]
    async fn record_denied_feeds_circuit_block_rate() {
        let now = Utc::now();
        let limiter = AdaptiveRateLimiter::new(now);
        for _ in 0..20 {
            limiter.record_denied(true).await;
        }
        let mut circuit = limiter.circuit.lock().await;
        let level = circuit.maybe_assess(now + Duration::seconds(11));
        assert_eq!(level, Some(CircuitLevel::Critical));
    }

    #[tokio::test]
    async fn idle_clients_are_swept() {
        let now = Utc::now();
        let limiter = AdaptiveRateLimiter::new(now);
        limiter.check(&ctx("dana", "/lobbies"), now).await;
        let much_later = now + Duration::seconds(6 * 60);
        let purged = limiter.sweep_idle_clients(much_later).await;
        assert_eq!(purged, 1);
    }
}
