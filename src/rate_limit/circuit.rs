//! Global circuit breaker (spec §4.6): a system-wide safety valve that
//! opens when aggregate error/block rates spike, independent of any
//! single client's state.

use chrono::{DateTime, Duration, Utc};

const ASSESSMENT_INTERVAL_SECS: i64 = 10;
/// Default circuit-open timeout (spec §4.6, §8 scenario 6): 30 seconds.
pub const DEFAULT_OPEN_SECS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
}

/// Severity classification of the rolling window (spec §4.6); only
/// `Critical` actually opens the breaker, the rest are observability signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CircuitLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl CircuitLevel {
    fn from_rates(error_rate: f64, block_rate: f64) -> CircuitLevel {
        if error_rate > 0.5 || block_rate > 0.3 {
            CircuitLevel::Critical
        } else if error_rate > 0.3 || block_rate > 0.2 {
            CircuitLevel::High
        } else if error_rate > 0.1 || block_rate > 0.1 {
            CircuitLevel::Medium
        } else if error_rate > 0.05 || block_rate > 0.05 {
            CircuitLevel::Low
        } else {
            CircuitLevel::None
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WindowCounters {
    pub total_requests: u64,
    pub total_errors: u64,
    pub total_blocks: u64,
}

impl WindowCounters {
    fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_errors as f64 / self.total_requests as f64
        }
    }

    fn block_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_blocks as f64 / self.total_requests as f64
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: CircuitState,
    opened_until: Option<DateTime<Utc>>,
    last_assessment_at: DateTime<Utc>,
    window: WindowCounters,
    open_duration: Duration,
}

impl CircuitBreaker {
    pub fn new(now: DateTime<Utc>) -> Self {
        CircuitBreaker {
            state: CircuitState::Closed,
            opened_until: None,
            last_assessment_at: now,
            window: WindowCounters::default(),
            open_duration: Duration::seconds(DEFAULT_OPEN_SECS),
        }
    }

    pub fn is_open(&mut self, now: DateTime<Utc>) -> bool {
        if let Some(until) = self.opened_until {
            if now >= until {
                self.state = CircuitState::Closed;
                self.opened_until = None;
                self.window = WindowCounters::default();
            }
        }
        self.state == CircuitState::Open
    }

    pub fn record_request(&mut self, was_error: bool, was_blocked: bool) {
        self.window.total_requests += 1;
        if was_error {
            self.window.total_errors += 1;
        }
        if was_blocked {
            self.window.total_blocks += 1;
        }
    }

    /// Assesses the rolling window every `ASSESSMENT_INTERVAL_SECS` and
    /// returns the severity level observed. Only `Critical` opens the
    /// circuit; the rest feed observability (spec §4.6).
    pub fn maybe_assess(&mut self, now: DateTime<Utc>) -> Option<CircuitLevel> {
        if (now - self.last_assessment_at) < Duration::seconds(ASSESSMENT_INTERVAL_SECS) {
            return None;
        }
        self.last_assessment_at = now;

        if self.window.total_requests < 20 {
            return None;
        }

        let level = CircuitLevel::from_rates(self.window.error_rate(), self.window.block_rate());
        if level == CircuitLevel::Critical {
            self.state = CircuitState::Open;
            self.opened_until = Some(now + self.open_duration);
        }
        self.window = WindowCounters::default();
        Some(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_closed_under_light_error_load() {
        let now = Utc::now();
        let mut breaker = CircuitBreaker::new(now);
        for _ in 0..20 {
            breaker.record_request(false, false);
        }
        breaker.maybe_assess(now + Duration::seconds(11));
        assert!(!breaker.is_open(now + Duration::seconds(11)));
    }

    #[test]
    fn opens_on_high_error_rate() {
        let now = Utc::now();
        let mut breaker = CircuitBreaker::new(now);
        for _ in 0..15 {
            breaker.record_request(true, false);
        }
        for _ in 0..5 {
            breaker.record_request(false, false);
        }
        let later = now + Duration::seconds(11);
        breaker.maybe_assess(later);
        assert!(breaker.is_open(later));
    }

    #[test]
    fn closes_again_after_open_duration_elapses() {
        let now = Utc::now();
        let mut breaker = CircuitBreaker::new(now);
        for _ in 0..20 {
            breaker.record_request(true, false);
        }
        let assess_at = now + Duration::seconds(11);
        breaker.maybe_assess(assess_at);
        assert!(breaker.is_open(assess_at));

        let after_cooldown = assess_at + Duration::seconds(31);
        assert!(!breaker.is_open(after_cooldown));
    }

    #[test]
    fn does_not_assess_below_sample_floor() {
        let now = Utc::now();
        let mut breaker = CircuitBreaker::new(now);
        for _ in 0..5 {
            breaker.record_request(true, false);
        }
        let later = now + Duration::seconds(11);
        breaker.maybe_assess(later);
        assert!(!breaker.is_open(later));
    }

    #[test]
    fn medium_error_rate_is_reported_without_opening() {
        let now = Utc::now();
        let mut breaker = CircuitBreaker::new(now);
        for _ in 0..3 {
            breaker.record_request(true, false);
        }
        for _ in 0..17 {
            breaker.record_request(false, false);
        }
        let later = now + Duration::seconds(11);
        let level = breaker.maybe_assess(later);
        assert_eq!(level, Some(CircuitLevel::Medium));
        assert!(!breaker.is_open(later));
    }
}
