//! Threat scoring and endpoint sensitivity (spec §4.6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ThreatLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    pub fn from_score(score: f64) -> ThreatLevel {
        if score >= 100.0 {
            ThreatLevel::Critical
        } else if score >= 50.0 {
            ThreatLevel::High
        } else if score >= 25.0 {
            ThreatLevel::Medium
        } else if score >= 10.0 {
            ThreatLevel::Low
        } else {
            ThreatLevel::None
        }
    }

    pub fn rate_multiplier(&self) -> f64 {
        match self {
            ThreatLevel::None => 1.0,
            ThreatLevel::Low => 0.8,
            ThreatLevel::Medium => 0.5,
            ThreatLevel::High => 0.2,
            ThreatLevel::Critical => 0.05,
        }
    }

    /// Index into the escalating-block table's `(1 + 0.5 * level)` multiplier (spec §4.6).
    pub fn block_duration_multiplier(&self) -> f64 {
        let level_index = match self {
            ThreatLevel::None => 0.0,
            ThreatLevel::Low => 1.0,
            ThreatLevel::Medium => 2.0,
            ThreatLevel::High => 3.0,
            ThreatLevel::Critical => 4.0,
        };
        1.0 + 0.5 * level_index
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSensitivity {
    Critical,
    High,
    Medium,
    Low,
}

impl EndpointSensitivity {
    pub fn rate_multiplier(&self) -> f64 {
        match self {
            EndpointSensitivity::Critical => 0.1,
            EndpointSensitivity::High => 0.3,
            EndpointSensitivity::Medium => 0.6,
            EndpointSensitivity::Low => 1.0,
        }
    }

    /// Classifies an endpoint path by the sensitive-surface keywords in
    /// spec §4.6 (authentication, password reset, MFA, wallet withdraw,
    /// payments, admin).
    pub fn classify(endpoint: &str) -> EndpointSensitivity {
        let lower = endpoint.to_ascii_lowercase();
        const CRITICAL_KEYWORDS: &[&str] = &["password-reset", "password_reset", "mfa", "withdraw"];
        const HIGH_KEYWORDS: &[&str] = &["login", "auth", "payment", "admin"];

        if CRITICAL_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            EndpointSensitivity::Critical
        } else if HIGH_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            EndpointSensitivity::High
        } else {
            EndpointSensitivity::Low
        }
    }
}

/// Accumulated, per-request contributions to a client's running threat
/// score (spec §4.6). Each field is additive; callers sum what applies.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreatSignal {
    pub status_code: Option<u16>,
    pub consecutive_errors: u32,
    pub rolling_error_rate: Option<f64>,
    pub rolling_request_count: u32,
    pub requests_per_second: f64,
    pub unique_user_agents: u32,
}

pub fn score_delta(signal: &ThreatSignal) -> f64 {
    let mut delta = 0.0;

    match signal.status_code {
        Some(401) | Some(403) => delta += 10.0,
        Some(400) => delta += 2.0,
        Some(404) => delta += 1.0,
        _ => {}
    }

    if signal.consecutive_errors > 5 {
        delta += 5.0 * signal.consecutive_errors as f64;
    }

    if let Some(error_rate) = signal.rolling_error_rate {
        if error_rate > 0.5 && signal.rolling_request_count > 10 {
            delta += 20.0;
        }
    }

    if signal.requests_per_second > 10.0 {
        delta += signal.requests_per_second;
    }

    if signal.unique_user_agents > 5 {
        delta += 3.0 * signal.unique_user_agents as f64;
    }

    delta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_thresholds_match_spec() {
        assert_eq!(ThreatLevel::from_score(0.0), ThreatLevel::None);
        assert_eq!(ThreatLevel::from_score(10.0), ThreatLevel::Low);
        assert_eq!(ThreatLevel::from_score(25.0), ThreatLevel::Medium);
        assert_eq!(ThreatLevel::from_score(50.0), ThreatLevel::High);
        assert_eq!(ThreatLevel::from_score(100.0), ThreatLevel::Critical);
    }

    #[test]
    fn endpoint_classification_catches_sensitive_keywords() {
        assert_eq!(
            EndpointSensitivity::classify("/api/wallet/withdraw"),
            EndpointSensitivity::Critical
        );
        assert_eq!(
            EndpointSensitivity::classify("/api/admin/ban"),
            EndpointSensitivity::High
        );
        assert_eq!(
            EndpointSensitivity::classify("/api/lobbies"),
            EndpointSensitivity::Low
        );
    }

    #[test]
    fn auth_failure_burst_crosses_medium_threshold() {
        // Three 401s in a row: 3 * 10 = 30 >= 25 (Medium).
        let total: f64 = (0..3)
            .map(|_| {
                score_delta(&ThreatSignal {
                    status_code: Some(401),
                    ..Default::default()
                })
            })
            .sum();
        assert!(total >= 25.0);
        assert_eq!(ThreatLevel::from_score(total), ThreatLevel::Medium);
    }
}
