//! Environment variable loading and validation.
//!
//! Modeled on the same `.env`-first pattern the crate was built from: load
//! early in `main()`, then read through typed getters with sane defaults
//! rather than panicking, since every setting here is a tunable rather than
//! a hard requirement.

use std::env;
use std::net::SocketAddr;

/// Loads environment variables from a `.env` file, if present.
pub fn load_env() {
    dotenvy::dotenv().ok();
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    pub ready_check_timeout_secs: i64,
    pub escrow_hours: i64,
    pub rate_limit_cleanup_interval_secs: u64,
    pub ready_check_sweep_interval_secs: u64,
    pub log_filter: String,
}

impl Settings {
    /// Reads all settings from the environment, falling back to the
    /// defaults named throughout spec §4.1, §4.2, and §4.6.
    pub fn from_env() -> Self {
        let bind_addr = env::var("BIND_ADDR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080)));

        Settings {
            bind_addr,
            ready_check_timeout_secs: env_or("READY_CHECK_TIMEOUT_SECS", 60),
            escrow_hours: env_or("ESCROW_HOURS", 24),
            rate_limit_cleanup_interval_secs: env_or("RATE_LIMIT_CLEANUP_INTERVAL_SECS", 5 * 60),
            ready_check_sweep_interval_secs: env_or("READY_CHECK_SWEEP_INTERVAL_SECS", 10),
            log_filter: env::var("RUST_LOG").unwrap_or_else(|_| "info,arena_matchmaking_core=debug".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_is_unset() {
        env::remove_var("READY_CHECK_TIMEOUT_SECS");
        env::remove_var("ESCROW_HOURS");
        let settings = Settings::from_env();
        assert_eq!(settings.ready_check_timeout_secs, 60);
        assert_eq!(settings.escrow_hours, 24);
    }
}
