pub mod bucket;
pub mod circuit;
pub mod limiter;
pub mod threat;
pub mod tiers;

pub use bucket::RateLimitClientState;
pub use circuit::{CircuitBreaker, CircuitLevel, DEFAULT_OPEN_SECS as CIRCUIT_DEFAULT_OPEN_SECS};
pub use limiter::{AdaptiveRateLimiter, Decision, RequestContext};
pub use threat::{EndpointSensitivity, ThreatLevel, ThreatSignal};
pub use tiers::{RateLimitTier, TierConfig};
