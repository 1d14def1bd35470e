//! HTTP and WebSocket handlers: the thin API layer over the orchestrator,
//! rating engine, and fan-out hub.

pub mod lobby;
pub mod rate_limit_mw;
pub mod rating;
pub mod ws;

pub use lobby::*;
pub use rating::*;
pub use ws::*;
