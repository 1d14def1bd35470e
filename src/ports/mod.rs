//! Injected collaborators (spec §6, §9): the only polymorphism in the core.
//! Everything outside this module that needs persistence or money movement
//! goes through one of these traits.

pub mod demo;
pub mod repository;
pub mod wallet;

pub use repository::{LobbyRepository, PlayerRatingRepository, PrizePoolRepository};
pub use wallet::WalletCommand;
