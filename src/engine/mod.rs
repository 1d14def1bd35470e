pub mod rating_engine;

pub use rating_engine::RatingEngine;
