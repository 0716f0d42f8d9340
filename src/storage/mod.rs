//! In-memory results of a collection cycle.

pub mod model;

pub use model::LogFacts;
