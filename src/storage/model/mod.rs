//! Data models for facts extracted from PostgreSQL logs.
//!
//! - [`postgres`]: captured plans, autovacuum runs and deadlocks, plus the
//!   [`LogFacts`] sink that collects them over one collection cycle.

mod postgres;

pub use postgres::{AutoVacuum, Deadlock, LogFact, LogFacts, Plan, PlanFormat};
