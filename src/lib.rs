//! pglogscan - PostgreSQL log ingestion for metrics collection.
//!
//! Provides:
//! - `collector`: windowed log reading, entry reassembly and fact extraction
//! - `storage`: fact models (plans, autovacuum runs, deadlocks)

pub mod collector;
pub mod storage;
