//! Log collection for PostgreSQL servers.
//!
//! ```text
//!  SettingsSource ──log_line_prefix──► PrefixPattern
//!                                          │
//!  log file ──► window::locate_window_start│
//!                    │ offset              │
//!                    ▼                     ▼
//!               entry::scan_entries ──► classify::classify ──► LogFacts
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::path::Path;
//!
//! use pglogscan::collector::{LogCollector, LogCollectorConfig};
//! use pglogscan::storage::model::LogFacts;
//!
//! let mut settings = HashMap::new();
//! settings.insert("log_line_prefix".to_string(), "%m [%p] ".to_string());
//!
//! let mut collector = LogCollector::new(LogCollectorConfig { log_span_minutes: 5 });
//! let mut facts = LogFacts::new();
//! collector.read_log(&mut settings, Path::new("/var/log/postgresql/postgresql.log"), &mut facts);
//! ```

pub mod log_collector;
pub mod settings;

pub use log_collector::{LogCollector, LogCollectorConfig, LogError, LogResult, PrefixPattern};
pub use settings::{SettingsError, SettingsSource};
