//! PostgreSQL log file collector.
//!
//! Reads the tail of a stderr-format PostgreSQL log covering the last
//! `log_span_minutes`, rebuilds multi-line entries using the server's
//! `log_line_prefix`, and extracts auto_explain plans, autovacuum runs and
//! deadlocks.
//!
//! A read either completes or contributes nothing: configuration and I/O
//! problems are logged and the collection cycle goes on without log facts.

pub mod classify;
pub mod entry;
pub mod error;
pub mod prefix;
pub mod timestamp;
pub mod window;

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use super::settings::SettingsSource;
use crate::storage::model::LogFacts;

pub use error::{LogError, LogResult};
pub use prefix::PrefixPattern;

/// Default window when none is configured (minutes).
pub const DEFAULT_LOG_SPAN_MINUTES: u32 = 5;

/// Setting holding the prefix format.
pub const LOG_LINE_PREFIX: &str = "log_line_prefix";

/// Log collector configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogCollectorConfig {
    /// How far back from now to read, in minutes.
    pub log_span_minutes: u32,
}

impl Default for LogCollectorConfig {
    fn default() -> Self {
        Self {
            log_span_minutes: DEFAULT_LOG_SPAN_MINUTES,
        }
    }
}

/// Reads plans, autovacuum runs and deadlocks from a PostgreSQL log.
///
/// Holds no per-read state besides the last error, so one collector per
/// monitored server is enough.
#[derive(Debug, Default)]
pub struct LogCollector {
    config: LogCollectorConfig,
    /// Last read failure (for diagnostics)
    last_error: Option<String>,
}

impl LogCollector {
    pub fn new(config: LogCollectorConfig) -> Self {
        Self {
            config,
            last_error: None,
        }
    }

    pub fn config(&self) -> &LogCollectorConfig {
        &self.config
    }

    /// Read the log at `path` and append what was found to `facts`.
    ///
    /// Never fails: a missing `log_line_prefix`, an unusable prefix or an
    /// unreadable file is logged, remembered in [`Self::last_error`], and
    /// leaves `facts` untouched.
    pub fn read_log<S>(&mut self, settings: &mut S, path: &Path, facts: &mut LogFacts)
    where
        S: SettingsSource + ?Sized,
    {
        self.last_error = None;
        match self.try_read_log(settings, path) {
            Ok(found) => {
                debug!(
                    plans = found.plans.len(),
                    autovacuums = found.auto_vacuums.len(),
                    deadlocks = found.deadlocks.len(),
                    "log read complete"
                );
                facts.extend(found);
            }
            Err(e) => {
                warn!(path = %path.display(), "{}", e);
                self.last_error = Some(e.to_string());
            }
        }
    }

    fn try_read_log<S>(&self, settings: &mut S, path: &Path) -> LogResult<LogFacts>
    where
        S: SettingsSource + ?Sized,
    {
        let prefix = settings
            .setting(LOG_LINE_PREFIX)
            .ok_or_else(|| LogError::MissingSetting(LOG_LINE_PREFIX.to_string()))?;
        let prefix = PrefixPattern::compile(&prefix)?;
        read_log_lines(path, &prefix, self.window_start(Utc::now()))
    }

    /// Start of the window ending at `now`.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - TimeDelta::minutes(i64::from(self.config.log_span_minutes))
    }

    /// Returns the last error message, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

/// Read facts from entries at or after `start` in the log at `path`.
///
/// Only the tail of the file that can contain such entries is read.
pub fn read_log_lines(
    path: &Path,
    prefix: &PrefixPattern,
    start: DateTime<Utc>,
) -> LogResult<LogFacts> {
    let mut file = File::open(path)?;
    let len = file.seek(SeekFrom::End(0))?;
    if len == 0 {
        return Ok(LogFacts::new());
    }

    let offset = window::locate_window_start(&mut file, len, prefix, start)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; (len - offset) as usize];
    file.read_exact(&mut buf)?;

    let mut facts = LogFacts::new();
    let stats = entry::scan_entries(&buf, prefix, start, |entry| {
        if let Some(fact) = classify::classify(&entry) {
            facts.push(fact);
        }
    });
    debug!(
        offset,
        bytes = buf.len(),
        lines = stats.lines,
        entries = stats.entries,
        skipped = stats.skipped,
        stopped_early = stats.stopped_early,
        "log scanned"
    );

    Ok(facts)
}
