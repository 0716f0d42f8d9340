//! Reassembly of multi-line log entries.
//!
//! A PostgreSQL message is one line with a top-level severity (`LOG`,
//! `ERROR`, ...) followed by any number of prefixed lines with secondary
//! levels (`DETAIL`, `HINT`, `CONTEXT`, `STATEMENT`, ...). Raw lines without
//! a prefix (multi-line statements, plans) stay part of the line before them.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, trace};

use super::prefix::PrefixPattern;
use super::timestamp::{self, group_text};

/// Levels that start a new entry. Anything else continues the current one.
pub const SEVERITIES: &[&str] = &[
    "DEBUG", "LOG", "INFO", "NOTICE", "WARNING", "ERROR", "FATAL", "PANIC",
];

static LOG_LEVEL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([A-Z]+):\s+").unwrap());

/// One prefixed line, with any following unprefixed raw lines folded in.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLine {
    pub at: DateTime<Utc>,
    pub user: String,
    pub database: String,
    /// Level token without the colon; empty if the line has none.
    pub level: String,
    /// Text after the prefix and level token.
    pub text: String,
}

impl RawLine {
    /// Build a line from the text that follows its prefix.
    ///
    /// Strips one trailing newline and a leading `LEVEL:` token.
    pub fn new(at: DateTime<Utc>, user: String, database: String, text: &str) -> Self {
        let text = text.strip_suffix('\n').unwrap_or(text);
        let (level, text) = match LOG_LEVEL.captures(text) {
            Some(caps) => (caps[1].to_string(), &text[caps[0].len()..]),
            None => (String::new(), text),
        };
        Self {
            at,
            user,
            database,
            level,
            text: text.to_string(),
        }
    }

    /// Does this line begin a new entry?
    pub fn is_start(&self) -> bool {
        SEVERITIES.contains(&self.level.as_str())
    }
}

/// A continuation part of an entry (`DETAIL`, `CONTEXT`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct EntryExtra {
    pub level: String,
    pub line: String,
}

/// A complete log message.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub user: String,
    pub database: String,
    pub level: String,
    pub line: String,
    pub extra: Vec<EntryExtra>,
}

impl LogEntry {
    /// Text of the first extra with the given level.
    pub fn get(&self, level: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|e| e.level == level)
            .map(|e| e.line.as_str())
    }
}

impl From<RawLine> for LogEntry {
    fn from(line: RawLine) -> Self {
        Self {
            at: line.at,
            user: line.user,
            database: line.database,
            level: line.level,
            line: line.text,
            extra: Vec::new(),
        }
    }
}

/// Accumulates lines into entries, one entry in progress at a time.
#[derive(Debug, Default)]
pub struct EntryAssembler {
    current: Option<LogEntry>,
}

impl EntryAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line. Returns the previous entry once a new one starts.
    pub fn push(&mut self, line: RawLine) -> Option<LogEntry> {
        if line.is_start() {
            return self.current.replace(LogEntry::from(line));
        }
        match &mut self.current {
            Some(entry) => entry.extra.push(EntryExtra {
                level: line.level,
                line: line.text,
            }),
            None => trace!(level = %line.level, "continuation without entry dropped"),
        }
        None
    }

    /// Seal the entry in progress, if any.
    pub fn finish(self) -> Option<LogEntry> {
        self.current
    }
}

/// Counters for one forward scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Prefixed lines inside the window.
    pub lines: usize,
    /// Entries handed to the callback.
    pub entries: usize,
    /// Prefixed lines dropped for being before the window or undated.
    pub skipped: usize,
    /// The scan ended at a timestamp that did not decode.
    pub stopped_early: bool,
}

/// Split `buf` into entries and hand each one, in file order, to `on_entry`.
///
/// Bytes before the first prefix match are ignored. Lines dated before
/// `start` are dropped. A prefix whose timestamp cannot be decoded ends the
/// scan; entries already handed out stand, the one in progress is dropped.
pub fn scan_entries<F>(
    buf: &[u8],
    prefix: &PrefixPattern,
    start: DateTime<Utc>,
    mut on_entry: F,
) -> ScanStats
where
    F: FnMut(LogEntry),
{
    let mut stats = ScanStats::default();
    let mut assembler = EntryAssembler::new();
    let mut matches = prefix
        .regex()
        .captures_iter(buf)
        .filter(|caps| caps.get(0).is_some_and(|m| !m.is_empty()))
        .peekable();

    while let Some(caps) = matches.next() {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let end = matches
            .peek()
            .and_then(|next| next.get(0))
            .map_or(buf.len(), |m| m.start());

        let at = match timestamp::decode(prefix, &caps) {
            Ok(Some(at)) => at,
            Ok(None) => {
                stats.skipped += 1;
                continue;
            }
            Err(e) => {
                debug!(error = %e, offset = whole.start(), "stopping log scan");
                stats.stopped_early = true;
                return stats;
            }
        };
        if at < start {
            stats.skipped += 1;
            continue;
        }

        let user = group_text(&caps, "u")
            .map(|s| s.into_owned())
            .unwrap_or_default();
        let database = group_text(&caps, "d")
            .map(|s| s.into_owned())
            .unwrap_or_default();
        let text = String::from_utf8_lossy(&buf[whole.end()..end]);

        stats.lines += 1;
        if let Some(entry) = assembler.push(RawLine::new(at, user, database, &text)) {
            stats.entries += 1;
            on_entry(entry);
        }
    }

    if let Some(entry) = assembler.finish() {
        stats.entries += 1;
        on_entry(entry);
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn epoch() -> DateTime<Utc> {
        Utc.timestamp_opt(0, 0).unwrap()
    }

    fn collect(prefix: &str, log: &str, start: DateTime<Utc>) -> (Vec<LogEntry>, ScanStats) {
        let pattern = PrefixPattern::compile(prefix).unwrap();
        let mut entries = Vec::new();
        let stats = scan_entries(log.as_bytes(), &pattern, start, |e| entries.push(e));
        (entries, stats)
    }

    #[test]
    fn test_raw_line_strips_level_and_newline() {
        let line = RawLine::new(epoch(), String::new(), String::new(), "ERROR:  syntax error\n");
        assert_eq!(line.level, "ERROR");
        assert_eq!(line.text, "syntax error");
        assert!(line.is_start());

        let line = RawLine::new(epoch(), String::new(), String::new(), "no level here\n\n");
        assert_eq!(line.level, "");
        assert_eq!(line.text, "no level here\n");
        assert!(!line.is_start());
    }

    #[test]
    fn test_single_entry_fields() {
        let (entries, _) = collect(
            "%t [%u@%d] ",
            "2024-01-15 10:30:00 UTC [alice@mydb] ERROR:  syntax error\n",
            epoch(),
        );
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.at, Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap());
        assert_eq!(e.user, "alice");
        assert_eq!(e.database, "mydb");
        assert_eq!(e.level, "ERROR");
        assert_eq!(e.line, "syntax error");
        assert!(e.extra.is_empty());
    }

    #[test]
    fn test_continuation_lines_attach() {
        let log = "\
2024-01-15 10:30:00 UTC [alice@mydb] ERROR:  deadlock detected
2024-01-15 10:30:00 UTC [alice@mydb] DETAIL:  Process 1 waits for ShareLock
2024-01-15 10:30:00 UTC [alice@mydb] HINT:  See server log
2024-01-15 10:30:01 UTC [bob@mydb] LOG:  checkpoint starting: time
";
        let (entries, stats) = collect("%t [%u@%d] ", log, epoch());
        assert_eq!(entries.len(), 2);
        assert_eq!(stats.lines, 4);
        assert_eq!(entries[0].extra.len(), 2);
        assert_eq!(entries[0].get("DETAIL"), Some("Process 1 waits for ShareLock"));
        assert_eq!(entries[0].get("HINT"), Some("See server log"));
        assert_eq!(entries[0].get("CONTEXT"), None);
        assert_eq!(entries[1].user, "bob");
        assert!(entries[1].extra.is_empty());
    }

    #[test]
    fn test_unprefixed_lines_fold_into_line() {
        let log = "\
2024-01-15 10:30:00 UTC [1] LOG:  statement: SELECT
\t1
2024-01-15 10:30:01 UTC [1] LOG:  done
";
        let (entries, _) = collect("%t [%p] ", log, epoch());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].line, "statement: SELECT\n\t1");
    }

    #[test]
    fn test_lines_before_window_dropped() {
        let log = "\
2024-01-15 10:00:00 UTC [1] LOG:  old
2024-01-15 10:00:00 UTC [1] DETAIL:  old detail
2024-01-15 10:30:00 UTC [1] LOG:  new
";
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 10, 15, 0).unwrap();
        let (entries, stats) = collect("%t [%p] ", log, start);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].line, "new");
        assert_eq!(stats.skipped, 2);
    }

    #[test]
    fn test_orphan_continuation_dropped() {
        let log = "\
2024-01-15 10:30:00 UTC [1] DETAIL:  orphan
2024-01-15 10:30:01 UTC [1] LOG:  real
";
        let (entries, _) = collect("%t [%p] ", log, epoch());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].line, "real");
        assert!(entries[0].extra.is_empty());
    }

    #[test]
    fn test_bad_timestamp_stops_scan() {
        let log = "\
2024-01-15 10:30:00 UTC [1] LOG:  first
2024-01-15 10:30:01 UTC [1] LOG:  second
2024-13-45 10:30:02 UTC [1] LOG:  broken
2024-01-15 10:30:03 UTC [1] LOG:  never seen
";
        let (entries, stats) = collect("%t [%p] ", log, epoch());
        assert!(stats.stopped_early);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].line, "first");
    }

    #[test]
    fn test_leading_garbage_ignored() {
        let log = "tail of a previous line\n2024-01-15 10:30:00 UTC [1] LOG:  x\n";
        let (entries, _) = collect("%t [%p] ", log, epoch());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].line, "x");
    }

    #[test]
    fn test_empty_input() {
        let (entries, stats) = collect("%t [%p] ", "", epoch());
        assert!(entries.is_empty());
        assert_eq!(stats, ScanStats::default());
    }
}
