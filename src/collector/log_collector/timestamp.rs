//! Timestamp decoding for `%t`, `%m` and `%n` prefix captures.

use std::borrow::Cow;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use regex::bytes::Captures;

use super::error::{LogError, LogResult};
use super::prefix::{PrefixPattern, TimestampKind};

/// Decoding order when a prefix carries several timestamp escapes.
const PREFERENCE: [TimestampKind; 3] = [
    TimestampKind::Millis,
    TimestampKind::Seconds,
    TimestampKind::Epoch,
];

/// Decode the timestamp of a prefix match.
///
/// `%m` wins over `%t`, which wins over `%n`. Returns `Ok(None)` when none of
/// the timestamp groups took part in the match (e.g. inside an unmatched `%q`
/// tail).
pub fn decode(prefix: &PrefixPattern, caps: &Captures<'_>) -> LogResult<Option<DateTime<Utc>>> {
    for kind in PREFERENCE {
        if !prefix.has_timestamp(kind) {
            continue;
        }
        let Some(text) = group_text(caps, kind.group()) else {
            continue;
        };
        return match kind {
            TimestampKind::Epoch => parse_epoch(&text),
            TimestampKind::Seconds | TimestampKind::Millis => parse_datetime(&text),
        }
        .map(Some);
    }
    Ok(None)
}

/// Non-empty text of a named capture.
pub(crate) fn group_text<'h>(caps: &Captures<'h>, name: &str) -> Option<Cow<'h, str>> {
    caps.name(name)
        .map(|m| m.as_bytes())
        .filter(|b| !b.is_empty())
        .map(String::from_utf8_lossy)
}

/// Zone token of a `%t` / `%m` timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Zone {
    Fixed(FixedOffset),
    /// An abbreviation such as `EST` or `CET`, resolved in the host zone.
    Named,
}

/// Parse `YYYY-MM-DD HH:MM:SS[.fff] ZONE` using the host's local zone for
/// zone names.
pub fn parse_datetime(text: &str) -> LogResult<DateTime<Utc>> {
    parse_datetime_in(text, &Local)
}

/// Parse `YYYY-MM-DD HH:MM:SS[.fff] ZONE`.
///
/// `UTC`, `GMT` and numeric zones (`+03`, `-0530`, `+05:30`) are applied as
/// written. Any other zone name is resolved against `local`, since the log is
/// read on the host that wrote it. A time that falls in a DST fold takes the
/// earlier instant.
pub fn parse_datetime_in<Tz: TimeZone>(text: &str, local: &Tz) -> LogResult<DateTime<Utc>> {
    let (datetime, zone) = text.rsplit_once(' ').ok_or_else(|| bad(text, "missing zone"))?;
    let naive = NaiveDateTime::parse_from_str(datetime, "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|e| bad(text, &e.to_string()))?;
    let zone = parse_zone(zone).ok_or_else(|| bad(text, "invalid zone offset"))?;

    let resolved = match zone {
        Zone::Fixed(offset) => offset
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
        Zone::Named => local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
    };
    resolved.ok_or_else(|| bad(text, "nonexistent local time"))
}

fn parse_zone(zone: &str) -> Option<Zone> {
    let (sign, digits) = match zone.as_bytes().first() {
        Some(b'+') => (1, &zone[1..]),
        Some(b'-') => (-1, &zone[1..]),
        _ if matches!(zone, "UTC" | "GMT" | "Z") => {
            return FixedOffset::east_opt(0).map(Zone::Fixed);
        }
        _ => return Some(Zone::Named),
    };
    let digits = digits.replace(':', "");
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).map(Zone::Fixed)
}

/// Parse `%n`: Unix epoch seconds with an optional fraction.
pub fn parse_epoch(text: &str) -> LogResult<DateTime<Utc>> {
    let mut parts = text.split('.');
    let secs = parts.next().unwrap_or_default();
    let fraction = parts.next();
    if parts.next().is_some() {
        return Err(bad(text, "wrong %n format"));
    }

    let secs: i64 = secs.parse().map_err(|_| bad(text, "invalid seconds"))?;
    let nanos = match fraction {
        Some(f) if !f.is_empty() => {
            if !f.bytes().all(|b| b.is_ascii_digit()) {
                return Err(bad(text, "invalid fraction"));
            }
            let mut digits: String = f.chars().take(9).collect();
            while digits.len() < 9 {
                digits.push('0');
            }
            digits.parse::<u32>().map_err(|_| bad(text, "invalid fraction"))?
        }
        _ => 0,
    };

    DateTime::from_timestamp(secs, nanos).ok_or_else(|| bad(text, "out of range"))
}

fn bad(text: &str, reason: &str) -> LogError {
    LogError::Timestamp {
        text: text.to_string(),
        reason: reason.to_string(),
    }
}
