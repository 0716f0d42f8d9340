//! `log_line_prefix` compiler.
//!
//! PostgreSQL lets every server choose what goes in front of each stderr log
//! line via `%`-escapes. To split the log back into lines we translate that
//! format into a regex in two stages: [`parse_directives`] turns the format
//! into typed tokens, [`render_pattern`] turns tokens into regex source.
//! Only the timestamp, user and database escapes are captured by name.

use regex::bytes::Regex;

use super::error::{LogError, LogResult};

/// Which timestamp escape produced a capture group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampKind {
    /// `%t`: `YYYY-MM-DD HH:MM:SS TZ`.
    Seconds,
    /// `%m`: `YYYY-MM-DD HH:MM:SS.fff TZ`.
    Millis,
    /// `%n`: Unix epoch `seconds.fraction`.
    Epoch,
}

impl TimestampKind {
    /// Name of the regex capture group for this kind.
    pub fn group(self) -> &'static str {
        match self {
            TimestampKind::Seconds => "t",
            TimestampKind::Millis => "m",
            TimestampKind::Epoch => "n",
        }
    }
}

/// Session fields captured by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    User,
    Database,
}

/// One element of a parsed `log_line_prefix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefixToken {
    Literal(char),
    Timestamp(TimestampKind),
    Field(FieldKind),
    /// `%s`: session start time, matched but not captured.
    ProcessStart,
    /// `%q`: everything after this point is optional.
    OptionalStart,
    /// Any other escape; matched as an optional run of non-whitespace.
    Other(char),
}

/// Compiled `log_line_prefix` matcher.
#[derive(Debug, Clone)]
pub struct PrefixPattern {
    regex: Regex,
    timestamps: Vec<TimestampKind>,
}

impl PrefixPattern {
    /// Compile a raw `log_line_prefix` value.
    pub fn compile(prefix: &str) -> LogResult<Self> {
        let tokens = parse_directives(prefix);
        let timestamps: Vec<TimestampKind> = tokens
            .iter()
            .filter_map(|t| match t {
                PrefixToken::Timestamp(kind) => Some(*kind),
                _ => None,
            })
            .collect();
        if timestamps.is_empty() {
            return Err(LogError::NoTimestamp);
        }

        let regex = Regex::new(&render_pattern(&tokens))?;
        Ok(Self { regex, timestamps })
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn has_timestamp(&self, kind: TimestampKind) -> bool {
        self.timestamps.contains(&kind)
    }
}

/// Split a `log_line_prefix` into tokens.
///
/// A trailing lone `%` is dropped, which is what PostgreSQL itself does.
pub fn parse_directives(prefix: &str) -> Vec<PrefixToken> {
    let mut tokens = Vec::with_capacity(prefix.len());
    let mut chars = prefix.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            tokens.push(PrefixToken::Literal(c));
            continue;
        }
        let Some(escape) = chars.next() else {
            break;
        };
        tokens.push(match escape {
            't' => PrefixToken::Timestamp(TimestampKind::Seconds),
            'm' => PrefixToken::Timestamp(TimestampKind::Millis),
            'n' => PrefixToken::Timestamp(TimestampKind::Epoch),
            'u' => PrefixToken::Field(FieldKind::User),
            'd' => PrefixToken::Field(FieldKind::Database),
            's' => PrefixToken::ProcessStart,
            'q' => PrefixToken::OptionalStart,
            other => PrefixToken::Other(other),
        });
    }

    tokens
}

/// Render tokens into regex source with named groups `t`, `m`, `n`, `u`, `d`.
pub fn render_pattern(tokens: &[PrefixToken]) -> String {
    let mut pattern = String::new();
    let mut optional = false;
    let mut buf = [0u8; 4];

    for token in tokens {
        match token {
            PrefixToken::Literal(c) => pattern.push_str(&regex::escape(c.encode_utf8(&mut buf))),
            PrefixToken::Timestamp(TimestampKind::Seconds) => {
                pattern.push_str(r"(?P<t>[0-9]{4}-[0-9]{1,2}-[0-9]{1,2} [0-9]{2}:[0-9]{2}:[0-9]{2} \S+)")
            }
            PrefixToken::Timestamp(TimestampKind::Millis) => {
                pattern.push_str(r"(?P<m>[0-9]{4}-[0-9]{1,2}-[0-9]{1,2} [0-9]{2}:[0-9]{2}:[0-9]{2}\.[0-9]+ \S+)")
            }
            PrefixToken::Timestamp(TimestampKind::Epoch) => pattern.push_str(r"(?P<n>[0-9]+\.[0-9]+)"),
            PrefixToken::Field(FieldKind::User) => {
                pattern.push_str(r"(?P<u>[A-Za-z0-9_.\[\]-]{1,64})")
            }
            PrefixToken::Field(FieldKind::Database) => {
                pattern.push_str(r"(?P<d>[A-Za-z0-9_.\[\]-]{1,64})")
            }
            PrefixToken::ProcessStart => {
                pattern.push_str(r"[0-9]{4}-[0-9]{1,2}-[0-9]{1,2} [0-9]{2}:[0-9]{2}:[0-9]{2} \S+")
            }
            PrefixToken::OptionalStart => {
                pattern.push_str("(?:");
                optional = true;
            }
            PrefixToken::Other(_) => pattern.push_str(r"(\S+)?"),
        }
    }

    if optional {
        pattern.push_str(")?");
    }
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named<'a>(pattern: &PrefixPattern, line: &'a str, name: &str) -> Option<&'a str> {
        let caps = pattern.regex().captures(line.as_bytes())?;
        caps.name(name)
            .map(|m| std::str::from_utf8(m.as_bytes()).unwrap())
    }

    #[test]
    fn test_parse_directives() {
        let tokens = parse_directives("%t [%p] %q%u@%d ");
        assert_eq!(
            tokens,
            vec![
                PrefixToken::Timestamp(TimestampKind::Seconds),
                PrefixToken::Literal(' '),
                PrefixToken::Literal('['),
                PrefixToken::Other('p'),
                PrefixToken::Literal(']'),
                PrefixToken::Literal(' '),
                PrefixToken::OptionalStart,
                PrefixToken::Field(FieldKind::User),
                PrefixToken::Literal('@'),
                PrefixToken::Field(FieldKind::Database),
                PrefixToken::Literal(' '),
            ]
        );
    }

    #[test]
    fn test_trailing_percent_dropped() {
        let tokens = parse_directives("%m %");
        assert_eq!(
            tokens,
            vec![
                PrefixToken::Timestamp(TimestampKind::Millis),
                PrefixToken::Literal(' '),
            ]
        );
    }

    #[test]
    fn test_render_escapes_literals() {
        let pattern = render_pattern(&parse_directives("%n [x.y] "));
        assert_eq!(pattern, r"(?P<n>[0-9]+\.[0-9]+) \[x\.y\] ");
    }

    #[test]
    fn test_render_closes_optional_group() {
        let pattern = render_pattern(&parse_directives("%t %qdb=%d "));
        assert!(pattern.contains("(?:db="));
        assert!(pattern.ends_with(")?"));
    }

    #[test]
    fn test_no_timestamp_fails() {
        let err = PrefixPattern::compile("[%p] %u@%d ").unwrap_err();
        assert!(matches!(err, LogError::NoTimestamp));
        assert!(PrefixPattern::compile("").is_err());
    }

    #[test]
    fn test_timestamp_kinds_recorded() {
        let pattern = PrefixPattern::compile("%m [%p] ").unwrap();
        assert!(pattern.has_timestamp(TimestampKind::Millis));
        assert!(!pattern.has_timestamp(TimestampKind::Seconds));
        assert!(!pattern.has_timestamp(TimestampKind::Epoch));
    }

    #[test]
    fn test_user_db_in_any_order() {
        for (format, line) in [
            ("%t [%u@%d] ", "2024-01-15 10:30:00 UTC [alice@mydb] LOG:  x"),
            ("%d %u %t: ", "mydb alice 2024-01-15 10:30:00 UTC: LOG:  x"),
            ("%u|%t|%d|", "alice|2024-01-15 10:30:00 UTC|mydb|LOG:  x"),
        ] {
            let pattern = PrefixPattern::compile(format).unwrap();
            assert_eq!(named(&pattern, line, "t"), Some("2024-01-15 10:30:00 UTC"));
            assert_eq!(named(&pattern, line, "u"), Some("alice"));
            assert_eq!(named(&pattern, line, "d"), Some("mydb"));
        }
    }

    #[test]
    fn test_process_start_not_captured() {
        let pattern = PrefixPattern::compile("%m %s ").unwrap();
        let line = "2024-01-15 10:30:00.123 UTC 2024-01-15 09:00:00 UTC LOG:  x";
        assert_eq!(
            named(&pattern, line, "m"),
            Some("2024-01-15 10:30:00.123 UTC")
        );
        assert_eq!(pattern.regex().captures_len(), 2);
    }

    #[test]
    fn test_non_ascii_digits_do_not_match() {
        let pattern = PrefixPattern::compile("%t [%p] ").unwrap();
        let line = "٢٠٢٤-01-15 10:30:00 UTC [42] LOG:  x";
        assert!(pattern.regex().captures(line.as_bytes()).is_none());
    }

    #[test]
    fn test_optional_tail() {
        let pattern = PrefixPattern::compile("%t [%p] %quser=%u ").unwrap();
        let with = "2024-01-15 10:30:00 UTC [42] user=bob LOG:  x";
        let without = "2024-01-15 10:30:00 UTC [42] LOG:  x";
        assert_eq!(named(&pattern, with, "u"), Some("bob"));
        assert_eq!(named(&pattern, without, "u"), None);
        assert_eq!(named(&pattern, without, "t"), Some("2024-01-15 10:30:00 UTC"));
    }
}
