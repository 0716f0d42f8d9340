//! Log reading error types.

use thiserror::Error;

/// Errors that can occur while reading the PostgreSQL log.
#[derive(Debug, Error)]
pub enum LogError {
    /// A required server setting was not available.
    #[error("failed to get {0} setting, cannot read log file")]
    MissingSetting(String),

    #[error("no timestamp escape sequence was found in log_line_prefix")]
    NoTimestamp,

    #[error("invalid log_line_prefix pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("log file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad time format in log line: {text}: {reason}")]
    Timestamp { text: String, reason: String },
}

/// Convenience alias for log reading results.
pub type LogResult<T> = Result<T, LogError>;
