//! Backward block scan for the start of the time window.
//!
//! Reading a multi-gigabyte log to find the last few minutes is wasteful, so
//! we walk back from EOF in fixed blocks until one begins with a line older
//! than the window start. Entries slightly before the window may be re-read;
//! the forward pass filters them out.

use std::io::{Read, Seek, SeekFrom};

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use super::error::LogResult;
use super::prefix::PrefixPattern;
use super::timestamp;

/// Size of a backward scan step in bytes.
pub const BLOCK_SIZE: u64 = 4096;

/// Find the offset at which the forward pass should start.
///
/// `len` is the current length of the file. The result is always a multiple
/// of [`BLOCK_SIZE`] back from `len` (clamped to 0) and never lies after the
/// first line whose timestamp is `>= start`, provided timestamps in the file
/// are non-decreasing.
pub fn locate_window_start<R: Read + Seek>(
    reader: &mut R,
    len: u64,
    prefix: &PrefixPattern,
    start: DateTime<Utc>,
) -> LogResult<u64> {
    if len == 0 {
        return Ok(0);
    }

    let mut buf = vec![0u8; BLOCK_SIZE as usize];
    let mut offset = len.saturating_sub(BLOCK_SIZE);

    loop {
        reader.seek(SeekFrom::Start(offset))?;
        let want = (len - offset).min(BLOCK_SIZE) as usize;
        reader.read_exact(&mut buf[..want])?;

        match first_timestamp(&buf[..want], prefix) {
            Some(ts) if ts < start => {
                trace!(offset, %ts, "block starts before window");
                break;
            }
            Some(ts) => trace!(offset, %ts, "block inside window"),
            None => trace!(offset, "no timestamp in block"),
        }

        if offset == 0 {
            break;
        }
        offset = offset.saturating_sub(BLOCK_SIZE);
    }

    debug!(offset, len, "log window located");
    Ok(offset)
}

/// Timestamp of the first prefix match in `block`.
///
/// A match whose timestamp does not decode counts as no timestamp.
fn first_timestamp(block: &[u8], prefix: &PrefixPattern) -> Option<DateTime<Utc>> {
    let caps = prefix.regex().captures(block)?;
    timestamp::decode(prefix, &caps).ok().flatten()
}
