//! Time-frame partitioning
//!
//! Splits a date range into contiguous, non-overlapping frames of a fixed
//! width. Frames are closed at millisecond resolution: a frame ends one
//! millisecond before the next one starts.
//!
//! A trailing partial frame is dropped. For a range of 36 hours split into
//! days, only the first day is returned; the remaining 12 hours are never
//! crawled. Callers that need them must extend the end of the range.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;

/// Format used in Gerrit `after:`/`before:` query operators
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// One partition of a crawl range, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeFrame {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeFrame {
    /// Builds the frame covering one whole calendar day
    pub fn day(day: NaiveDate) -> Self {
        // Time arithmetic wraps: midnight minus 1ms is 23:59:59.999
        let last_millisecond = NaiveTime::MIN - Duration::milliseconds(1);
        Self {
            start: day.and_time(NaiveTime::MIN),
            end: day.and_time(last_millisecond),
        }
    }

    /// Calendar day the frame starts on
    pub fn start_day(&self) -> NaiveDate {
        self.start.date()
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} .. {}",
            format_timestamp(&self.start),
            format_timestamp(&self.end)
        )
    }
}

/// Splits `[start, end)` into frames of width `size`
///
/// The loop emits a frame as long as its end does not exceed `end`, so a
/// range that is not a multiple of `size` loses its trailing remainder.
/// Returns an empty vector for a non-positive `size`.
pub fn create_time_frames(
    start: NaiveDateTime,
    end: NaiveDateTime,
    size: Duration,
) -> Vec<TimeFrame> {
    let mut frames = Vec::new();
    if size <= Duration::zero() {
        return frames;
    }

    let mut frame_start = start;
    let mut frame_end = match start
        .checked_add_signed(size)
        .and_then(|t| t.checked_sub_signed(Duration::milliseconds(1)))
    {
        Some(t) => t,
        None => return frames,
    };

    while frame_end <= end {
        frames.push(TimeFrame {
            start: frame_start,
            end: frame_end,
        });
        match (
            frame_start.checked_add_signed(size),
            frame_end.checked_add_signed(size),
        ) {
            (Some(next_start), Some(next_end)) => {
                frame_start = next_start;
                frame_end = next_end;
            }
            // Next frame would leave the representable range
            _ => break,
        }
    }

    frames
}

/// Formats a timestamp as `YYYY-MM-DD HH:MM:SS.mmm`
pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}
