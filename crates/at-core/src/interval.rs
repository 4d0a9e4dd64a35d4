//! Day-bounded presence intervals.
//!
//! Timestamps are local wall-clock time with whole-second precision. They are
//! stored as `YYYY-MM-DD HH:MM:SS`, which sorts lexicographically in
//! chronological order.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Text encoding used for every stored timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One continuous detected-online session for a user.
///
/// A stored interval never spans more than one calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceInterval {
    pub id: i64,
    pub name: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl AttendanceInterval {
    /// Calendar day the interval belongs to.
    pub fn date(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

pub fn format_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
}

/// Drops sub-second precision so that a value survives a store/load cycle unchanged.
pub fn truncate_to_second(timestamp: NaiveDateTime) -> NaiveDateTime {
    timestamp.with_nanosecond(0).unwrap_or(timestamp)
}

/// Splits `[start, end]` into consecutive pieces, one per calendar day.
///
/// Every piece except the last ends at `23:59:59`; the piece after it begins
/// at `00:00:00` of the following day. The last piece ends at `end`. A span
/// inside a single day yields exactly one piece.
pub fn split_by_day(
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let mut pieces = Vec::new();
    let mut piece_start = start;
    while piece_start.date() < end.date() {
        let Some(next_day) = piece_start.date().succ_opt() else {
            break;
        };
        let next_midnight = next_day.and_time(NaiveTime::default());
        pieces.push((piece_start, next_midnight - Duration::seconds(1)));
        piece_start = next_midnight;
    }
    pieces.push((piece_start, end));
    pieces
}
